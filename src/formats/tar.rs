use crate::extraction::{ArchiveWalker, ExtractError, Flow, OutputSink};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::io::{BufRead, Read};
use std::ops::ControlFlow;
use tar::Archive;
use tracing::trace;

/// Walks the members of a tar stream, decompressing gzip or bzip2 wrapped
/// streams based on their magic bytes.
pub fn walk<T: OutputSink>(
    walker: &mut ArchiveWalker<'_, T>,
    reader: &mut dyn BufRead,
) -> Result<Flow, ExtractError> {
    let (gzipped, bzipped) = match reader.fill_buf() {
        Ok(head) => (infer::archive::is_gz(head), infer::archive::is_bz2(head)),
        Err(e) => {
            walker.entry_failed("unreadable tar stream", &e);
            return Ok(ControlFlow::Continue(()));
        }
    };
    let stream: Box<dyn Read + '_> = if gzipped {
        trace!("gzip compressed tar");
        Box::new(GzDecoder::new(reader))
    } else if bzipped {
        trace!("bzip2 compressed tar");
        Box::new(BzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let mut archive = Archive::new(stream);
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => {
            walker.entry_failed("unreadable tar stream", &e);
            return Ok(ControlFlow::Continue(()));
        }
    };
    for entry in entries {
        // A broken header means the rest of the stream cannot be located
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                walker.entry_failed("corrupt tar member", &e);
                break;
            }
        };
        if entry.header().entry_type() != tar::EntryType::Regular {
            walker.skipped();
            continue;
        }
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        trace!(name, size = entry.size(), "read tar member");
        if walker.walk_entry(&name, &mut entry)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

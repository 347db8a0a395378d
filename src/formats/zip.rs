use crate::extraction::{ArchiveWalker, ExtractError, Flow, OutputSink};
use bytes::Bytes;
use std::io::Cursor;
use std::ops::ControlFlow;
use tracing::trace;
use zip::ZipArchive;

/// Walks the members of a zip container in central directory order.
pub fn walk<T: OutputSink>(
    walker: &mut ArchiveWalker<'_, T>,
    data: Bytes,
) -> Result<Flow, ExtractError> {
    let mut archive = match ZipArchive::new(Cursor::new(data)) {
        Ok(archive) => archive,
        Err(e) => {
            walker.entry_failed("unreadable zip container", &e);
            return Ok(ControlFlow::Continue(()));
        }
    };

    for index in 0..archive.len() {
        let mut member = match archive.by_index(index) {
            Ok(member) => member,
            Err(e) => {
                walker.entry_failed("unreadable zip member", &e);
                continue;
            }
        };
        let name = member.name().to_string();
        trace!(name, size = member.size(), "read zip member");
        if walker.walk_entry(&name, &mut member)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

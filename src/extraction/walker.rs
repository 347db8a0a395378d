use crate::extraction::{
    ArchiveStack, Counts, ExtractError, LegacyExtractor, OutputSink, OutputWriter, WindowDecision,
};
use crate::formats::{self, composite_path, peek_head, read_entry, EntryKind, FormatDispatcher};
use crate::ExtractionOptions;
use bytes::Buf;
use std::fmt::Display;
use std::io::{BufReader, Cursor, Read};
use std::ops::ControlFlow;
use std::path::Path;
use tracing::{debug, trace, warn};

/// `Break` means the index window is exhausted and every open container
/// should stop iterating.
pub type Flow = ControlFlow<()>;

/// Shared, read-only state of a run.
#[derive(Debug, Copy, Clone)]
pub struct WalkContext<'a> {
    pub options: &'a ExtractionOptions,
    pub dispatcher: &'a FormatDispatcher,
    pub legacy: &'a LegacyExtractor,
    pub workspace: &'a Path,
}

/// Depth-first walk over one top-level input. The image counter is handed in
/// and read back out, so consecutive inputs continue the same enumeration.
pub struct ArchiveWalker<'a, T: OutputSink> {
    context: WalkContext<'a>,
    output: &'a mut OutputWriter<T>,
    counter: u64,
    stack: ArchiveStack,
    counts: Counts,
}

impl<'a, T: OutputSink> ArchiveWalker<'a, T> {
    pub fn new(context: WalkContext<'a>, output: &'a mut OutputWriter<T>, counter: u64) -> Self {
        Self {
            context,
            output,
            counter,
            stack: ArchiveStack::new(),
            counts: Counts::default(),
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn counts(&self) -> Counts {
        self.counts
    }

    pub(crate) fn skipped(&mut self) {
        self.counts.skipped += 1;
    }

    pub(crate) fn entry_failed(&mut self, message: &str, error: &dyn Display) {
        warn!(container = self.stack.prefix(), %error, "{message}");
        self.counts.errors += 1;
    }

    fn limit(&self) -> Option<u64> {
        self.context.options.entry_size_limit()
    }

    /// Classifies `name` and acts on it. Only failures of the output archive
    /// are returned as errors, everything else is logged and skipped.
    pub fn walk_entry(&mut self, name: &str, reader: &mut dyn Read) -> Result<Flow, ExtractError> {
        let window = self.context.options.window;
        if window.is_exhausted(self.counter) {
            return Ok(ControlFlow::Break(()));
        }
        let path = composite_path(self.stack.prefix(), name);

        let head = if self.context.dispatcher.wants_content(name) {
            match peek_head(&mut *reader) {
                Ok(head) => Some(head),
                Err(e) => {
                    warn!(%path, error = %e, "failed to read entry");
                    self.counts.errors += 1;
                    return Ok(ControlFlow::Continue(()));
                }
            }
        } else {
            None
        };
        let kind = self.context.dispatcher.classify(name, head.as_deref());
        trace!(%path, %kind, "classified");
        let mut reader = Read::chain(Cursor::new(head.unwrap_or_default()), reader);

        match kind {
            EntryKind::Skip => {
                debug!(%path, "skipping file with unknown extension or content");
                self.counts.skipped += 1;
                Ok(ControlFlow::Continue(()))
            }
            EntryKind::Image => self.walk_image(path, &mut reader),
            EntryKind::Zip | EntryKind::Tar | EntryKind::Legacy => {
                if !self.context.options.allows_depth(self.stack.current_depth()) {
                    debug!(%path, depth = self.stack.current_depth(), "max depth reached, not recursing");
                    self.counts.skipped += 1;
                    return Ok(ControlFlow::Continue(()));
                }
                self.counts.containers += 1;
                self.stack.push(path);
                let flow = match kind {
                    EntryKind::Zip => self.walk_zip(&mut reader),
                    EntryKind::Tar => self.walk_tar(&mut reader),
                    _ => self.walk_legacy(&mut reader),
                };
                self.stack.pop();
                flow
            }
        }
    }

    fn walk_zip(&mut self, reader: &mut dyn Read) -> Result<Flow, ExtractError> {
        debug!(path = self.stack.prefix(), "recursively processing a zip file");
        match read_entry(reader, self.limit()) {
            Ok(data) => formats::zip::walk(self, data),
            Err(e) => {
                self.entry_failed("failed to read zip container", &e);
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    fn walk_tar(&mut self, reader: &mut dyn Read) -> Result<Flow, ExtractError> {
        debug!(path = self.stack.prefix(), "recursively processing a tar file");
        formats::tar::walk(self, &mut BufReader::new(reader))
    }

    fn walk_legacy(&mut self, reader: &mut dyn Read) -> Result<Flow, ExtractError> {
        debug!(path = self.stack.prefix(), "carving legacy document");
        let data = match read_entry(reader, self.limit()) {
            Ok(data) => data,
            Err(e) => {
                self.entry_failed("failed to read legacy document", &e);
                return Ok(ControlFlow::Continue(()));
            }
        };
        let fragments = match self.context.legacy.extract(&data, self.context.workspace) {
            Ok(fragments) => fragments,
            Err(e) => {
                self.entry_failed("failed to carve legacy document", &e);
                return Ok(ControlFlow::Continue(()));
            }
        };
        drop(data);
        debug!(path = self.stack.prefix(), fragments = fragments.len(), "carved fragments");

        for fragment in fragments {
            self.counts.fragments += 1;
            if self
                .walk_entry(&fragment.name, &mut fragment.data.reader())?
                .is_break()
            {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn walk_image(&mut self, path: String, reader: &mut dyn Read) -> Result<Flow, ExtractError> {
        // Advanced on classification, before the bytes are read
        self.counter += 1;
        self.counts.images += 1;

        let window = self.context.options.window;
        match window.decide(self.counter) {
            WindowDecision::Emit if self.output.has(&path) => {
                debug!(%path, "already present in output, skipping");
                self.counts.duplicates += 1;
            }
            WindowDecision::Emit => match read_entry(reader, self.limit()) {
                Ok(data) => {
                    debug!(%path, index = self.counter, "adding image to archive");
                    if self.output.append(&path, &data)? {
                        self.counts.written += 1;
                    } else {
                        self.counts.duplicates += 1;
                    }
                }
                Err(e) => {
                    warn!(%path, error = %e, "failed to read image");
                    self.counts.errors += 1;
                }
            },
            WindowDecision::Discard => {
                trace!(%path, index = self.counter, "image outside window");
                self.counts.discarded += 1;
            }
        }

        if window.is_exhausted(self.counter) {
            debug!(index = self.counter, "index window exhausted, halting");
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    }
}

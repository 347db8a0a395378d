use crate::extraction::{
    ArchiveWalker, Counts, ExtractError, Flow, InputContents, InputError, InputKind,
    LegacyExtractor, OutputSink, OutputWriter, WalkContext,
};
use crate::formats::FormatDispatcher;
use crate::ExtractionOptions;
use bytes::{Buf, Bytes};
use std::fmt::{Debug, Display, Formatter};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, trace};

/// One extraction run: a fixed set of options, one output archive, one
/// carving workspace and one image counter shared by every input.
pub struct Extractor<T: OutputSink> {
    options: ExtractionOptions,
    dispatcher: FormatDispatcher,
    legacy: LegacyExtractor,
    output: OutputWriter<T>,
    input: InputContents,
    // Removed on drop, so every exit path cleans it up
    workspace: TempDir,
    counter: u64,
}

impl<T: OutputSink> Display for Extractor<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Extractor(input={}, output={}, options={})",
            self.input, self.output, self.options
        )
    }
}

impl<T: OutputSink> Debug for Extractor<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("options", &self.options)
            .field("output", &self.output)
            .field("input", &self.input)
            .field("workspace", &self.workspace.path())
            .field("counter", &self.counter)
            .finish()
    }
}

impl Extractor<File> {
    pub fn with_path(path: PathBuf, options: ExtractionOptions) -> anyhow::Result<Extractor<File>> {
        let output = OutputWriter::from_path(path, options.compression)?;
        Self::new(output, options)
    }
}

impl<T: OutputSink> Extractor<T> {
    pub fn with_writer(writer: T, options: ExtractionOptions) -> anyhow::Result<Self> {
        let output = OutputWriter::from_writer(writer, options.compression)?;
        Self::new(output, options)
    }

    pub fn new(output: OutputWriter<T>, options: ExtractionOptions) -> anyhow::Result<Self> {
        let workspace = tempfile::Builder::new()
            .prefix("archive-to-images-")
            .tempdir()?;
        debug!(workspace = ?workspace.path(), "created carving workspace");
        Ok(Self {
            dispatcher: options.dispatcher(),
            legacy: LegacyExtractor::new(options.carver.clone()),
            options,
            output,
            input: InputContents::new(),
            workspace,
            counter: 0,
        })
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    pub fn input_contents_mut(&mut self) -> &mut InputContents {
        &mut self.input
    }

    pub fn input_file_count(&self) -> usize {
        self.input.len()
    }

    pub fn has_input_files(&self) -> bool {
        !self.input.is_empty()
    }

    pub fn add_path(&mut self, path: PathBuf) -> Result<(), InputError> {
        self.input.add_path(path)
    }

    pub fn add_buffer(&mut self, name: impl Into<String>, buffer: Bytes) {
        self.input.add_buffer(name, buffer)
    }

    /// Number of images classified so far across every input.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    pub fn extract(&mut self) -> Result<Counts, ExtractError> {
        self.extract_with_callback(|_, _| {})
    }

    /// Walks every queued input in order. `callback` is invoked with the
    /// name and counts of each finished input.
    pub fn extract_with_callback(
        &mut self,
        callback: impl Fn(&str, &Counts),
    ) -> Result<Counts, ExtractError> {
        trace!("Extracting with options {}", self.options);
        let context = WalkContext {
            options: &self.options,
            dispatcher: &self.dispatcher,
            legacy: &self.legacy,
            workspace: self.workspace.path(),
        };
        let mut total = Counts::default();

        for input in self.input.contents_sequential() {
            if context.options.window.is_exhausted(self.counter) {
                debug!(index = self.counter, "index window exhausted, skipping remaining inputs");
                break;
            }
            let name = input.name();
            let (counts, flow) =
                extract_input(context, &mut self.output, &mut self.counter, &name, input)?;
            callback(&name, &counts);
            total += counts;
            if flow.is_break() {
                break;
            }
        }

        info!(counter = self.counter, "Extraction finished: {total}");
        Ok(total)
    }

    pub fn finish(self) -> Result<T, ExtractError> {
        let Self {
            output, workspace, ..
        } = self;
        workspace.close().map_err(ExtractError::Workspace)?;
        output.finish()
    }
}

#[tracing::instrument(skip(context, output, counter, input))]
fn extract_input<T: OutputSink>(
    context: WalkContext<'_>,
    output: &mut OutputWriter<T>,
    counter: &mut u64,
    name: &str,
    input: InputKind,
) -> Result<(Counts, Flow), ExtractError> {
    info!("Processing top-level file");
    let mut walker = ArchiveWalker::new(context, output, *counter);
    let flow = match input {
        InputKind::Path(path) => {
            let file = File::open(&path).map_err(|e| InputError::new(path.clone(), e))?;
            let mut reader = BufReader::with_capacity(1024 * 1024, file);
            walker.walk_entry(name, &mut reader)?
        }
        InputKind::Buffer { data, .. } => walker.walk_entry(name, &mut data.reader())?,
    };
    *counter = walker.counter();
    let counts = walker.counts();
    info!("Finished top-level file: {counts}");
    Ok((counts, flow))
}

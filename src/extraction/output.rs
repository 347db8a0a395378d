use crate::extraction::ExtractError;
use foldhash::HashSet;
use std::fmt::{Debug, Display, Formatter};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub trait OutputSink: Read + Write + Seek + Debug {}
impl<T> OutputSink for T where T: Read + Write + Seek + Debug {}

/// Compression used for entries added to the output archive.
#[derive(
    Debug, Copy, Clone, Default, Eq, PartialEq, strum::Display, strum::EnumString, clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputCompression {
    #[default]
    Stored,
    Deflated,
    Bzip2,
}

impl From<OutputCompression> for CompressionMethod {
    fn from(value: OutputCompression) -> Self {
        match value {
            OutputCompression::Stored => CompressionMethod::Stored,
            OutputCompression::Deflated => CompressionMethod::Deflated,
            OutputCompression::Bzip2 => CompressionMethod::Bzip2,
        }
    }
}

/// Append-only zip archive of extracted images. Names already present,
/// whether written during this run or by an earlier one, are never written
/// again.
pub struct OutputWriter<T: OutputSink> {
    writer: Option<ZipWriter<T>>,
    names: HashSet<String>,
    file_options: SimpleFileOptions,
    path: Option<PathBuf>,
}

impl OutputWriter<File> {
    pub fn from_path(
        path: PathBuf,
        compression: OutputCompression,
    ) -> Result<OutputWriter<File>, ExtractError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|error| ExtractError::Output {
                path: path.clone(),
                error,
            })?;
        Self::open(file, Some(path), compression)
    }
}

impl<T: OutputSink> OutputWriter<T> {
    /// Uses `sink` as the archive. Existing zip content is resumed, an empty
    /// sink starts a new archive.
    pub fn from_writer(sink: T, compression: OutputCompression) -> Result<Self, ExtractError> {
        Self::open(sink, None, compression)
    }

    fn open(
        mut sink: T,
        path: Option<PathBuf>,
        compression: OutputCompression,
    ) -> Result<Self, ExtractError> {
        let length = sink.seek(SeekFrom::End(0))?;
        let (writer, names) = if length == 0 {
            (ZipWriter::new(sink), HashSet::default())
        } else {
            sink.seek(SeekFrom::Start(0))?;
            let names: HashSet<String> = {
                let archive = ZipArchive::new(&mut sink)?;
                archive.file_names().map(str::to_owned).collect()
            };
            info!(existing = names.len(), "resuming existing output archive");
            (ZipWriter::new_append(sink)?, names)
        };
        Ok(Self {
            writer: Some(writer),
            names,
            file_options: SimpleFileOptions::default().compression_method(compression.into()),
            path,
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns `false` when `name` was already present and nothing was written.
    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<bool, ExtractError> {
        if self.has(name) {
            warn!(name, "already present in output, skipping");
            return Ok(false);
        }
        let writer = self.writer.as_mut().ok_or(ExtractError::OutputClosed)?;
        let options = self
            .file_options
            .large_file(data.len() as u64 >= u32::MAX as u64);
        writer.start_file(name, options)?;
        writer.write_all(data)?;
        self.names.insert(name.to_owned());
        debug!(name, size = data.len(), "written");
        Ok(true)
    }

    pub fn finish(mut self) -> Result<T, ExtractError> {
        let writer = self.writer.take().ok_or(ExtractError::OutputClosed)?;
        Ok(writer.finish()?)
    }
}

impl<T: OutputSink> Debug for OutputWriter<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputWriter")
            .field("path", &self.path)
            .field("names", &self.names.len())
            .field("closed", &self.writer.is_none())
            .finish()
    }
}

impl<T: OutputSink> Display for OutputWriter<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            None => write!(f, "OutputWriter(impl Write)"),
            Some(p) => write!(f, "OutputWriter({:?})", p),
        }
    }
}

impl<T: OutputSink> Drop for OutputWriter<T> {
    fn drop(&mut self) {
        // Already closed
        let Some(writer) = self.writer.take() else {
            return;
        };
        if let Err(e) = writer.finish() {
            error!(output = %self, error = %e, "failed to finish output archive");
        }
    }
}

use bytes::Bytes;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
#[error("Error reading input file {path}: {error}")]
pub struct InputError {
    pub error: std::io::Error,
    pub path: PathBuf,
}

impl InputError {
    pub fn new(path: PathBuf, error: std::io::Error) -> Self {
        Self { error, path }
    }
}

/// A top-level input. Files are opened only when their turn comes.
pub enum InputKind {
    Path(PathBuf),
    Buffer { name: String, data: Bytes },
}

impl InputKind {
    /// The name used as the root of every composite path below this input.
    pub fn name(&self) -> String {
        match self {
            InputKind::Path(path) => path.to_string_lossy().into_owned(),
            InputKind::Buffer { name, .. } => name.clone(),
        }
    }
}

impl Debug for InputKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InputKind::Path(path) => write!(f, "InputKind(Path, path={:?})", path),
            InputKind::Buffer { name, data } => {
                write!(f, "InputKind(Buffer, name={:?}, size={})", name, data.len())
            }
        }
    }
}

/// Top-level inputs, kept in the order they were added.
#[derive(Debug, Default)]
pub struct InputContents {
    contents: Vec<InputKind>,
}

impl Display for InputContents {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "InputContents(contents={})", self.contents.len())
    }
}

impl InputContents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Directories expand to the files below them in file name order.
    pub fn add_path(&mut self, path: PathBuf) -> Result<(), InputError> {
        if !path.is_dir() {
            self.contents.push(InputKind::Path(path));
            return Ok(());
        }
        for entry in WalkDir::new(&path).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let failed = err.path().unwrap_or(&path).to_path_buf();
                InputError::new(failed, err.into())
            })?;
            if entry.file_type().is_file() {
                self.contents.push(InputKind::Path(entry.into_path()));
            }
        }
        Ok(())
    }

    pub fn add_buffer(&mut self, name: impl Into<String>, data: Bytes) {
        self.contents.push(InputKind::Buffer {
            name: name.into(),
            data,
        });
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.contents.iter().filter_map(|input| match input {
            InputKind::Path(path) => Some(path.as_path()),
            InputKind::Buffer { .. } => None,
        })
    }

    pub fn contents_sequential(&mut self) -> impl Iterator<Item = InputKind> + '_ {
        self.contents.drain(0..)
    }
}

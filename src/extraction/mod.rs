mod counts;
mod extractor;
mod input;
mod legacy;
mod output;
mod stack;
mod walker;
mod window;

pub use counts::*;
pub use extractor::*;
pub use input::*;
pub use legacy::*;
pub use output::*;
pub use stack::*;
pub use walker::*;
pub use window::*;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("Error opening output archive {path}: {error}")]
    Output {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Output archive is closed")]
    OutputClosed,
    #[error("Error removing temporary workspace: {0}")]
    Workspace(std::io::Error),
}

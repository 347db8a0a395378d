use byte_unit::Byte;
use std::fmt::{Display, Formatter};
use std::num::NonZeroUsize;

mod extraction;
mod formats;

#[cfg(test)]
mod tests;

pub use extraction::*;
pub use formats::{EntryKind, ExtensionSets, FormatDispatcher};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExtractionOptions {
    pub extensions: ExtensionSets,
    pub window: IndexWindow,
    pub max_depth: Option<NonZeroUsize>,
    pub max_entry_size: Option<Byte>,
    pub sniff_tar: bool,
    pub carver: CarverCommand,
    pub compression: OutputCompression,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            extensions: ExtensionSets::default(),
            window: IndexWindow::default(),
            max_depth: None,
            max_entry_size: None,
            sniff_tar: true,
            carver: CarverCommand::default(),
            compression: OutputCompression::default(),
        }
    }
}

impl Display for ExtractionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExtractionOptions(window={},", self.window)?;
        if let Some(max_entry_size) = self.max_entry_size {
            write!(f, " max_entry_size=\"{:#.1}\",", max_entry_size)?;
        } else {
            f.write_str(" max_entry_size=None,")?;
        }
        write!(
            f,
            " max_depth={:?}, sniff_tar={}, carver={}, compression={})",
            self.max_depth, self.sniff_tar, self.carver, self.compression
        )
    }
}

impl ExtractionOptions {
    #[inline(always)]
    pub fn entry_size_limit(&self) -> Option<u64> {
        self.max_entry_size.map(|size| size.as_u64())
    }

    /// Whether a container found `depth` containers deep may still be opened.
    #[inline(always)]
    pub fn allows_depth(&self, depth: usize) -> bool {
        match self.max_depth {
            Some(max_depth) => depth < max_depth.get(),
            None => true,
        }
    }

    pub fn dispatcher(&self) -> FormatDispatcher {
        FormatDispatcher::new(self.extensions.clone(), self.sniff_tar)
    }
}

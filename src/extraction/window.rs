use std::fmt::{Display, Formatter};

/// What to do with an image once the global counter has been advanced for it.
/// Stopping the walk is decided by [`IndexWindow::is_exhausted`] alone.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WindowDecision {
    Emit,
    Discard,
}

/// Gating policy over the global image counter. An image is emitted when
/// `min_index < counter <= max_index`, where `counter` is the 1-based index
/// of the image in traversal order.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct IndexWindow {
    min_index: u64,
    max_index: Option<u64>,
}

impl IndexWindow {
    pub fn new(min_index: u64, max_index: Option<u64>) -> Self {
        Self {
            min_index,
            max_index,
        }
    }

    /// Skip the first `start` images and emit at most `count`.
    pub fn from_start_count(start: u64, count: Option<u64>) -> Self {
        Self::new(start, count.map(|count| start.saturating_add(count)))
    }

    pub fn min_index(&self) -> u64 {
        self.min_index
    }

    pub fn max_index(&self) -> Option<u64> {
        self.max_index
    }

    #[inline(always)]
    pub fn decide(&self, counter: u64) -> WindowDecision {
        let below_max = !matches!(self.max_index, Some(max) if counter > max);
        match counter > self.min_index && below_max {
            true => WindowDecision::Emit,
            false => WindowDecision::Discard,
        }
    }

    /// No image seen after `counter` can be emitted any more. Once true, every
    /// open container stops iterating.
    #[inline(always)]
    pub fn is_exhausted(&self, counter: u64) -> bool {
        self.max_index.is_some_and(|max| counter >= max)
    }
}

impl Display for IndexWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.max_index {
            Some(max) => write!(f, "({}, {}]", self.min_index, max),
            None => write!(f, "({}, ..)", self.min_index),
        }
    }
}

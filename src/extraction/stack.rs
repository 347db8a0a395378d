/// Keeps track of the containers currently open during a walk. Each entry is
/// the composite path of a container, so the last one is the prefix for the
/// members being visited.
///
/// # Example
/// ```
/// # use archive_to_images::ArchiveStack;
/// let mut stack = ArchiveStack::new();
/// stack.push("first.tar".to_string());
/// stack.push("first.tar/second.zip".to_string());
/// assert_eq!(stack.prefix(), "first.tar/second.zip");
/// assert_eq!(stack.current_depth(), 2);
/// stack.pop();
/// assert_eq!(stack.prefix(), "first.tar");
/// ```
#[derive(Debug, Default)]
pub struct ArchiveStack {
    stack: smallvec::SmallVec<[String; 6]>,
}

impl ArchiveStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: String) {
        self.stack.push(path);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.stack.pop()
    }

    pub fn current_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn prefix(&self) -> &str {
        self.stack.last().map(String::as_str).unwrap_or("")
    }
}

//! Options controlling how a [`TailReader`](crate::TailReader) is opened.

/// Configuration for opening a tail reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailOptions {
    /// Absolute byte offset to start reading from.
    pub offset: u64,
    /// Subscribe to change notifications. Without a subscription the reader
    /// performs a one-shot bounded read and reports end-of-stream at EOF.
    pub watch: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            watch: true,
        }
    }
}

impl TailOptions {
    /// Start reading at byte `offset` instead of the beginning of the file.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Skip the change subscription (read what is there, then stop).
    pub fn without_watch(mut self) -> Self {
        self.watch = false;
        self
    }
}

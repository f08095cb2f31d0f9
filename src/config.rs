use std::time::Duration;

/// Size of the buffer each stream reads into.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// How long a pipe read may wait for a writer before the stream goes idle.
pub const DEFAULT_PIPE_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Tunables shared by every stream created from one [`crate::StreamContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub read_buffer_size: usize,
    pub pipe_read_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            pipe_read_timeout: DEFAULT_PIPE_READ_TIMEOUT,
        }
    }
}

impl StreamOptions {
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        // A zero-length read would look like EOF forever.
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn with_pipe_read_timeout(mut self, timeout: Duration) -> Self {
        self.pipe_read_timeout = timeout;
        self
    }
}

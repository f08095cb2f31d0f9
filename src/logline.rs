use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// One decoded line as delivered to the consumer.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// Path of the source the line was read from.
    pub source: Arc<Path>,
    /// Line text without its terminator.
    pub text: String,
    pub read_at: SystemTime,
}

impl LogLine {
    pub fn new(source: Arc<Path>, text: String) -> Self {
        Self { source, text, read_at: SystemTime::now() }
    }
}

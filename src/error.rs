//! Errors returned when a stream cannot be created.
//!
//! Failures inside a running stream never surface here: they are logged,
//! counted in [`crate::metrics`], and end the stream.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The path could not be opened for reading.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The initial seek to end-of-file failed.
    #[error("failed to seek in {}: {source}", path.display())]
    Seek {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The path could not be stat'ed to decide which stream to build.
    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The path is neither a regular file nor a named pipe.
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFileType(PathBuf),
}

impl StreamError {
    /// The pathname the failure refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Open { path, .. } | Self::Seek { path, .. } | Self::Stat { path, .. } => path,
            Self::UnsupportedFileType(path) => path,
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

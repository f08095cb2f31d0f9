//! logtail: the log-ingestion front end of a log processing tool.
//!
//! Regular files and named pipes are tailed by independent tasks that survive
//! rotation and truncation and push decoded lines into a bounded channel owned
//! by the consumer. How often an idle stream re-reads its source is decided by
//! an injected [`waker::Waker`].

pub mod config;
pub mod error;
pub mod logline;
pub mod logstream;
pub mod metrics;
pub mod tailer;
pub mod waker;

pub use config::StreamOptions;
pub use error::{Result, StreamError};
pub use logline::LogLine;
pub use logstream::{FileStream, LogStream, PipeStream, StreamContext};
pub use tailer::Tailer;

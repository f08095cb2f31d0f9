//! Log ingestion layer: streams lines from regular files and named pipes.
//!
//! Each stream runs on its own task, spawned on the [`StreamContext`]'s
//! tracker, and pushes [`LogLine`]s into the context's bounded channel. A
//! [`LogStream`] handle is what the owner keeps to check health and request
//! a stop.

use std::fs::FileType;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::StreamOptions;
use crate::error::{Result, StreamError};
use crate::logline::LogLine;
use crate::waker::Waker;

mod decode;
mod filestream;
mod pipestream;
#[cfg(test)]
mod test_support;

pub use filestream::FileStream;
pub use pipestream::PipeStream;

/// Handle to a running stream.
pub trait LogStream: Send + Sync {
    /// The path this stream was created for.
    fn pathname(&self) -> &Path;

    /// Time of the most recent non-empty read, or creation time.
    fn last_read_time(&self) -> SystemTime;

    /// True once the stream task has exited for good.
    fn is_complete(&self) -> bool;

    /// Ask the stream to finish at its next EOF. Safe to call repeatedly.
    fn stop(&self);
}

/// Everything a stream needs from its owner: the shared cancellation token,
/// the tracker its tasks are spawned on, the waker, and the line sink.
#[derive(Clone)]
pub struct StreamContext {
    cancel: CancellationToken,
    tracker: TaskTracker,
    waker: Arc<dyn Waker>,
    lines: Sender<LogLine>,
    options: StreamOptions,
}

impl StreamContext {
    pub fn new(waker: Arc<dyn Waker>, lines: Sender<LogLine>, options: StreamOptions) -> Self {
        Self {
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            waker,
            lines,
            options,
        }
    }

    /// Use an externally owned cancellation token instead of a fresh one.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Cancel every stream sharing this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for every stream task, including ones spawned after rotations.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Build the right stream for whatever is at `path`.
///
/// Regular files become a [`FileStream`], named pipes a [`PipeStream`].
/// `from_start` only applies to regular files.
pub fn new(cx: &StreamContext, path: &Path, from_start: bool) -> Result<Box<dyn LogStream>> {
    let meta = std::fs::metadata(path).map_err(|source| {
        crate::metrics::global().log_errors.add(path, 1);
        StreamError::Stat { path: path.to_path_buf(), source }
    })?;
    match SourceKind::of(meta.file_type()) {
        Some(SourceKind::File) => Ok(Box::new(FileStream::open(cx, path, from_start)?)),
        Some(SourceKind::Pipe) => Ok(Box::new(PipeStream::open(cx, path)?)),
        None => Err(StreamError::UnsupportedFileType(path.to_path_buf())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    File,
    Pipe,
}

impl SourceKind {
    fn of(ft: FileType) -> Option<Self> {
        if ft.is_file() {
            Some(Self::File)
        } else if ft.is_fifo() {
            Some(Self::Pipe)
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct Activity {
    last_read: SystemTime,
    completed: bool,
}

/// State shared between a stream handle and its task(s).
#[derive(Debug)]
struct Shared {
    pathname: Arc<Path>,
    activity: RwLock<Activity>,
    stop_once: AtomicBool,
    stop: CancellationToken,
}

impl Shared {
    fn new(pathname: &Path) -> Arc<Self> {
        Arc::new(Self {
            pathname: Arc::from(pathname),
            activity: RwLock::new(Activity { last_read: SystemTime::now(), completed: false }),
            stop_once: AtomicBool::new(false),
            stop: CancellationToken::new(),
        })
    }

    fn path(&self) -> &Path {
        &self.pathname
    }

    fn touch(&self) {
        let now = SystemTime::now();
        let mut activity = self.activity.write();
        if now > activity.last_read {
            activity.last_read = now;
        }
    }

    fn mark_complete(&self) {
        self.activity.write().completed = true;
    }

    fn last_read_time(&self) -> SystemTime {
        self.activity.read().last_read
    }

    fn is_complete(&self) -> bool {
        self.activity.read().completed
    }

    fn request_stop(&self) {
        if self
            .stop_once
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(path = %self.pathname.display(), "stopping at next EOF");
            self.stop.cancel();
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

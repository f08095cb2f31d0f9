//! Streams a named pipe.
//!
//! A pipe only reports EOF once every writer has closed it, so a writer that
//! is merely quiet shows up as a read timeout instead. There is no rotation
//! or truncation: once the pipe reports EOF the stream is finished, and a
//! recreated pipe needs a new stream.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tracing::{debug, info};

use super::decode::{PartialLine, decode_and_send, flush_partial};
use super::{LogStream, Shared, StreamContext};
use crate::error::{Result, StreamError};
use crate::metrics;

/// Handle to a tailed named pipe.
#[derive(Debug)]
pub struct PipeStream {
    shared: Arc<Shared>,
}

impl PipeStream {
    /// Open the pipe at `path` and start streaming it.
    ///
    /// The pipe is opened non-blocking, so this succeeds even before any
    /// writer has opened the other end. Must be called from within a tokio
    /// runtime.
    pub fn open(cx: &StreamContext, path: &Path) -> Result<Self> {
        let receiver = pipe::OpenOptions::new().open_receiver(path).map_err(|source| {
            metrics::global().log_errors.add(path, 1);
            StreamError::Open { path: path.to_path_buf(), source }
        })?;
        debug!(path = %path.display(), "opened new pipe");

        let shared = Shared::new(path);
        cx.tracker().spawn(read_loop(Arc::clone(&shared), cx.clone(), receiver));
        Ok(Self { shared })
    }
}

impl LogStream for PipeStream {
    fn pathname(&self) -> &Path {
        self.shared.path()
    }

    fn last_read_time(&self) -> SystemTime {
        self.shared.last_read_time()
    }

    fn is_complete(&self) -> bool {
        self.shared.is_complete()
    }

    fn stop(&self) {
        self.shared.request_stop();
    }
}

/// Outcome of one deadline-bounded read.
enum ReadOutcome {
    Data(usize),
    /// No writer activity before the deadline.
    Stalled,
    Eof,
    Failed(io::Error),
}

async fn read_loop(shared: Arc<Shared>, cx: StreamContext, mut receiver: pipe::Receiver) {
    let path = shared.path();
    let mut buf = vec![0u8; cx.options().read_buffer_size];
    let mut partial = PartialLine::default();
    let read_timeout = cx.options().pipe_read_timeout;

    loop {
        let read = match tokio::time::timeout(read_timeout, receiver.read(&mut buf)).await {
            Err(_) => ReadOutcome::Stalled,
            Ok(Ok(0)) => ReadOutcome::Eof,
            Ok(Ok(n)) => ReadOutcome::Data(n),
            Ok(Err(e)) => ReadOutcome::Failed(e),
        };

        match read {
            ReadOutcome::Data(n) => {
                debug!(path = %path.display(), n, "read bytes");
                if decode_and_send(&cx.lines, &shared.pathname, &buf[..n], &mut partial).await.is_err() {
                    debug!(path = %path.display(), "line sink closed");
                    break;
                }
                shared.touch();
                if !shared.stop.is_cancelled() && !cx.cancellation().is_cancelled() {
                    continue;
                }
                break;
            }
            ReadOutcome::Stalled => {}
            // All writers have closed the pipe.
            ReadOutcome::Eof => {
                debug!(path = %path.display(), "pipe closed by writer");
                break;
            }
            ReadOutcome::Failed(e) => {
                info!(path = %path.display(), "read failed: {e}");
                metrics::global().log_errors.add(path, 1);
                break;
            }
        }

        tokio::select! {
            _ = shared.stop.cancelled() => {
                debug!(path = %path.display(), "stream has been stopped, exiting");
                break;
            }
            _ = cx.cancellation().cancelled() => {
                debug!(path = %path.display(), "stream has been cancelled, exiting");
                break;
            }
            _ = cx.waker.wake() => debug!(path = %path.display(), "wake received"),
        }
    }

    // Unlike a truncated file, nothing will ever complete this line.
    if flush_partial(&cx.lines, &shared.pathname, &mut partial).await.is_err() {
        debug!(path = %path.display(), "line sink closed");
    }
    shared.mark_complete();
    debug!(path = %path.display(), "closing pipe");
}

#[cfg(test)]
#[path = "pipestream_tests.rs"]
mod tests;

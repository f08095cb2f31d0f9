//! Streams a regular file that other processes append to, rotate, or truncate.
//!
//! Rotation means a new inode now lives at the path; the open descriptor
//! stays valid until EOF, after which the stream moves on to the new file.
//! Truncation keeps the inode but resets its length, so the read offset is
//! reset too. Any bytes written between the last read and a truncation are
//! lost; that is inherent to offset-based tailing. Both are checked every
//! time a read returns EOF.

use std::fs::Metadata;
use std::io::{self, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use super::decode::{PartialLine, decode_and_send, flush_partial};
use super::{LogStream, Shared, StreamContext};
use crate::error::{Result, StreamError};
use crate::metrics;

/// Device and inode of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    fn of(meta: &Metadata) -> Self {
        Self { dev: meta.dev(), ino: meta.ino() }
    }
}

/// Handle to a tailed regular file. The handle outlives rotations: every
/// epoch of the same path reports through it.
#[derive(Debug)]
pub struct FileStream {
    shared: Arc<Shared>,
}

impl FileStream {
    /// Open `path` and start streaming it.
    ///
    /// Unless `from_start` is set, reading begins at the current end of the
    /// file. Must be called from within a tokio runtime.
    pub fn open(cx: &StreamContext, path: &Path, from_start: bool) -> Result<Self> {
        let shared = Shared::new(path);
        start_epoch(Arc::clone(&shared), cx, from_start)?;
        Ok(Self { shared })
    }
}

impl LogStream for FileStream {
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

/// Open the file currently at the path and spawn a task reading it.
///
/// Synchronous because `FileStream::open` is, and the rotation hand-off
/// reuses it; the open, stat and seek do not wait on other processes.
fn start_epoch(shared: Arc<Shared>, cx: &StreamContext, from_start: bool) -> Result<()> {
    let path = shared.path();
    let open_err = |source: io::Error| {
        metrics::global().log_errors.add(path, 1);
        StreamError::Open { path: path.to_path_buf(), source }
    };
    let mut file = std::fs::File::open(path).map_err(open_err)?;
    let identity = FileIdentity::of(&file.metadata().map_err(open_err)?);
    debug!(path = %path.display(), dev = identity.dev, ino = identity.ino, "opened new file");

    if !from_start {
        // Dropping `file` on error closes it.
        let pos = file.seek(SeekFrom::End(0)).map_err(|source| {
            metrics::global().log_errors.add(path, 1);
            StreamError::Seek { path: path.to_path_buf(), source }
        })?;
        debug!(path = %path.display(), pos, "seeked to end");
    }

    let file = File::from_std(file);
    cx.tracker().spawn(read_loop(shared, cx.clone(), file, identity));
    Ok(())
}

/// What an EOF turned out to mean.
enum AtEof {
    /// Nothing changed; wait for more data.
    Idle,
    /// The file was truncated and the offset reset; read again now.
    Truncated,
    /// A new file lives at the path and has been handed to a new task.
    Rotated,
    /// The descriptor is unusable.
    Failed,
}

async fn read_loop(shared: Arc<Shared>, cx: StreamContext, mut file: File, identity: FileIdentity) {
    let path = shared.path();
    let mut buf = vec![0u8; cx.options().read_buffer_size];
    let mut partial = PartialLine::default();

    loop {
        match file.read(&mut buf).await {
            Ok(0) => {
                debug!(path = %path.display(), "eof and no bytes");
                match check_rotation(&shared, &cx, &mut file, identity, &mut partial).await {
                    AtEof::Idle => {}
                    AtEof::Truncated => continue,
                    AtEof::Rotated => {
                        // The old epoch's partial line will never be completed.
                        let dropped = partial.discard();
                        if dropped > 0 {
                            debug!(path = %path.display(), dropped, "abandoned partial line of rotated file");
                        }
                        debug!(path = %path.display(), "closing file descriptor");
                        return;
                    }
                    AtEof::Failed => break,
                }
            }
            Ok(n) => {
                debug!(path = %path.display(), n, "read bytes");
                if decode_and_send(&cx.lines, &shared.pathname, &buf[..n], &mut partial).await.is_err() {
                    debug!(path = %path.display(), "line sink closed");
                    shared.mark_complete();
                    return;
                }
                shared.touch();
                // There may be more to read, unless it looks like we're cancelled.
                if !cx.cancellation().is_cancelled() {
                    continue;
                }
            }
            Err(e) => {
                info!(path = %path.display(), "read failed: {e}");
                metrics::global().log_errors.add(path, 1);
                break;
            }
        }

        // At EOF or cancelled: time to exit if asked to.
        if shared.stop.is_cancelled() || cx.cancellation().is_cancelled() {
            debug!(path = %path.display(), "stream has been stopped, exiting");
            break;
        }

        debug!(path = %path.display(), "waiting");
        tokio::select! {
            // Data may have been written since EOF; the exit check above
            // runs again after one more read.
            _ = shared.stop.cancelled() => debug!(path = %path.display(), "stopping after next read"),
            _ = cx.cancellation().cancelled() => debug!(path = %path.display(), "cancelled after next read"),
            _ = cx.waker.wake() => debug!(path = %path.display(), "wake received"),
        }
    }

    if flush_partial(&cx.lines, &shared.pathname, &mut partial).await.is_err() {
        debug!(path = %path.display(), "line sink closed");
    }
    shared.mark_complete();
    debug!(path = %path.display(), "closing file descriptor");
}

async fn check_rotation(
    shared: &Arc<Shared>,
    cx: &StreamContext,
    file: &mut File,
    identity: FileIdentity,
    partial: &mut PartialLine,
) -> AtEof {
    let path = shared.path();

    // Rotation is the more common change, and both checks need a stat.
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) => {
            // Not found: deleted (expect a stop) or mid-rotation between
            // rename and create (the next pass sees the new file).
            info!(path = %path.display(), "stat failed: {e}");
            if e.kind() != io::ErrorKind::NotFound {
                metrics::global().log_errors.add(path, 1);
            }
            return AtEof::Idle;
        }
    };

    if FileIdentity::of(&meta) != identity {
        info!(path = %path.display(), "file rotated, following new file");
        metrics::global().file_rotations.add(path, 1);
        if let Err(e) = start_epoch(Arc::clone(shared), cx, true) {
            info!(path = %path.display(), "{e}");
            shared.mark_complete();
        }
        return AtEof::Rotated;
    }

    let offset = match file.stream_position().await {
        Ok(offset) => offset,
        Err(e) => {
            info!(path = %path.display(), "seek failed: {e}");
            metrics::global().log_errors.add(path, 1);
            return AtEof::Failed;
        }
    };
    debug!(path = %path.display(), offset, "current seek position");

    if offset != 0 && meta.len() < offset {
        info!(path = %path.display(), offset, size = meta.len(), pending = partial.len(), "file truncated, reading from start");
        // Everything past the truncation point is gone, so flush what we have.
        if flush_partial(&cx.lines, &shared.pathname, partial).await.is_err() {
            return AtEof::Failed;
        }
        if let Err(e) = file.seek(SeekFrom::Start(0)).await {
            info!(path = %path.display(), "seek failed: {e}");
            metrics::global().log_errors.add(path, 1);
            return AtEof::Failed;
        }
        metrics::global().file_truncates.add(path, 1);
        return AtEof::Truncated;
    }

    AtEof::Idle
}

#[cfg(test)]
#[path = "filestream_tests.rs"]
mod tests;

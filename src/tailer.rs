//! A minimal supervisor that owns a set of streams, one per path.
//!
//! It decides nothing about which paths exist; callers hand it paths and
//! periodically ask it to reap finished streams or stop quiet ones.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::logstream::{self, LogStream, StreamContext};

pub struct Tailer {
    cx: StreamContext,
    from_start: bool,
    streams: Mutex<HashMap<PathBuf, Box<dyn LogStream>>>,
}

impl Tailer {
    /// `from_start` applies to the first stream created for each path.
    /// Streams replacing a completed one always read from the start, since
    /// whatever is at the path now is new.
    pub fn new(cx: StreamContext, from_start: bool) -> Self {
        Self { cx, from_start, streams: Mutex::new(HashMap::new()) }
    }

    pub fn context(&self) -> &StreamContext {
        &self.cx
    }

    /// Start tailing `path` unless a live stream already covers it.
    pub fn tail_path(&self, path: &Path) -> Result<()> {
        let mut streams = self.streams.lock();
        let from_start = match streams.get(path) {
            Some(stream) if !stream.is_complete() => return Ok(()),
            Some(_) => true,
            None => self.from_start,
        };
        let stream = logstream::new(&self.cx, path, from_start)?;
        info!(path = %path.display(), from_start, "tailing");
        streams.insert(path.to_path_buf(), stream);
        Ok(())
    }

    pub fn is_tailing(&self, path: &Path) -> bool {
        self.streams.lock().get(path).is_some_and(|s| !s.is_complete())
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Forget completed streams, returning their paths.
    pub fn reap(&self) -> Vec<PathBuf> {
        let mut reaped = Vec::new();
        self.streams.lock().retain(|path, stream| {
            if stream.is_complete() {
                debug!(path = %path.display(), "reaping completed stream");
                reaped.push(path.clone());
                false
            } else {
                true
            }
        });
        reaped
    }

    /// Ask streams that have not read anything for `max_age` to stop.
    /// Returns how many were asked.
    pub fn expire_stale(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut expired = 0;
        for (path, stream) in self.streams.lock().iter() {
            if stream.is_complete() {
                continue;
            }
            let idle = now.duration_since(stream.last_read_time()).unwrap_or_default();
            if idle > max_age {
                info!(path = %path.display(), idle_secs = idle.as_secs(), "expiring stale stream");
                stream.stop();
                expired += 1;
            }
        }
        expired
    }

    /// Cancel every stream and wait for all of their tasks to finish.
    ///
    /// Streams flush pending partial lines on the way out, so the consumer
    /// must keep draining the line channel while this runs.
    pub async fn shutdown(self) {
        self.cx.cancel();
        self.cx.wait().await;
        debug!(streams = self.stream_count(), "all streams finished");
    }
}

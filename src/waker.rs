//! Scheduling policies an idle stream waits on between read attempts.
//!
//! A stream that has nothing to read parks on [`Waker::wake`] alongside its
//! stop and cancellation signals. The policy decides when it tries again.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Generic trait for wake-up policies.
///
/// One waker is shared by every stream of a [`crate::StreamContext`].
#[async_trait::async_trait]
pub trait Waker: Send + Sync {
    /// Resolves when the caller should attempt another read.
    async fn wake(&self);
}

/// Wakes every waiter after a fixed idle interval.
#[derive(Debug, Clone, Copy)]
pub struct TimedWaker {
    interval: Duration,
}

impl TimedWaker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait::async_trait]
impl Waker for TimedWaker {
    async fn wake(&self) {
        tokio::time::sleep(self.interval).await;
    }
}

#[derive(Debug, Default)]
struct WakeState {
    generation: u64,
    waiting: usize,
}

/// Wakes waiters only when told to.
///
/// Every call to [`ManualWaker::kick`] releases all streams currently parked.
/// [`ManualWaker::awaken`] first waits until a given number of streams are
/// parked, which lets tests step streams deterministically.
#[derive(Debug)]
pub struct ManualWaker {
    state: watch::Sender<WakeState>,
}

impl Default for ManualWaker {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualWaker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(WakeState::default());
        Self { state }
    }

    /// Release every parked waiter.
    pub fn kick(&self) {
        self.state.send_modify(|s| {
            s.generation = s.generation.wrapping_add(1);
            s.waiting = 0;
        });
    }

    /// Number of waiters currently parked.
    pub fn waiting(&self) -> usize {
        self.state.borrow().waiting
    }

    /// Wait until at least `waiters` streams are parked, then release them.
    pub async fn awaken(&self, waiters: usize) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| s.waiting >= waiters).await;
        self.kick();
    }
}

/// Un-registers a waiter whose wait was abandoned before a kick.
struct Parked<'a> {
    state: &'a watch::Sender<WakeState>,
    generation: u64,
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.state.send_if_modified(|s| {
            if s.generation == generation && s.waiting > 0 {
                s.waiting -= 1;
                true
            } else {
                false
            }
        });
    }
}

#[async_trait::async_trait]
impl Waker for ManualWaker {
    async fn wake(&self) {
        let mut rx = self.state.subscribe();
        let mut generation = 0;
        self.state.send_modify(|s| {
            s.waiting += 1;
            generation = s.generation;
        });
        let _parked = Parked { state: &self.state, generation };
        let _ = rx.wait_for(|s| s.generation != generation).await;
    }
}

/// Wakes on filesystem activity in the directories of the tailed paths, with
/// a polling fallback for filesystems that do not deliver notifications.
pub struct FsEventWaker {
    events: Arc<ManualWaker>,
    fallback: Duration,
    _watcher: Mutex<notify::RecommendedWatcher>,
}

impl FsEventWaker {
    pub fn new(paths: &[PathBuf], fallback: Duration) -> notify::Result<Self> {
        use notify::{RecursiveMode, Watcher};

        let events = Arc::new(ManualWaker::new());
        let kicker = Arc::clone(&events);
        let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
            kicker.kick();
        })?;

        // Watch parent directories so creation after rotation is seen too.
        let dirs: BTreeSet<&Path> = paths
            .iter()
            .map(|p| match p.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            })
            .collect();
        for dir in dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        Ok(Self { events, fallback, _watcher: Mutex::new(watcher) })
    }
}

#[async_trait::async_trait]
impl Waker for FsEventWaker {
    async fn wake(&self) {
        tokio::select! {
            _ = self.events.wake() => {}
            _ = tokio::time::sleep(self.fallback) => {}
        }
    }
}

#[cfg(test)]
#[path = "waker_tests.rs"]
mod tests;

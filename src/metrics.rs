//! Process-wide per-path counters.
//!
//! Streams count their failures and state changes here; nothing on the data
//! path depends on them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use parking_lot::Mutex;

/// A named counter keyed by source pathname.
#[derive(Debug)]
pub struct CounterMap {
    name: &'static str,
    counts: Mutex<HashMap<PathBuf, u64>>,
}

impl CounterMap {
    fn new(name: &'static str) -> Self {
        Self { name, counts: Mutex::new(HashMap::new()) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add(&self, path: &Path, n: u64) {
        *self.counts.lock().entry(path.to_path_buf()).or_default() += n;
    }

    pub fn get(&self, path: &Path) -> u64 {
        self.counts.lock().get(path).copied().unwrap_or(0)
    }

    /// All non-zero counts, sorted by path.
    pub fn snapshot(&self) -> Vec<(PathBuf, u64)> {
        let mut out: Vec<_> = self.counts.lock().iter().map(|(p, n)| (p.clone(), *n)).collect();
        out.sort();
        out
    }
}

#[derive(Debug)]
pub struct Metrics {
    pub log_errors: CounterMap,
    pub file_rotations: CounterMap,
    pub file_truncates: CounterMap,
}

static METRICS: LazyLock<Metrics> = LazyLock::new(|| Metrics {
    log_errors: CounterMap::new("log_errors_total"),
    file_rotations: CounterMap::new("file_rotations_total"),
    file_truncates: CounterMap::new("file_truncates_total"),
});

pub fn global() -> &'static Metrics {
    &METRICS
}

impl Metrics {
    pub fn counters(&self) -> [&CounterMap; 3] {
        [&self.log_errors, &self.file_rotations, &self.file_truncates]
    }
}

//! Pipeline statistics: line counters plus a histogram of how long the
//! output side waits on the wrapped program for each uncached line.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Recent waits kept for percentiles.
const WAIT_WINDOW: usize = 1024;

/// Child wait times in microseconds. Percentiles cover the most recent
/// `window` samples; the count and maximum cover the whole run.
struct WaitHistogram {
    recent: VecDeque<u64>,
    window: usize,
    total: u64,
    max: u64,
}

impl WaitHistogram {
    fn new(window: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(window),
            window,
            total: 0,
            max: 0,
        }
    }

    fn record(&mut self, micros: u64) {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(micros);
        self.total += 1;
        self.max = self.max.max(micros);
    }

    /// Nearest-rank percentiles over the window, in the order asked.
    fn percentiles<const N: usize>(&self, ps: [u64; N]) -> [u64; N] {
        let mut sorted: Vec<u64> = self.recent.iter().copied().collect();
        sorted.sort_unstable();
        ps.map(|p| nearest_rank(&sorted, p))
    }

    fn summary(&self) -> WaitSummary {
        let [p50, p95, p99] = self.percentiles([50, 95, 99]);
        WaitSummary {
            p50,
            p95,
            p99,
            max: self.max,
            samples: self.total,
        }
    }
}

fn nearest_rank(sorted: &[u64], p: u64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p as usize * sorted.len()).div_ceil(100);
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Counters shared by both pumps. Each counter has a single writer.
pub struct PipelineStats {
    lines_read: AtomicU64,
    lines_forwarded: AtomicU64,
    lines_written: AtomicU64,
    pool_bytes: AtomicU64,
    distinct_keys: AtomicU64,
    child_wait: Mutex<WaitHistogram>,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            lines_read: AtomicU64::new(0),
            lines_forwarded: AtomicU64::new(0),
            lines_written: AtomicU64::new(0),
            pool_bytes: AtomicU64::new(0),
            distinct_keys: AtomicU64::new(0),
            child_wait: Mutex::new(WaitHistogram::new(WAIT_WINDOW)),
        }
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Input side: one line read; `forwarded` if it went to the child.
    pub fn record_read(&self, forwarded: bool) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
        if forwarded {
            self.lines_forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_distinct_keys(&self, keys: usize) {
        self.distinct_keys.store(keys as u64, Ordering::Relaxed);
    }

    /// Output side: one line written.
    pub fn record_written(&self) {
        self.lines_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Output side: a child line was read after waiting `waited` and pooled.
    pub fn record_child_line(&self, waited: Duration, bytes: usize) {
        self.pool_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        let micros = u64::try_from(waited.as_micros()).unwrap_or(u64::MAX);
        self.child_wait.lock().record(micros);
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    pub fn lines_forwarded(&self) -> u64 {
        self.lines_forwarded.load(Ordering::Relaxed)
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let lines_read = self.lines_read();
        let lines_forwarded = self.lines_forwarded();
        StatsSnapshot {
            lines_read,
            lines_forwarded,
            cache_hits: lines_read.saturating_sub(lines_forwarded),
            lines_written: self.lines_written(),
            distinct_keys: self.distinct_keys.load(Ordering::Relaxed),
            pool_bytes: self.pool_bytes.load(Ordering::Relaxed),
            child_wait_us: self.child_wait.lock().summary(),
        }
    }
}

/// Child wait summary in microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitSummary {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
    pub samples: u64,
}

/// Point-in-time copy of the counters, printed by `--stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub lines_forwarded: u64,
    pub cache_hits: u64,
    pub lines_written: u64,
    pub distinct_keys: u64,
    pub pool_bytes: u64,
    pub child_wait_us: WaitSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_are_reads_minus_forwards() {
        let stats = PipelineStats::new();
        for forwarded in [true, true, false, true, false] {
            stats.record_read(forwarded);
        }
        stats.set_distinct_keys(3);
        let snap = stats.snapshot();
        assert_eq!(snap.lines_read, 5);
        assert_eq!(snap.lines_forwarded, 3);
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.distinct_keys, 3);
    }

    #[test]
    fn wait_percentiles() {
        let stats = PipelineStats::new();
        for us in 1..=100u64 {
            stats.record_child_line(Duration::from_micros(us), 2);
        }
        let snap = stats.snapshot();
        assert_eq!(snap.pool_bytes, 200);
        assert_eq!(snap.child_wait_us.samples, 100);
        assert_eq!(snap.child_wait_us.p50, 50);
        assert_eq!(snap.child_wait_us.p95, 95);
        assert_eq!(snap.child_wait_us.p99, 99);
        assert_eq!(snap.child_wait_us.max, 100);
    }

    #[test]
    fn window_drops_oldest_but_keeps_max() {
        let mut waits = WaitHistogram::new(4);
        for us in [100, 1, 2, 3, 4] {
            waits.record(us);
        }
        assert_eq!(waits.percentiles([0, 50, 100]), [1, 2, 4]);
        let summary = waits.summary();
        assert_eq!(summary.max, 100);
        assert_eq!(summary.samples, 5);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let mut waits = WaitHistogram::new(8);
        waits.record(7);
        assert_eq!(waits.percentiles([1, 50, 99]), [7, 7, 7]);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let json = serde_json::to_value(PipelineStats::new().snapshot()).unwrap();
        assert_eq!(json["lines_read"], 0);
        assert_eq!(json["child_wait_us"]["samples"], 0);
    }
}

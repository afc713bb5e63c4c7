//! Latency accumulation and nearest-rank percentile summaries.
//!
//! Samples are appended from many concurrent dispatch tasks and only read
//! once all of them have stopped, so a single mutex guarding a growable
//! vector is all the synchronisation required.

use std::time::Duration;

use parking_lot::Mutex;
use rama::telemetry::tracing;

/// Thread-safe, append-only set of observed round-trip durations.
#[derive(Debug, Default)]
pub struct LatencyRecorder {
    samples: Mutex<Vec<Duration>>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, duration: Duration) {
        self.samples.lock().push(duration);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Compute the percentile summary over a sorted copy of all samples.
    ///
    /// Returns `None` if nothing was recorded.
    pub fn summarize(&self) -> Option<LatencySummary> {
        let mut sorted = self.samples.lock().clone();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();
        LatencySummary::from_sorted(&sorted)
    }
}

/// Percentiles reported at the end of a run, expressed per myriad (1/10_000).
const P50: usize = 5_000;
const P90: usize = 9_000;
const P99: usize = 9_900;
const P99_9: usize = 9_990;
const P99_99: usize = 9_999;
const P100: usize = 10_000;

/// Nearest-rank percentile: the sample at index `floor(len * p)`,
/// clamped to the last index. No interpolation.
///
/// `sorted` must be sorted ascending.
pub fn nearest_rank(sorted: &[Duration], per_myriad: usize) -> Option<Duration> {
    let last = sorted.len().checked_sub(1)?;
    let index = (sorted.len() * per_myriad / P100).min(last);
    sorted.get(index).copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: usize,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub p99_9: Duration,
    pub p99_99: Duration,
    pub p100: Duration,
}

impl LatencySummary {
    fn from_sorted(sorted: &[Duration]) -> Option<Self> {
        Some(Self {
            count: sorted.len(),
            p50: nearest_rank(sorted, P50)?,
            p90: nearest_rank(sorted, P90)?,
            p99: nearest_rank(sorted, P99)?,
            p99_9: nearest_rank(sorted, P99_9)?,
            p99_99: nearest_rank(sorted, P99_99)?,
            p100: nearest_rank(sorted, P100)?,
        })
    }

    /// Labelled percentiles in ascending order.
    pub fn percentiles(&self) -> [(&'static str, Duration); 6] {
        [
            ("50", self.p50),
            ("90", self.p90),
            ("99", self.p99),
            ("99.9", self.p99_9),
            ("99.99", self.p99_99),
            ("100", self.p100),
        ]
    }

    /// Log one line per percentile.
    pub fn log(&self) {
        tracing::info!(count = self.count, "latency percentiles");
        for (label, duration) in self.percentiles() {
            tracing::info!("Perc {label:>3}: {duration:?}");
        }
    }
}

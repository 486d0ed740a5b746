#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics")]
use std::time::Instant;

/// Optional performance counters for the pool.
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct Metrics {
    /// Value tasks accepted by `submit_value`.
    pub value_submissions: AtomicU64,
    /// Object tasks accepted by `submit_object`.
    pub object_submissions: AtomicU64,
    /// Submissions refused (lock set or queue over its bound).
    pub rejected_submissions: AtomicU64,
    /// Tasks handed to a worker by the dispatcher.
    pub dispatched: AtomicU64,
    /// Tasks moved from a primary queue to a missed queue.
    pub spilled: AtomicU64,
    /// Workers promoted from Purging back to available.
    pub promoted: AtomicU64,
    /// Dispatcher cycles run.
    pub cycles: AtomicU64,
    /// Time when metrics collection started.
    pub start_time: Instant,
}

#[cfg(feature = "metrics")]
impl Metrics {
    pub fn new() -> Self {
        Self {
            value_submissions: AtomicU64::new(0),
            object_submissions: AtomicU64::new(0),
            rejected_submissions: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            spilled: AtomicU64::new(0),
            promoted: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Returns a snapshot of current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            value_submissions: self.value_submissions.load(Ordering::Relaxed),
            object_submissions: self.object_submissions.load(Ordering::Relaxed),
            rejected_submissions: self.rejected_submissions.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            spilled: self.spilled.load(Ordering::Relaxed),
            promoted: self.promoted.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(feature = "metrics")]
impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

/// Snapshot of pool counters at a point in time.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub value_submissions: u64,
    pub object_submissions: u64,
    pub rejected_submissions: u64,
    pub dispatched: u64,
    pub spilled: u64,
    pub promoted: u64,
    pub cycles: u64,
    pub elapsed_seconds: f64,
}

#[cfg(feature = "metrics")]
impl MetricsSnapshot {
    /// Dispatched tasks per second since the pool came up.
    pub fn dispatch_rate(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.dispatched as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Submissions still waiting in some queue, by difference.
    pub fn queued(&self) -> i64 {
        (self.value_submissions + self.object_submissions) as i64 - self.dispatched as i64
    }
}

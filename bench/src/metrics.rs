//! Per-run counters shared by the worker threads

use crate::scenarios::BenchResult;
use aistore_tblspc::TablespaceError;
use std::sync::atomic::{AtomicU64, Ordering};

/// How one attempt is counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Lost a race with another thread (lock, serialization, name taken)
    Conflict,
    Failed,
}

impl Outcome {
    pub fn classify(result: &BenchResult<()>) -> Self {
        let Err(err) = result else {
            return Outcome::Done;
        };
        match err.downcast_ref::<TablespaceError>().map(TablespaceError::root_cause) {
            Some(
                TablespaceError::ObjectInUse(_)
                | TablespaceError::SerializationConflict(_)
                | TablespaceError::AlreadyExists(_),
            ) => Outcome::Conflict,
            _ => Outcome::Failed,
        }
    }
}

#[derive(Default)]
pub struct Metrics {
    ops: AtomicU64,
    conflicts: AtomicU64,
    failures: AtomicU64,
    latency_sum_ns: AtomicU64,
    latency_max_ns: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt counts towards latency, whatever its outcome
    pub fn record(&self, outcome: Outcome, latency_ns: u64) {
        self.ops.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ns.fetch_add(latency_ns, Ordering::Relaxed);
        self.latency_max_ns.fetch_max(latency_ns, Ordering::Relaxed);
        match outcome {
            Outcome::Done => {}
            Outcome::Conflict => {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Failed => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn total_ops(&self) -> u64 {
        self.ops.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn avg_latency_us(&self) -> f64 {
        match self.total_ops() {
            0 => 0.0,
            ops => self.latency_sum_ns.load(Ordering::Relaxed) as f64 / ops as f64 / 1000.0,
        }
    }

    pub fn max_latency_us(&self) -> f64 {
        self.latency_max_ns.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

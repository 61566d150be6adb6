//! Reconciliation statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every operation of one client
pub struct ReconcileStats {
    pub fetches: AtomicU64,
    pub fetch_misses: AtomicU64,
    pub creates: AtomicU64,
    pub writes: AtomicU64,
    pub deletes: AtomicU64,
    pub retries: AtomicU64,
    pub drift_detected: AtomicU64,
    pub conflicts: AtomicU64,
    pub guard_rejections: AtomicU64,
}

impl ReconcileStats {
    pub fn new() -> Self {
        Self {
            fetches: AtomicU64::new(0),
            fetch_misses: AtomicU64::new(0),
            creates: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            drift_detected: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            guard_rejections: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReconcileStatsSnapshot {
        ReconcileStatsSnapshot {
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_misses: self.fetch_misses.load(Ordering::Relaxed),
            creates: self.creates.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            drift_detected: self.drift_detected.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            guard_rejections: self.guard_rejections.load(Ordering::Relaxed),
        }
    }
}

impl Default for ReconcileStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStatsSnapshot {
    pub fetches: u64,
    pub fetch_misses: u64,
    pub creates: u64,
    pub writes: u64,
    pub deletes: u64,
    pub retries: u64,
    pub drift_detected: u64,
    pub conflicts: u64,
    pub guard_rejections: u64,
}

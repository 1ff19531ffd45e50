//! Pool counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Sends accepted by a producer.
    pub sends_succeeded: u64,
    /// Sends a producer rejected.
    pub sends_failed: u64,
    /// Sends that found no routable cluster.
    pub sends_unroutable: u64,
    /// Round-robin picks skipped because the cluster had just been retired.
    pub routing_misses: u64,
    /// Completed `reload()` cycles.
    pub reloads: u64,
    /// Reconciliation steps that failed (fetch, create, start, publish).
    pub reload_failures: u64,
    pub producers_created: u64,
    pub producers_rescued: u64,
    pub producers_retired: u64,
    pub producers_reclaimed: u64,
    /// `stop()` calls that returned an error.
    pub stop_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub sends_succeeded: AtomicU64,
    pub sends_failed: AtomicU64,
    pub sends_unroutable: AtomicU64,
    pub routing_misses: AtomicU64,
    pub reloads: AtomicU64,
    pub reload_failures: AtomicU64,
    pub producers_created: AtomicU64,
    pub producers_rescued: AtomicU64,
    pub producers_retired: AtomicU64,
    pub producers_reclaimed: AtomicU64,
    pub stop_failures: AtomicU64,
}

impl PoolCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            sends_succeeded: self.sends_succeeded.load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
            sends_unroutable: self.sends_unroutable.load(Ordering::Relaxed),
            routing_misses: self.routing_misses.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
            producers_created: self.producers_created.load(Ordering::Relaxed),
            producers_rescued: self.producers_rescued.load(Ordering::Relaxed),
            producers_retired: self.producers_retired.load(Ordering::Relaxed),
            producers_reclaimed: self.producers_reclaimed.load(Ordering::Relaxed),
            stop_failures: self.stop_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = PoolCounters::default();
        PoolCounters::incr(&counters.sends_succeeded);
        for _ in 0..3 {
            PoolCounters::incr(&counters.producers_created);
        }

        let stats = counters.snapshot();
        assert_eq!(stats.sends_succeeded, 1);
        assert_eq!(stats.producers_created, 3);
        assert_eq!(stats.sends_failed, 0);

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"producers_created\":3"));
    }
}

//! Producer slots and the retirement ledger.
//!
//! A `ProducerSlot` pairs a producer with the time it entered its current map: when it
//! became active, or when it was retired. The `RetirementLedger` is the retiring map:
//! removed clusters whose producers are still draining, keyed by cluster name. A
//! cluster is in the ledger iff its producer is retiring; the removal timestamp lives in
//! the slot, so the two cannot drift apart.

use crate::producer::ClusterProducer;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A producer together with the time it entered its current map.
#[derive(Clone)]
pub struct ProducerSlot {
    pub producer: Arc<dyn ClusterProducer>,
    pub since_ms: i64,
}

impl ProducerSlot {
    pub fn new(producer: Arc<dyn ClusterProducer>, since_ms: i64) -> Self {
        Self { producer, since_ms }
    }

    /// Same producer, re-stamped.
    pub fn restamp(self, since_ms: i64) -> Self {
        Self {
            producer: self.producer,
            since_ms,
        }
    }
}

impl fmt::Debug for ProducerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerSlot")
            .field("cluster", &self.producer.cluster_name())
            .field("state", &self.producer.state())
            .field("since_ms", &self.since_ms)
            .finish()
    }
}

/// Retiring producers keyed by cluster name, with their removal time.
#[derive(Debug, Default)]
pub struct RetirementLedger {
    entries: HashMap<String, ProducerSlot>,
}

impl RetirementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, cluster: &str) -> bool {
        self.entries.contains_key(cluster)
    }

    /// Record `producer` as retired at `now_ms`.
    pub fn retire(&mut self, cluster: impl Into<String>, producer: Arc<dyn ClusterProducer>, now_ms: i64) {
        self.entries
            .insert(cluster.into(), ProducerSlot::new(producer, now_ms));
    }

    /// Take a retiring producer back out of the ledger.
    pub fn rescue(&mut self, cluster: &str) -> Option<ProducerSlot> {
        self.entries.remove(cluster)
    }

    /// Remove and return every entry retired at least `grace_ms` before `now_ms`.
    pub fn take_expired(&mut self, now_ms: i64, grace_ms: i64) -> Vec<(String, ProducerSlot)> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| now_ms.saturating_sub(slot.since_ms) >= grace_ms)
            .map(|(name, _)| name.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|name| self.entries.remove(&name).map(|slot| (name, slot)))
            .collect()
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> Vec<(String, ProducerSlot)> {
        self.entries.drain().collect()
    }

    /// Cluster names with their removal time, sorted by name.
    pub fn removal_times(&self) -> Vec<(String, i64)> {
        let mut times: Vec<(String, i64)> = self
            .entries
            .iter()
            .map(|(name, slot)| (name.clone(), slot.since_ms))
            .collect();
        times.sort();
        times
    }
}

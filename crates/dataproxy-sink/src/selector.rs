//! Cluster selection policy.
//!
//! A selector narrows the full configured cluster list to the clusters one pool should
//! serve. The pool treats the result as opaque but relies on two properties:
//!
//! 1. The output order is stable across calls for the same input, since round-robin
//!    order follows it.
//! 2. Selection is cheap and free of I/O; it runs on every reload.

use crate::config::ClusterConfig;
use siphasher::sip::SipHasher;
use std::hash::{Hash, Hasher};

/// Picks the subset of configured clusters a pool serves.
pub trait ClusterSelector: Send + Sync {
    fn select(&self, all: &[ClusterConfig]) -> Vec<ClusterConfig>;
}

/// Serves every configured cluster, in configured order.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllClustersSelector;

impl ClusterSelector for AllClustersSelector {
    fn select(&self, all: &[ClusterConfig]) -> Vec<ClusterConfig> {
        all.to_vec()
    }
}

/// Serves at most `max_clusters` clusters chosen by hashing the pool identity
/// together with each cluster name.
///
/// Different pools spread over different clusters, while one pool keeps the
/// same choice as long as the configured set does not change. The chosen
/// clusters are returned in configured order.
#[derive(Debug, Clone)]
pub struct HashedSubsetSelector {
    identity: String,
    max_clusters: usize,
}

impl HashedSubsetSelector {
    pub fn new(identity: impl Into<String>, max_clusters: usize) -> Self {
        Self {
            identity: identity.into(),
            max_clusters,
        }
    }

    fn rank(&self, cluster_name: &str) -> u64 {
        // Zero-keyed SipHash: ranks must not change across processes or toolchains
        let mut hasher = SipHasher::new();
        self.identity.hash(&mut hasher);
        cluster_name.hash(&mut hasher);
        hasher.finish()
    }
}

impl ClusterSelector for HashedSubsetSelector {
    fn select(&self, all: &[ClusterConfig]) -> Vec<ClusterConfig> {
        if all.len() <= self.max_clusters {
            return all.to_vec();
        }
        let mut ranked: Vec<(u64, usize)> = all
            .iter()
            .enumerate()
            .map(|(idx, config)| (self.rank(&config.cluster_name), idx))
            .collect();
        ranked.sort_unstable();
        let mut chosen: Vec<usize> = ranked
            .into_iter()
            .take(self.max_clusters)
            .map(|(_, idx)| idx)
            .collect();
        chosen.sort_unstable();
        chosen.into_iter().map(|idx| all[idx].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters(names: &[&str]) -> Vec<ClusterConfig> {
        names
            .iter()
            .map(|name| ClusterConfig::new(*name, format!("{}:9092", name)))
            .collect()
    }

    fn names(configs: &[ClusterConfig]) -> Vec<&str> {
        configs.iter().map(|c| c.cluster_name.as_str()).collect()
    }

    #[test]
    fn test_all_clusters_keeps_order() {
        let all = clusters(&["c", "a", "b"]);
        assert_eq!(names(&AllClustersSelector.select(&all)), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_hashed_subset_is_stable() {
        let all = clusters(&["k1", "k2", "k3", "k4", "k5", "k6"]);
        let selector = HashedSubsetSelector::new("zone-a", 3);

        let first = selector.select(&all);
        let second = selector.select(&all);
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_hashed_subset_keeps_configured_order() {
        let all = clusters(&["k1", "k2", "k3", "k4", "k5", "k6"]);
        let chosen = HashedSubsetSelector::new("zone-b", 4).select(&all);
        let positions: Vec<usize> = chosen
            .iter()
            .map(|c| all.iter().position(|a| a.cluster_name == c.cluster_name).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_hashed_subset_matches_across_instances() {
        let all = clusters(&["k1", "k2", "k3", "k4", "k5", "k6", "k7", "k8"]);
        let a = HashedSubsetSelector::new("zone-a", 2).select(&all);
        let b = HashedSubsetSelector::new("zone-a".to_string(), 2).select(&all);
        assert_eq!(a, b);

        // rank is a pure function of identity and cluster name
        let mut expected = SipHasher::new();
        "zone-a".hash(&mut expected);
        "k3".hash(&mut expected);
        assert_eq!(
            HashedSubsetSelector::new("zone-a", 2).rank("k3"),
            expected.finish()
        );
    }

    #[test]
    fn test_hashed_subset_small_input_passthrough() {
        let all = clusters(&["k1", "k2"]);
        let chosen = HashedSubsetSelector::new("zone-a", 5).select(&all);
        assert_eq!(names(&chosen), vec!["k1", "k2"]);
    }
}

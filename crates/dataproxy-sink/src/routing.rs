//! Routing table and round-robin cursor.
//!
//! The table is an ordered list of cluster names that is replaced wholesale on reload
//! and never mutated in place. Readers clone the `Arc` under the read lock and release
//! it immediately, so a send never holds the lock while talking to a producer, and a
//! reload only holds the write lock for the pointer swap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Atomically swappable ordered list of dispatchable cluster names.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: RwLock<Arc<Vec<String>>>,
    cursor: AtomicUsize,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent view of the current routes.
    pub async fn snapshot(&self) -> Arc<Vec<String>> {
        Arc::clone(&*self.routes.read().await)
    }

    /// Replace the routes if `routes` differs from the current list.
    ///
    /// Returns `true` when the table changed.
    pub async fn publish(&self, routes: Vec<String>) -> bool {
        let mut current = self.routes.write().await;
        if current.as_slice() == routes.as_slice() {
            return false;
        }
        *current = Arc::new(routes);
        true
    }

    /// Empty the table.
    pub async fn clear(&self) {
        *self.routes.write().await = Arc::new(Vec::new());
    }

    /// Advance the shared cursor and map it into `0..len`.
    ///
    /// `len` must be non-zero. The cursor wraps on overflow; being unsigned, the
    /// reduced index is always in range.
    pub fn next_index(&self, len: usize) -> usize {
        debug_assert!(len > 0);
        self.cursor.fetch_add(1, Ordering::Relaxed) % len
    }

    /// Round-robin candidates from `snapshot`, at most one full cycle.
    ///
    /// Every call to `next()` advances the shared cursor, so concurrent senders
    /// interleave fairly.
    pub fn candidates<'a>(&'a self, snapshot: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
        (0..snapshot.len()).map(move |_| snapshot[self.next_index(snapshot.len())].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_publish_only_on_change() {
        let table = RoutingTable::new();
        assert!(table.snapshot().await.is_empty());

        assert!(table.publish(routes(&["a", "b"])).await);
        assert!(!table.publish(routes(&["a", "b"])).await);
        // order matters
        assert!(table.publish(routes(&["b", "a"])).await);
        assert_eq!(*table.snapshot().await, routes(&["b", "a"]));
    }

    #[tokio::test]
    async fn test_snapshot_survives_swap() {
        let table = RoutingTable::new();
        table.publish(routes(&["x"])).await;
        let old = table.snapshot().await;
        table.publish(routes(&["y", "z"])).await;

        assert_eq!(*old, routes(&["x"]));
        assert_eq!(table.snapshot().await.len(), 2);

        table.clear().await;
        assert!(table.snapshot().await.is_empty());
    }

    #[test]
    fn test_round_robin_cycle() {
        let table = RoutingTable::new();
        let snapshot = routes(&["a", "b", "c"]);
        let picked: Vec<&str> = (0..6)
            .map(|_| snapshot[table.next_index(snapshot.len())].as_str())
            .collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_candidates_bounded_to_one_cycle() {
        let table = RoutingTable::new();
        let snapshot = routes(&["a", "b"]);
        let all: Vec<&str> = table.candidates(&snapshot).collect();
        assert_eq!(all, vec!["a", "b"]);
    }

    #[test]
    fn test_cursor_wraps() {
        let table = RoutingTable::new();
        table.cursor.store(usize::MAX, Ordering::Relaxed);
        let len = 3;
        assert_eq!(table.next_index(len), usize::MAX % len);
        assert_eq!(table.next_index(len), 0);
    }
}

//! Zone producer pool.
//!
//! The pool fronts a set of backend message-queue clusters for one zone. It routes every
//! event to exactly one live cluster producer while the configured clusters and topics
//! change underneath it.
//!
//! ## Data Structures
//!
//! - **Routing table**: ordered cluster names, swapped wholesale (see `RoutingTable`)
//! - **Active map**: `DashMap` of cluster name to `ProducerSlot`; `send()` does point
//!   lookups on it without taking any pool-wide lock
//! - **Retirement ledger**: producers removed from routing but still draining, behind
//!   the bookkeeping mutex
//! - **Topic set**: every topic ever observed; only grows
//!
//! ## Locking
//!
//! The bookkeeping mutex (`retiring`) covers the active/retiring pair and the ledger
//! together: rescue, retirement and reclamation all hold it, so a cluster is never in
//! both maps. It is never taken by `send()`, and it is released while new producers are
//! created and started. The routing table's write lock is held only for the swap.
//!
//! ## Reload Cycle
//!
//! 1. Fetch configured clusters, narrow them through the selector
//! 2. Keep active clusters, rescue retiring ones, create the rest
//! 3. Publish the new routing list if it changed
//! 4. Retire active clusters that were not selected
//! 5. Union the upstream topic set into the tracked set and broadcast it on change
//!
//! ## Example
//!
//! ```ignore
//! use dataproxy_sink::{AllClustersSelector, ZoneProducerPool};
//!
//! let pool = ZoneProducerPool::builder()
//!     .name("zone-a")
//!     .config_source(source)
//!     .selector(Arc::new(AllClustersSelector))
//!     .producer_factory(factory)
//!     .build()?;
//!
//! pool.start().await;
//! let accepted = pool.send(&event).await;
//! pool.close().await;
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::{ClusterConfig, PoolConfig, SinkContext};
use crate::error::{Result, SinkError};
use crate::event::BatchPack;
use crate::ledger::{ProducerSlot, RetirementLedger};
use crate::producer::{ClusterProducer, ProducerFactory};
use crate::routing::RoutingTable;
use crate::selector::{AllClustersSelector, ClusterSelector};
use crate::source::ConfigSource;
use crate::stats::{PoolCounters, PoolStats};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Routing snapshots one `dispatch()` may go through when reloads keep
/// replacing the table under it.
const MAX_SNAPSHOT_ATTEMPTS: usize = 3;

/// Outcome of one cluster reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub pool: String,
    /// Routing list after the reload, in selector order.
    pub routes: Vec<String>,
    /// Clusters whose producers were created and started.
    pub created: Vec<String>,
    /// Clusters taken back from retirement with their live producer.
    pub rescued: Vec<String>,
    /// Clusters that were already active and stay active.
    pub unchanged: Vec<String>,
    /// Clusters moved from active to retiring.
    pub removed: Vec<String>,
    /// Selected clusters whose producer could not be created or started.
    pub failed: Vec<String>,
    /// Whether the routing table was replaced.
    pub routing_changed: bool,
}

impl ReloadSummary {
    fn new(pool: &str) -> Self {
        Self {
            pool: pool.to_string(),
            ..Self::default()
        }
    }

    /// Whether the reload altered pool state.
    pub fn changed(&self) -> bool {
        self.routing_changed || !self.created.is_empty() || !self.removed.is_empty()
    }
}

impl fmt::Display for ReloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reload {}'s cluster info, current clusters [{}], removed [{}], created [{}], rescued [{}], unchanged [{}]",
            self.pool,
            self.routes.join(", "),
            self.removed.join(", "),
            self.created.join(", "),
            self.rescued.join(", "),
            self.unchanged.join(", "),
        )?;
        if !self.failed.is_empty() {
            write!(f, ", failed [{}]", self.failed.join(", "))?;
        }
        Ok(())
    }
}

/// Hot-reloadable pool of cluster producers for one zone.
pub struct ZoneProducerPool {
    name: String,
    config: PoolConfig,
    context: SinkContext,
    source: Arc<dyn ConfigSource>,
    selector: Arc<dyn ClusterSelector>,
    factory: Arc<dyn ProducerFactory>,
    clock: Arc<dyn Clock>,
    routing: RoutingTable,
    active: DashMap<String, ProducerSlot>,
    /// Bookkeeping lock for the active/retiring pair and the ledger.
    retiring: Mutex<RetirementLedger>,
    topics: Mutex<BTreeSet<String>>,
    /// Serializes reload cycles and the individual reconcile steps.
    reload_guard: Mutex<()>,
    counters: PoolCounters,
}

impl fmt::Debug for ZoneProducerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneProducerPool")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("active", &self.active.len())
            .finish()
    }
}

impl ZoneProducerPool {
    pub fn builder() -> ZoneProducerPoolBuilder {
        ZoneProducerPoolBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Perform the initial reload. Failures are logged; the next scheduled
    /// reload retries.
    pub async fn start(&self) {
        info!(pool = %self.name, "Starting zone producer pool");
        self.reload().await;
    }

    /// Stop every retiring producer, then every active one, then clear all state.
    ///
    /// Meant to be called once at shutdown.
    pub async fn close(&self) {
        let mut ledger = self.retiring.lock().await;
        for (name, slot) in ledger.drain() {
            self.stop_producer(&name, slot.producer.as_ref(), "retiring")
                .await;
        }

        let names: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((name, slot)) = self.active.remove(&name) {
                self.stop_producer(&name, slot.producer.as_ref(), "active")
                    .await;
            }
        }
        drop(ledger);

        self.routing.clear().await;
        self.topics.lock().await.clear();
        info!(pool = %self.name, "Closed zone producer pool");
    }

    /// Reconcile clusters, then topics. Errors in either step are logged and do
    /// not abort the other.
    ///
    /// Returns the cluster summary when that step succeeded.
    pub async fn reload(&self) -> Option<ReloadSummary> {
        let _guard = self.reload_guard.lock().await;

        let summary = match self.reconcile_clusters_locked().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                PoolCounters::incr(&self.counters.reload_failures);
                error!(pool = %self.name, error = %e, "Reload cluster info failure");
                None
            }
        };

        if let Err(e) = self.reconcile_topics_locked().await {
            PoolCounters::incr(&self.counters.reload_failures);
            error!(pool = %self.name, error = %e, "Reload topic info failure");
        }

        PoolCounters::incr(&self.counters.reloads);
        summary
    }

    /// Bring the active/retiring sets in line with the selected clusters.
    ///
    /// Waits for any reload in progress.
    pub async fn reconcile_clusters(&self) -> Result<ReloadSummary> {
        let _guard = self.reload_guard.lock().await;
        self.reconcile_clusters_locked().await
    }

    /// Union the upstream topic set into the tracked set and, if it changed,
    /// publish the whole accumulated set on every active producer.
    ///
    /// Topics are never removed from the tracked set. Returns whether a
    /// broadcast happened. Waits for any reload in progress.
    pub async fn reconcile_topics(&self) -> Result<bool> {
        let _guard = self.reload_guard.lock().await;
        self.reconcile_topics_locked().await
    }

    async fn reconcile_clusters_locked(&self) -> Result<ReloadSummary> {
        let all = self.source.list_configured_clusters().await?;
        let selected = self.selector.select(&all);
        let mut summary = ReloadSummary::new(&self.name);
        if selected.is_empty() {
            info!(pool = %self.name, "Reload {}'s cluster info, but empty", self.name);
            return Ok(summary);
        }

        // Selector order, first occurrence wins
        let mut seen = HashSet::new();
        let order: Vec<&ClusterConfig> = selected
            .iter()
            .filter(|config| seen.insert(config.cluster_name.clone()))
            .collect();

        let mut to_create = Vec::new();
        {
            let mut ledger = self.retiring.lock().await;
            let now = self.clock.now_ms();
            for config in &order {
                let name = &config.cluster_name;
                if self.active.contains_key(name) {
                    summary.unchanged.push(name.clone());
                    continue;
                }
                match ledger.rescue(name) {
                    Some(slot) => {
                        self.active.insert(name.clone(), slot.restamp(now));
                        summary.rescued.push(name.clone());
                        PoolCounters::incr(&self.counters.producers_rescued);
                    }
                    None => to_create.push(*config),
                }
            }
        }

        if !to_create.is_empty() {
            let topics = self.topics.lock().await.clone();
            for config in to_create {
                match self.create_producer(config, &topics).await {
                    Ok(producer) => {
                        let now = self.clock.now_ms();
                        let duplicate = match self.active.entry(config.cluster_name.clone()) {
                            Entry::Occupied(_) => Some(producer),
                            Entry::Vacant(slot) => {
                                slot.insert(ProducerSlot::new(producer, now));
                                None
                            }
                        };
                        match duplicate {
                            // incumbent keeps the route; the fresh one must not leak
                            Some(producer) => {
                                warn!(
                                    pool = %self.name,
                                    cluster = %config.cluster_name,
                                    "Cluster became active during creation, stopping duplicate producer"
                                );
                                self.stop_producer(&config.cluster_name, producer.as_ref(), "duplicate")
                                    .await;
                                summary.unchanged.push(config.cluster_name.clone());
                            }
                            None => {
                                summary.created.push(config.cluster_name.clone());
                                PoolCounters::incr(&self.counters.producers_created);
                            }
                        }
                    }
                    Err(e) => {
                        PoolCounters::incr(&self.counters.reload_failures);
                        error!(
                            pool = %self.name,
                            cluster = %config.cluster_name,
                            error = %e,
                            "Failed to create cluster producer"
                        );
                        summary.failed.push(config.cluster_name.clone());
                    }
                }
            }
        }

        let routes: Vec<String> = order
            .iter()
            .filter(|config| self.active.contains_key(config.cluster_name.as_str()))
            .map(|config| config.cluster_name.clone())
            .collect();
        summary.routing_changed = self.routing.publish(routes.clone()).await;

        {
            let mut ledger = self.retiring.lock().await;
            let now = self.clock.now_ms();
            let keep: HashSet<&str> = routes.iter().map(String::as_str).collect();
            let stale: Vec<String> = self
                .active
                .iter()
                .filter(|entry| !keep.contains(entry.key().as_str()))
                .map(|entry| entry.key().clone())
                .collect();
            for name in stale {
                if let Some((name, slot)) = self.active.remove(&name) {
                    ledger.retire(name.clone(), slot.producer, now);
                    summary.removed.push(name);
                    PoolCounters::incr(&self.counters.producers_retired);
                }
            }
        }
        summary.removed.sort();
        summary.routes = routes;

        if !summary.changed() {
            if summary.failed.is_empty() {
                debug!(pool = %self.name, "Reload cluster info, nothing changed");
            } else {
                warn!(pool = %self.name, "{}", summary);
            }
            return Ok(summary);
        }
        if self.source.is_backend_ready() {
            info!(pool = %self.name, "{}", summary);
        } else {
            info!(pool = %self.name, "{}, and updated sink status", summary);
            self.source.mark_backend_ready();
        }
        Ok(summary)
    }

    async fn reconcile_topics_locked(&self) -> Result<bool> {
        let current = self.source.list_known_topic_names().await?;
        let mut tracked = self.topics.lock().await;
        if current.is_empty() || *tracked == current {
            return Ok(false);
        }
        info!(
            pool = %self.name,
            current = ?current,
            last = ?*tracked,
            "Reload {}'s topics changed",
            self.name
        );
        tracked.extend(current);

        let producers: Vec<(String, Arc<dyn ClusterProducer>)> = self
            .active
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.value().producer)))
            .collect();
        for (name, producer) in producers {
            if let Err(e) = producer.publish_topics(&tracked).await {
                PoolCounters::incr(&self.counters.reload_failures);
                warn!(
                    pool = %self.name,
                    cluster = %name,
                    error = %e,
                    "Failed to publish topics"
                );
            }
        }
        Ok(true)
    }

    /// Stop retiring producers whose grace period has elapsed.
    ///
    /// Returns the reclaimed cluster names, sorted.
    pub async fn reclaim_expired(&self) -> Vec<String> {
        let mut ledger = self.retiring.lock().await;
        if ledger.is_empty() {
            return Vec::new();
        }
        let expired = ledger.take_expired(self.clock.now_ms(), self.config.grace_period_ms());
        if expired.is_empty() {
            return Vec::new();
        }

        let mut names = Vec::with_capacity(expired.len());
        for (name, slot) in expired {
            self.stop_producer(&name, slot.producer.as_ref(), "expired")
                .await;
            PoolCounters::incr(&self.counters.producers_reclaimed);
            names.push(name);
        }
        drop(ledger);

        names.sort();
        info!(
            pool = %self.name,
            reclaimed = ?names,
            "Clear {}'s expired cluster producers",
            self.name
        );
        names
    }

    /// Send `event` to one active cluster, round robin. Returns `true` when the
    /// cluster's producer accepted it.
    pub async fn send(&self, event: &BatchPack) -> bool {
        self.dispatch(event).await.is_ok()
    }

    /// Like `send`, but returns the accepting cluster's name or the reason the
    /// event was not delivered.
    ///
    /// A candidate that was retired after the routing snapshot was taken is
    /// skipped. Once a full cycle of the snapshot misses, the snapshot is
    /// refreshed if a reload replaced it meanwhile; otherwise the event is
    /// unroutable.
    pub async fn dispatch(&self, event: &BatchPack) -> Result<String> {
        let routes = self.routing.snapshot().await;
        self.dispatch_from(routes, event).await
    }

    async fn dispatch_from(&self, mut routes: Arc<Vec<String>>, event: &BatchPack) -> Result<String> {
        for _ in 0..MAX_SNAPSHOT_ATTEMPTS {
            for cluster in self.routing.candidates(&routes) {
                let producer = self
                    .active
                    .get(cluster)
                    .map(|slot| Arc::clone(&slot.producer));
                let Some(producer) = producer else {
                    PoolCounters::incr(&self.counters.routing_misses);
                    debug!(pool = %self.name, cluster = cluster, "Routing miss, trying next cluster");
                    continue;
                };
                return match producer.send(event).await {
                    Ok(()) => {
                        PoolCounters::incr(&self.counters.sends_succeeded);
                        Ok(cluster.to_string())
                    }
                    Err(e) => {
                        PoolCounters::incr(&self.counters.sends_failed);
                        Err(e)
                    }
                };
            }
            let latest = self.routing.snapshot().await;
            if Arc::ptr_eq(&latest, &routes) {
                break;
            }
            routes = latest;
        }
        PoolCounters::incr(&self.counters.sends_unroutable);
        Err(SinkError::NoRouteAvailable(self.name.clone()))
    }

    /// Current routing list.
    pub async fn routing_snapshot(&self) -> Vec<String> {
        self.routing.snapshot().await.as_ref().clone()
    }

    /// Names of active clusters, sorted.
    pub fn active_clusters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// When `cluster` became active, if it is.
    pub fn active_since(&self, cluster: &str) -> Option<i64> {
        self.active.get(cluster).map(|slot| slot.since_ms)
    }

    /// The active producer for `cluster`, if any.
    pub fn active_producer(&self, cluster: &str) -> Option<Arc<dyn ClusterProducer>> {
        self.active
            .get(cluster)
            .map(|slot| Arc::clone(&slot.producer))
    }

    /// Retiring clusters with their removal time, sorted by name.
    pub async fn retiring_clusters(&self) -> Vec<(String, i64)> {
        self.retiring.lock().await.removal_times()
    }

    /// Every topic observed so far.
    pub async fn topics(&self) -> BTreeSet<String> {
        self.topics.lock().await.clone()
    }

    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    async fn create_producer(
        &self,
        config: &ClusterConfig,
        topics: &BTreeSet<String>,
    ) -> Result<Arc<dyn ClusterProducer>> {
        let producer = self.factory.create(&self.name, config, &self.context)?;
        producer.start().await?;
        if !topics.is_empty() {
            if let Err(e) = producer.publish_topics(topics).await {
                PoolCounters::incr(&self.counters.reload_failures);
                warn!(
                    pool = %self.name,
                    cluster = %config.cluster_name,
                    error = %e,
                    "Failed to publish topics on new producer"
                );
            }
        }
        debug!(
            pool = %self.name,
            cluster = %config.cluster_name,
            url = %config.url,
            "Created cluster producer"
        );
        Ok(producer)
    }

    async fn stop_producer(&self, name: &str, producer: &dyn ClusterProducer, role: &str) {
        match producer.stop().await {
            Ok(()) => debug!(pool = %self.name, cluster = name, role = role, "Stopped cluster producer"),
            Err(e) => {
                PoolCounters::incr(&self.counters.stop_failures);
                warn!(
                    pool = %self.name,
                    cluster = name,
                    role = role,
                    error = %e,
                    "Failed to stop cluster producer"
                );
            }
        }
    }
}

/// Builder for `ZoneProducerPool`.
///
/// `config_source` and `producer_factory` are required. Defaults:
///
/// - `name`: "default"
/// - `selector`: `AllClustersSelector`
/// - `clock`: `SystemClock`
/// - `config`: `PoolConfig::default()`
/// - `context`: `SinkContext::default()`
pub struct ZoneProducerPoolBuilder {
    name: String,
    config: PoolConfig,
    context: SinkContext,
    source: Option<Arc<dyn ConfigSource>>,
    selector: Arc<dyn ClusterSelector>,
    factory: Option<Arc<dyn ProducerFactory>>,
    clock: Arc<dyn Clock>,
}

impl ZoneProducerPoolBuilder {
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            config: PoolConfig::default(),
            context: SinkContext::default(),
            source: None,
            selector: Arc::new(AllClustersSelector),
            factory: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Pool identity, used in logs and handed to the producer factory.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn context(mut self, context: SinkContext) -> Self {
        self.context = context;
        self
    }

    pub fn config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn selector(mut self, selector: Arc<dyn ClusterSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn producer_factory(mut self, factory: Arc<dyn ProducerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<ZoneProducerPool> {
        if self.name.trim().is_empty() {
            return Err(SinkError::Config("pool name must not be empty".to_string()));
        }
        let source = self
            .source
            .ok_or_else(|| SinkError::Config("config_source is required".to_string()))?;
        let factory = self
            .factory
            .ok_or_else(|| SinkError::Config("producer_factory is required".to_string()))?;

        Ok(ZoneProducerPool {
            name: self.name,
            config: self.config,
            context: self.context,
            source,
            selector: self.selector,
            factory,
            clock: self.clock,
            routing: RoutingTable::new(),
            active: DashMap::new(),
            retiring: Mutex::new(RetirementLedger::new()),
            topics: Mutex::new(BTreeSet::new()),
            reload_guard: Mutex::new(()),
            counters: PoolCounters::default(),
        })
    }
}

impl Default for ZoneProducerPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

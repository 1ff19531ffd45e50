//! In-process cluster producer.
//!
//! `MemoryClusterProducer` keeps everything it is sent in memory instead of talking to a
//! broker. It backs local development setups and the crate's own tests, and doubles as a
//! reference for how a real producer is expected to drive `ProducerLifecycle`.
//!
//! `MemoryProducerFactory` remembers every producer it has built, so callers can inspect
//! the instances a pool created, and can be told to fail starts for chosen clusters.

use crate::config::{ClusterConfig, SinkContext};
use crate::error::{Result, SinkError};
use crate::event::BatchPack;
use crate::producer::{ClusterProducer, ProducerFactory, ProducerLifecycle, ProducerState};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Producer that records sends and published topics in memory.
#[derive(Debug)]
pub struct MemoryClusterProducer {
    pool_name: String,
    config: ClusterConfig,
    lifecycle: ProducerLifecycle,
    fail_start: bool,
    start_delay: Duration,
    fail_sends: AtomicBool,
    fail_stop: AtomicBool,
    start_calls: AtomicU32,
    stop_calls: AtomicU32,
    sent_count: AtomicU64,
    sent: Mutex<Vec<BatchPack>>,
    topics: Mutex<BTreeSet<String>>,
}

impl MemoryClusterProducer {
    pub fn new(pool_name: impl Into<String>, config: ClusterConfig) -> Self {
        Self::with_start(pool_name, config, false, Duration::ZERO)
    }

    fn with_start(
        pool_name: impl Into<String>,
        config: ClusterConfig,
        fail_start: bool,
        start_delay: Duration,
    ) -> Self {
        Self {
            pool_name: pool_name.into(),
            lifecycle: ProducerLifecycle::new(config.cluster_name.clone()),
            config,
            fail_start,
            start_delay,
            fail_sends: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            start_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            sent_count: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            topics: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Make subsequent sends fail (`true`) or succeed (`false`).
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent stops fail after reaching `Stopped`.
    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Number of events accepted so far.
    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::SeqCst)
    }

    pub async fn sent_events(&self) -> Vec<BatchPack> {
        self.sent.lock().await.clone()
    }

    pub async fn published_topics(&self) -> BTreeSet<String> {
        self.topics.lock().await.clone()
    }
}

#[async_trait]
impl ClusterProducer for MemoryClusterProducer {
    fn cluster_name(&self) -> &str {
        &self.config.cluster_name
    }

    fn state(&self) -> ProducerState {
        self.lifecycle.state()
    }

    async fn start(&self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.fail_start {
            return Err(SinkError::ProducerStart {
                cluster: self.config.cluster_name.clone(),
                reason: format!("connection refused by {}", self.config.url),
            });
        }
        self.lifecycle.start()?;
        debug!(
            pool = %self.pool_name,
            cluster = %self.config.cluster_name,
            "Memory producer started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.lifecycle.begin_stop() {
            self.lifecycle.finish_stop();
        }
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(SinkError::ProducerStop {
                cluster: self.config.cluster_name.clone(),
                reason: "close timed out".to_string(),
            });
        }
        Ok(())
    }

    async fn publish_topics(&self, topics: &BTreeSet<String>) -> Result<()> {
        self.lifecycle.ensure_started()?;
        self.topics.lock().await.extend(topics.iter().cloned());
        Ok(())
    }

    async fn send(&self, event: &BatchPack) -> Result<()> {
        self.lifecycle.ensure_started()?;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SinkError::SendFailed {
                cluster: self.config.cluster_name.clone(),
                reason: "injected send failure".to_string(),
            });
        }
        self.sent.lock().await.push(event.clone());
        self.sent_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory for `MemoryClusterProducer`s that keeps a registry of what it built.
#[derive(Debug, Default)]
pub struct MemoryProducerFactory {
    created: DashMap<String, Vec<Arc<MemoryClusterProducer>>>,
    fail_start: DashSet<String>,
    fail_create: DashSet<String>,
    start_delay_ms: AtomicU64,
}

impl MemoryProducerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producers created for `cluster` from now on fail to start.
    pub fn fail_start_for(&self, cluster: impl Into<String>) {
        self.fail_start.insert(cluster.into());
    }

    /// `create()` itself fails for `cluster` from now on.
    pub fn fail_create_for(&self, cluster: impl Into<String>) {
        self.fail_create.insert(cluster.into());
    }

    /// Producers created from now on take `delay` to start, like a slow broker handshake.
    pub fn set_start_delay(&self, delay: Duration) {
        self.start_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Undo any injected failure for `cluster`.
    pub fn clear_failures(&self, cluster: &str) {
        self.fail_start.remove(cluster);
        self.fail_create.remove(cluster);
    }

    /// Most recently created producer for `cluster`.
    pub fn producer(&self, cluster: &str) -> Option<Arc<MemoryClusterProducer>> {
        self.created
            .get(cluster)
            .and_then(|instances| instances.last().cloned())
    }

    /// Every producer created for `cluster`, oldest first.
    pub fn producers(&self, cluster: &str) -> Vec<Arc<MemoryClusterProducer>> {
        self.created
            .get(cluster)
            .map(|instances| instances.value().clone())
            .unwrap_or_default()
    }

    /// Number of producers ever created for `cluster`.
    pub fn created_count(&self, cluster: &str) -> usize {
        self.created.get(cluster).map(|v| v.len()).unwrap_or(0)
    }

    /// Total number of producers ever created.
    pub fn total_created(&self) -> usize {
        self.created.iter().map(|entry| entry.value().len()).sum()
    }
}

impl ProducerFactory for MemoryProducerFactory {
    fn create(
        &self,
        pool_name: &str,
        config: &ClusterConfig,
        _context: &SinkContext,
    ) -> Result<Arc<dyn ClusterProducer>> {
        if self.fail_create.contains(&config.cluster_name) {
            return Err(SinkError::ProducerStart {
                cluster: config.cluster_name.clone(),
                reason: "invalid connection parameters".to_string(),
            });
        }
        let producer = Arc::new(MemoryClusterProducer::with_start(
            pool_name,
            config.clone(),
            self.fail_start.contains(&config.cluster_name),
            Duration::from_millis(self.start_delay_ms.load(Ordering::SeqCst)),
        ));
        self.created
            .entry(config.cluster_name.clone())
            .or_default()
            .push(Arc::clone(&producer));
        Ok(producer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> BatchPack {
        BatchPack::new("group", "stream", "topic-a", &b"payload"[..], 1)
    }

    #[tokio::test]
    async fn test_send_requires_start() {
        let producer = MemoryClusterProducer::new("zone", ClusterConfig::new("kafka-1", "k1:9092"));
        assert!(matches!(
            producer.send(&event()).await,
            Err(SinkError::ProducerNotStarted(_))
        ));

        producer.start().await.unwrap();
        producer.send(&event()).await.unwrap();
        assert_eq!(producer.sent_count(), 1);

        producer.stop().await.unwrap();
        assert_eq!(producer.state(), ProducerState::Stopped);
        assert!(producer.send(&event()).await.is_err());
        assert_eq!(producer.sent_events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_topics_accumulates() {
        let producer = MemoryClusterProducer::new("zone", ClusterConfig::new("kafka-1", "k1:9092"));
        producer.start().await.unwrap();

        let first: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();
        let second: BTreeSet<String> = ["b".to_string(), "c".to_string()].into();
        producer.publish_topics(&first).await.unwrap();
        producer.publish_topics(&second).await.unwrap();

        let topics = producer.published_topics().await;
        assert_eq!(topics.len(), 3);
    }

    #[tokio::test]
    async fn test_injected_send_failure() {
        let producer = MemoryClusterProducer::new("zone", ClusterConfig::new("kafka-1", "k1:9092"));
        producer.start().await.unwrap();
        producer.set_fail_sends(true);
        assert!(matches!(
            producer.send(&event()).await,
            Err(SinkError::SendFailed { .. })
        ));
        assert_eq!(producer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_factory_registry_and_failures() {
        let factory = MemoryProducerFactory::new();
        let ctx = SinkContext::new("node-1");
        factory.fail_start_for("bad");
        factory.fail_create_for("invalid");

        let good = factory
            .create("zone", &ClusterConfig::new("good", "g:9092"), &ctx)
            .unwrap();
        good.start().await.unwrap();

        let bad = factory
            .create("zone", &ClusterConfig::new("bad", "b:9092"), &ctx)
            .unwrap();
        assert!(bad.start().await.is_err());
        assert_eq!(bad.state(), ProducerState::Created);

        assert!(factory
            .create("zone", &ClusterConfig::new("invalid", "i:9092"), &ctx)
            .is_err());

        assert_eq!(factory.created_count("good"), 1);
        assert_eq!(factory.created_count("invalid"), 0);
        assert_eq!(factory.total_created(), 2);
        assert_eq!(factory.producer("good").unwrap().pool_name(), "zone");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_delay() {
        let factory = MemoryProducerFactory::new();
        factory.set_start_delay(Duration::from_millis(100));
        let producer = factory
            .create("zone", &ClusterConfig::new("slow", "s:9092"), &SinkContext::new("node-1"))
            .unwrap();

        let started = tokio::time::Instant::now();
        producer.start().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(producer.state(), ProducerState::Started);
    }
}

//! Configuration feed consumed by the pool.
//!
//! The pool never reads configuration from process-wide state; it is handed a
//! `ConfigSource` at construction. Two implementations ship with the crate:
//!
//! - `MemoryConfigSource`: cluster list and topic set held in memory and replaced by
//!   whoever owns the source (a manager client, a test)
//! - `JsonFileConfigSource`: re-reads a JSON document on every call, so operators can
//!   edit the file while the proxy is running
//!
//! ## File Format
//!
//! ```json
//! {
//!   "clusters": [
//!     { "cluster_name": "kafka-1", "url": "10.0.0.1:9092", "params": { "acks": "1" } }
//!   ],
//!   "topics": ["orders", "payments"]
//! }
//! ```

use crate::config::ClusterConfig;
use crate::error::{Result, SinkError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Source of cluster and topic configuration.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Every configured cluster, before zone selection.
    async fn list_configured_clusters(&self) -> Result<Vec<ClusterConfig>>;

    /// Every topic name currently known upstream.
    async fn list_known_topic_names(&self) -> Result<BTreeSet<String>>;

    /// Whether the backend clusters have been reported ready.
    fn is_backend_ready(&self) -> bool;

    /// Report the backend clusters ready.
    fn mark_backend_ready(&self);
}

/// Config source held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigSource {
    clusters: RwLock<Vec<ClusterConfig>>,
    topics: RwLock<BTreeSet<String>>,
    failing: AtomicBool,
    ready: AtomicBool,
}

impl MemoryConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clusters(clusters: Vec<ClusterConfig>) -> Self {
        Self {
            clusters: RwLock::new(clusters),
            ..Self::default()
        }
    }

    /// Replace the configured cluster list.
    pub async fn set_clusters(&self, clusters: Vec<ClusterConfig>) {
        *self.clusters.write().await = clusters;
    }

    /// Replace the known topic set.
    pub async fn set_topics<I, S>(&self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.topics.write().await = topics.into_iter().map(Into::into).collect();
    }

    /// Make every fetch fail until reset, simulating an unreachable manager.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Source("config manager unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigSource for MemoryConfigSource {
    async fn list_configured_clusters(&self) -> Result<Vec<ClusterConfig>> {
        self.check_available()?;
        Ok(self.clusters.read().await.clone())
    }

    async fn list_known_topic_names(&self) -> Result<BTreeSet<String>> {
        self.check_available()?;
        Ok(self.topics.read().await.clone())
    }

    fn is_backend_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn mark_backend_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }
}

/// On-disk document read by `JsonFileConfigSource`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkMetaFile {
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
}

/// Config source backed by a JSON file, re-read on every call.
#[derive(Debug)]
pub struct JsonFileConfigSource {
    path: PathBuf,
    ready: AtomicBool,
}

impl JsonFileConfigSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<SinkMetaFile> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SinkError::Source(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl ConfigSource for JsonFileConfigSource {
    async fn list_configured_clusters(&self) -> Result<Vec<ClusterConfig>> {
        Ok(self.load().await?.clusters)
    }

    async fn list_known_topic_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.load().await?.topics)
    }

    fn is_backend_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn mark_backend_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }
}

//! DataProxy Sink - Zone Producer Pool
//!
//! This crate implements the outbound side of a data proxy: a pool of producers, one per
//! backend message-queue cluster, that every incoming batch is routed through.
//!
//! ## Architecture
//!
//! The set of backend clusters and their topics changes at runtime. The pool absorbs
//! those changes without pausing traffic:
//!
//! - **Routing** is an ordered list of cluster names, replaced wholesale on reload and
//!   read by senders through a short-lived snapshot
//! - **Removed clusters** are not stopped right away; their producers are retired and
//!   kept alive for a grace period so in-flight sends can finish
//! - **Re-added clusters** still within their grace period get their live producer back
//!   instead of a new connection
//!
//! ## Components
//!
//! - **ZoneProducerPool**: The orchestrator (reload, reclaim, round-robin dispatch)
//! - **ClusterProducer / ProducerFactory**: Capability for one cluster connection
//! - **ConfigSource**: Cluster and topic configuration feed
//! - **ClusterSelector**: Which configured clusters a pool serves
//! - **PoolMaintenance**: Optional background task driving reload and reclamation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dataproxy_sink::{
//!     BatchPack, ClusterConfig, MemoryConfigSource, MemoryProducerFactory, PoolMaintenance,
//!     ZoneProducerPool,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(MemoryConfigSource::with_clusters(vec![
//!     ClusterConfig::new("kafka-1", "10.0.1.5:9092"),
//!     ClusterConfig::new("kafka-2", "10.0.1.6:9092"),
//! ]));
//!
//! let pool = Arc::new(
//!     ZoneProducerPool::builder()
//!         .name("zone-us-east-1a")
//!         .config_source(source)
//!         .producer_factory(Arc::new(MemoryProducerFactory::new()))
//!         .build()?,
//! );
//!
//! pool.start().await;
//! let maintenance = PoolMaintenance::spawn(Arc::clone(&pool))?;
//!
//! let event = BatchPack::new("group", "stream", "orders", &b"payload"[..], 1);
//! let cluster = pool.dispatch(&event).await?;
//! println!("sent via {}", cluster);
//!
//! maintenance.shutdown().await?;
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod maintenance;
pub mod memory;
pub mod pool;
pub mod producer;
pub mod routing;
pub mod selector;
pub mod source;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClusterConfig, PoolConfig, SinkContext, DEFAULT_GRACE_PERIOD};
pub use error::{Result, SinkError};
pub use event::BatchPack;
pub use ledger::{ProducerSlot, RetirementLedger};
pub use maintenance::PoolMaintenance;
pub use memory::{MemoryClusterProducer, MemoryProducerFactory};
pub use pool::{ReloadSummary, ZoneProducerPool, ZoneProducerPoolBuilder};
pub use producer::{ClusterProducer, ProducerFactory, ProducerLifecycle, ProducerState};
pub use routing::RoutingTable;
pub use selector::{AllClustersSelector, ClusterSelector, HashedSubsetSelector};
pub use source::{ConfigSource, JsonFileConfigSource, MemoryConfigSource, SinkMetaFile};
pub use stats::PoolStats;

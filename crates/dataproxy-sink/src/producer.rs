//! Cluster producer capability.
//!
//! A `ClusterProducer` owns one connection/session to one backend cluster. The pool
//! creates producers through a `ProducerFactory`, starts them, publishes the topic set
//! to them and routes sends to them. The wire client behind the trait (Kafka, Pulsar,
//! TubeMQ...) lives outside this crate.
//!
//! ## Lifecycle
//!
//! ```text
//! Created --start()--> Started --stop()--> Stopping --> Stopped
//! ```
//!
//! - `publish_topics()` may be called any time while `Started`, and is idempotent per topic
//! - `send()` only succeeds while `Started`
//! - `stop()` may run while sends from other tasks are still in flight; the pool's grace
//!   period is what keeps that safe, not the producer
//!
//! `ProducerLifecycle` implements these transitions so producer implementations
//! do not have to.

use crate::config::{ClusterConfig, SinkContext};
use crate::error::{Result, SinkError};
use crate::event::BatchPack;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle state of a cluster producer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProducerState {
    Created,
    Started,
    Stopping,
    Stopped,
}

impl ProducerState {
    fn as_u8(self) -> u8 {
        match self {
            ProducerState::Created => 0,
            ProducerState::Started => 1,
            ProducerState::Stopping => 2,
            ProducerState::Stopped => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ProducerState::Created,
            1 => ProducerState::Started,
            2 => ProducerState::Stopping,
            _ => ProducerState::Stopped,
        }
    }
}

/// One live connection to one backend cluster.
#[async_trait]
pub trait ClusterProducer: Send + Sync {
    /// Name of the cluster this producer is connected to.
    fn cluster_name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> ProducerState;

    /// Open the connection. `Created -> Started`.
    async fn start(&self) -> Result<()>;

    /// Close the connection. `Started -> Stopping -> Stopped`.
    async fn stop(&self) -> Result<()>;

    /// Make sure every topic in `topics` is published on the cluster.
    async fn publish_topics(&self, topics: &BTreeSet<String>) -> Result<()>;

    /// Send one event to the cluster.
    async fn send(&self, event: &BatchPack) -> Result<()>;
}

/// Constructs producers for newly selected clusters.
pub trait ProducerFactory: Send + Sync {
    /// Build (but do not start) a producer for `config`.
    ///
    /// `pool_name` is the identity of the requesting pool; producers are never
    /// shared across pools.
    fn create(
        &self,
        pool_name: &str,
        config: &ClusterConfig,
        context: &SinkContext,
    ) -> Result<Arc<dyn ClusterProducer>>;
}

/// Atomic lifecycle state machine for producer implementations.
#[derive(Debug)]
pub struct ProducerLifecycle {
    cluster: String,
    state: AtomicU8,
}

impl ProducerLifecycle {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            state: AtomicU8::new(ProducerState::Created.as_u8()),
        }
    }

    pub fn state(&self) -> ProducerState {
        ProducerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Created -> Started`. Starting an already started producer is a no-op;
    /// starting a stopped one is an error.
    pub fn start(&self) -> Result<()> {
        match self.transition(ProducerState::Created, ProducerState::Started) {
            Ok(()) | Err(ProducerState::Started) => Ok(()),
            Err(current) => Err(SinkError::ProducerStart {
                cluster: self.cluster.clone(),
                reason: format!("cannot start from {:?}", current),
            }),
        }
    }

    /// Enter `Stopping`. Returns `false` when there is nothing to stop, i.e. the
    /// producer is already stopping/stopped. A never-started producer goes
    /// straight to `Stopped`.
    pub fn begin_stop(&self) -> bool {
        if self
            .transition(ProducerState::Created, ProducerState::Stopped)
            .is_ok()
        {
            return false;
        }
        self.transition(ProducerState::Started, ProducerState::Stopping)
            .is_ok()
    }

    /// `Stopping -> Stopped`.
    pub fn finish_stop(&self) {
        self.state
            .store(ProducerState::Stopped.as_u8(), Ordering::Release);
    }

    /// Fail with `ProducerNotStarted` unless the state is `Started`.
    pub fn ensure_started(&self) -> Result<()> {
        if self.state() == ProducerState::Started {
            Ok(())
        } else {
            Err(SinkError::ProducerNotStarted(self.cluster.clone()))
        }
    }

    fn transition(
        &self,
        from: ProducerState,
        to: ProducerState,
    ) -> std::result::Result<(), ProducerState> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ProducerState::from_u8)
    }
}

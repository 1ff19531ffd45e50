//! Pool and cluster configuration.
//!
//! ## Environment Variables
//!
//! `PoolConfig::from_env()` reads the following, falling back to the defaults:
//!
//! - `DATAPROXY_SINK_GRACE_PERIOD_MS`: How long a retired producer is kept alive (default: 60000)
//! - `DATAPROXY_SINK_RELOAD_INTERVAL_MS`: Cluster/topic reload interval (default: 60000)
//! - `DATAPROXY_SINK_RECLAIM_INTERVAL_MS`: Expired producer reclamation interval (default: 10000)

use crate::error::{Result, SinkError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Grace window a retired producer stays alive before it is stopped.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

const ENV_GRACE_PERIOD_MS: &str = "DATAPROXY_SINK_GRACE_PERIOD_MS";
const ENV_RELOAD_INTERVAL_MS: &str = "DATAPROXY_SINK_RELOAD_INTERVAL_MS";
const ENV_RECLAIM_INTERVAL_MS: &str = "DATAPROXY_SINK_RECLAIM_INTERVAL_MS";

/// Operational parameters of a `ZoneProducerPool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// How long a retired producer is kept alive to drain in-flight sends.
    pub grace_period: Duration,
    /// Interval between `reload()` ticks of the built-in maintenance task.
    pub reload_interval: Duration,
    /// Interval between `reclaim_expired()` ticks of the built-in maintenance task.
    pub reclaim_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            reload_interval: Duration::from_secs(60),
            reclaim_interval: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    /// Build a config from environment variables, using defaults for unset ones.
    ///
    /// A variable that is set but not a valid millisecond count is a config error
    /// rather than silently falling back.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            grace_period: env_duration_ms(ENV_GRACE_PERIOD_MS, defaults.grace_period)?,
            reload_interval: env_duration_ms(ENV_RELOAD_INTERVAL_MS, defaults.reload_interval)?,
            reclaim_interval: env_duration_ms(ENV_RECLAIM_INTERVAL_MS, defaults.reclaim_interval)?,
        })
    }

    /// Grace period in milliseconds, the unit ledger timestamps are kept in.
    pub fn grace_period_ms(&self) -> i64 {
        i64::try_from(self.grace_period.as_millis()).unwrap_or(i64::MAX)
    }
}

fn env_duration_ms(key: &str, default: Duration) -> Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| SinkError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

/// Descriptor of one backend message-queue cluster.
///
/// Supplied fresh on every reload. Clusters are identified by `cluster_name`
/// only; a changed `url` for an existing name does not recreate its producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Unique cluster name.
    pub cluster_name: String,
    /// Connection address (broker list, service URL).
    pub url: String,
    /// Extra connection parameters passed through to the producer.
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ClusterConfig {
    pub fn new(cluster_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            url: url.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Context shared by every producer a pool creates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkContext {
    /// Identity of the proxy node hosting the pool.
    pub node_id: String,
    /// Producer settings applied to every cluster (batch size, acks, ...).
    #[serde(default)]
    pub producer_settings: HashMap<String, String>,
}

impl SinkContext {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            producer_settings: HashMap::new(),
        }
    }
}

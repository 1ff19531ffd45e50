//! Error types for the zone producer pool.
//!
//! Errors fall into three groups:
//!
//! - **Dispatch**: `NoRouteAvailable`, `SendFailed`, `ProducerNotStarted`. These are the
//!   only errors that cross the pool boundary to callers of `dispatch()`.
//! - **Reconciliation**: `Source`, `ProducerStart`, `ProducerStop`. The pool logs these and
//!   retries on the next scheduled reload; they never abort a reload cycle.
//! - **Setup**: `Config`, `Io`, `Json`, `Join`.

use thiserror::Error;

/// Convenience type alias for `Result<T, SinkError>`.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Error type for pool, producer and config source operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// No cluster in the routing table has a live producer.
    ///
    /// Returned immediately when the routing table is empty, or after every
    /// entry of the routing snapshot has been tried once without finding a
    /// live producer (all of them were retired concurrently).
    #[error("No cluster available for pool '{0}'")]
    NoRouteAvailable(String),

    /// The selected cluster's producer rejected or failed the send.
    ///
    /// The pool does not retry; the caller decides whether to resend.
    #[error("Send to cluster '{cluster}' failed: {reason}")]
    SendFailed { cluster: String, reason: String },

    /// A producer was asked to send or publish outside the `Started` state.
    #[error("Producer for cluster '{0}' is not started")]
    ProducerNotStarted(String),

    /// Creating or starting a producer failed.
    #[error("Failed to start producer for cluster '{cluster}': {reason}")]
    ProducerStart { cluster: String, reason: String },

    /// Stopping a producer failed.
    #[error("Failed to stop producer for cluster '{cluster}': {reason}")]
    ProducerStop { cluster: String, reason: String },

    /// The config source could not provide clusters or topics.
    #[error("Config source error: {0}")]
    Source(String),

    /// Invalid pool configuration (missing builder field, bad env value).
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SinkError {
    /// Whether the error came from the dispatch path rather than reconciliation.
    pub fn is_dispatch(&self) -> bool {
        matches!(
            self,
            SinkError::NoRouteAvailable(_)
                | SinkError::SendFailed { .. }
                | SinkError::ProducerNotStarted(_)
        )
    }
}

//! The unit of data the pool dispatches.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A packed batch of messages bound for one topic.
///
/// The pool never inspects the payload; it only picks the cluster whose
/// producer will carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPack {
    /// Business group the messages belong to.
    pub group_id: String,
    /// Stream within the group.
    pub stream_id: String,
    /// Destination topic on the backend cluster.
    pub topic: String,
    /// Encoded messages.
    pub payload: Bytes,
    /// Number of messages packed into `payload`.
    pub message_count: u32,
    /// When the batch was handed to the sink (ms since epoch).
    pub dispatch_time_ms: i64,
}

impl BatchPack {
    pub fn new(
        group_id: impl Into<String>,
        stream_id: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        message_count: u32,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            stream_id: stream_id.into(),
            topic: topic.into(),
            payload: payload.into(),
            message_count,
            dispatch_time_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

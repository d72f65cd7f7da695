//! Message queue trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// A raw unit of work received from the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique message identifier from the queue provider.
    pub id: String,
    /// Raw message body (JSON string).
    pub body: String,
    /// Provider-specific handle used to delete the message (e.g. SQS receipt handle).
    pub receipt_handle: String,
    /// When the message was sent to the queue.
    pub timestamp: DateTime<Utc>,
    /// Number of times this message has been received.
    pub attempt_count: u32,
}

/// Durable work queue consumed by the control loops.
///
/// Delivery is at-least-once: a message that is received but never deleted
/// becomes visible again after the provider's visibility timeout.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Receive the next batch of messages. Returns an empty vec when the
    /// queue is drained.
    async fn get_messages(&self) -> Result<Vec<QueueMessage>, QueueError>;

    /// Remove a message after its work has been handed off.
    async fn delete_message(&self, message: &QueueMessage) -> Result<(), QueueError>;
}

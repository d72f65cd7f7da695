//! In-process queue for local runs and tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::consumer::{MessageQueue, QueueMessage};
use crate::error::QueueError;

#[derive(Default)]
struct State {
    ready: VecDeque<QueueMessage>,
    /// Received but not yet deleted.
    in_flight: Vec<QueueMessage>,
    deleted: Vec<String>,
}

/// FIFO queue held in memory. Each receive hands out at most `batch_size`
/// messages, mirroring the per-call cap of hosted queues.
pub struct InMemoryQueue {
    batch_size: usize,
    state: Mutex<State>,
}

impl InMemoryQueue {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            state: Mutex::new(State::default()),
        }
    }

    /// Enqueue a body and return the generated message id.
    pub async fn push(&self, body: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.push_with_id(id.clone(), body).await;
        id
    }

    /// Enqueue a body under a caller-chosen message id.
    pub async fn push_with_id(&self, id: impl Into<String>, body: impl Into<String>) {
        let id = id.into();
        let message = QueueMessage {
            receipt_handle: format!("receipt-{}", Uuid::new_v4()),
            id,
            body: body.into(),
            timestamp: Utc::now(),
            attempt_count: 0,
        };
        self.state.lock().await.ready.push_back(message);
    }

    /// Messages waiting to be received.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages received but not yet deleted.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Ids of deleted messages, in deletion order.
    pub async fn deleted_ids(&self) -> Vec<String> {
        self.state.lock().await.deleted.clone()
    }

    /// Make every undeleted message visible again, as a visibility timeout would.
    pub async fn requeue_in_flight(&self) {
        let mut state = self.state.lock().await;
        let returned = std::mem::take(&mut state.in_flight);
        for message in returned.into_iter().rev() {
            state.ready.push_front(message);
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn get_messages(&self) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.state.lock().await;
        let take = self.batch_size.min(state.ready.len());
        let mut batch: Vec<QueueMessage> = state.ready.drain(..take).collect();
        for message in &mut batch {
            message.attempt_count += 1;
        }
        state.in_flight.extend(batch.iter().cloned());
        Ok(batch)
    }

    async fn delete_message(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let position = state
            .in_flight
            .iter()
            .position(|m| m.receipt_handle == message.receipt_handle)
            .ok_or_else(|| {
                QueueError::Delete(format!("message {} is not in flight", message.id))
            })?;
        state.in_flight.remove(position);
        state.deleted.push(message.id.clone());
        Ok(())
    }
}

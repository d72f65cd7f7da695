//! Queue-to-pool admission shared by both control loops.

use tracing::debug;

use jobman_queue::{MessageQueue, QueueError, QueueMessage};

use crate::batch::Batch;
use crate::error::LoopError;
use crate::job_task::JobTaskState;

/// Why a control loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The queue had nothing left to admit.
    QueueDrained,
    /// Single-pass mode finished its cycle.
    SinglePass,
    /// Wall-clock budget spent; running tasks were drained first.
    Restart,
}

impl std::fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopOutcome::QueueDrained => "queue drained",
            LoopOutcome::SinglePass => "single pass",
            LoopOutcome::Restart => "scheduled restart",
        };
        f.write_str(s)
    }
}

/// Receive batches until at least `count` messages are held or the queue
/// returns an empty batch. The last batch is kept whole, so the result may
/// exceed `count`.
pub async fn pull_messages(
    queue: &dyn MessageQueue,
    count: usize,
) -> Result<Vec<QueueMessage>, QueueError> {
    let mut messages = Vec::new();
    while messages.len() < count {
        let batch = queue.get_messages().await?;
        if batch.is_empty() {
            break;
        }
        messages.extend(batch);
    }
    debug!(requested = count, received = messages.len(), "messages pulled");
    Ok(messages)
}

/// Create one task per message and delete the messages whose task the
/// pool accepted. Rejected messages stay on the queue for redelivery.
///
/// Returns the number of admitted tasks.
pub async fn admit(
    batch: &mut Batch,
    queue: &dyn MessageQueue,
    job_id: &str,
    messages: &[QueueMessage],
) -> Result<usize, LoopError> {
    if messages.is_empty() {
        return Ok(0);
    }

    let created = batch.add_tasks(job_id, messages).await?;

    let mut admitted = 0;
    for (task, message) in created.iter().zip(messages) {
        if task.correlation_id != message.id || task.state != JobTaskState::Queued {
            continue;
        }
        queue.delete_message(message).await?;
        admitted += 1;
    }
    Ok(admitted)
}

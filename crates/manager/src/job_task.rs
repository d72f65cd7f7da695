//! One unit of work submitted to the pool.

use rand::RngCore;
use serde::Serialize;
use tracing::warn;

use jobman_pool::{RemoteTaskState, TaskExecutionResult};

use crate::error::BatchError;

/// Upper bound on task ids accepted by the pool service.
pub const MAX_TASK_ID_LENGTH: usize = 64;

/// Random suffix length cap, in bytes (rendered as twice as many hex chars).
const MAX_SUFFIX_BYTES: i64 = 10;

const ID_PREFIX: &str = "task_";

/// Local lifecycle of a task.
///
/// `New → Queued`, `New → Failed` and `Queued → Completed` are the only
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobTaskState {
    New,
    Queued,
    Failed,
    Completed,
}

impl JobTaskState {
    fn can_become(self, next: JobTaskState) -> bool {
        matches!(
            (self, next),
            (JobTaskState::New, JobTaskState::Queued)
                | (JobTaskState::New, JobTaskState::Failed)
                | (JobTaskState::Queued, JobTaskState::Completed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTask {
    /// `task_<correlation id>_<random hex>`, at most 64 characters.
    pub id: String,
    /// Id of the queue message this task was created for.
    pub correlation_id: String,
    pub state: JobTaskState,
    pub result: Option<TaskExecutionResult>,
    /// Server-provided reason when submission failed.
    pub error: Option<String>,
}

impl JobTask {
    pub fn new(correlation_id: impl Into<String>) -> Result<Self, BatchError> {
        let correlation_id = correlation_id.into();
        let prefix = format!("{ID_PREFIX}{correlation_id}_");

        let room = MAX_TASK_ID_LENGTH as i64 - prefix.len() as i64;
        let size = room.div_euclid(2).min(MAX_SUFFIX_BYTES);
        if size < 0 {
            return Err(BatchError::InvalidArgument(format!(
                "correlation id is too long ({} characters); the maximum allowed length is {}",
                correlation_id.len(),
                max_correlation_id_length()
            )));
        }

        let mut suffix = vec![0u8; size as usize];
        rand::thread_rng().fill_bytes(&mut suffix);

        Ok(Self {
            id: format!("{prefix}{}", hex::encode(suffix)),
            correlation_id,
            state: JobTaskState::New,
            result: None,
            error: None,
        })
    }

    /// The service accepted the task.
    pub fn mark_queued(&mut self) {
        self.transition(JobTaskState::Queued);
    }

    /// The service rejected the task.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.transition(JobTaskState::Failed) {
            self.error = Some(error.into());
        }
    }

    /// Merge state reported by the service. Only completion is reflected in
    /// the local state; the execution result is always recorded.
    pub fn apply_remote(&mut self, state: RemoteTaskState, result: Option<TaskExecutionResult>) {
        if result.is_some() {
            self.result = result;
        }
        if state == RemoteTaskState::Completed && self.state != JobTaskState::Completed {
            self.transition(JobTaskState::Completed);
        }
    }

    fn transition(&mut self, next: JobTaskState) -> bool {
        if !self.state.can_become(next) {
            warn!(
                task_id = %self.id,
                from = ?self.state,
                to = ?next,
                "ignoring illegal task state transition"
            );
            return false;
        }
        self.state = next;
        true
    }
}

/// Longest correlation id that still yields a valid task id.
pub fn max_correlation_id_length() -> usize {
    MAX_TASK_ID_LENGTH - ID_PREFIX.len() - 1
}

//! Error types for job/task lifecycle management and the control loops.

use thiserror::Error;

use jobman_pool::{JobState, PoolError};
use jobman_queue::QueueError;

#[derive(Debug, Error)]
pub enum BatchError {
    /// The job exists but cannot accept new tasks.
    #[error("job {job_id} is not active (state: {state})")]
    JobNotActive { job_id: String, state: JobState },

    #[error("failed to look up job {job_id}: {source}")]
    JobLookup { job_id: String, source: PoolError },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("message {message_id} cannot be turned into a task: {source}")]
    InvalidMessage { message_id: String, source: QueueError },

    #[error("waiting for job {job_id} failed: {source}")]
    WaitPoll { job_id: String, source: PoolError },

    #[error("pool service error: {0}")]
    Pool(#[from] PoolError),
}

/// Anything that stops a control loop. None of these are retried.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

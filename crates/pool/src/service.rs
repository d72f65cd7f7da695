//! Pool service trait definition.

use async_trait::async_trait;

use crate::error::PoolError;
use crate::types::{
    AddTaskResult, BatchMetricsResult, JobInfo, JobSpec, PoolMetricsInfo, TaskFilter, TaskPage,
    TaskSpec,
};

/// Remote job scheduler that runs tasks on an elastic compute pool.
///
/// Implementations must report a missing job from [`PoolService::get_job`]
/// as [`PoolError::NotFound`]; job creation relies on it.
#[async_trait]
pub trait PoolService: Send + Sync {
    async fn get_job(&self, job_id: &str) -> Result<JobInfo, PoolError>;

    async fn add_job(&self, job: &JobSpec) -> Result<(), PoolError>;

    /// Submit all tasks in one request. Returns one result per task; a
    /// per-task failure does not fail the call.
    async fn add_tasks(
        &self,
        job_id: &str,
        tasks: &[TaskSpec],
    ) -> Result<Vec<AddTaskResult>, PoolError>;

    /// First page of the job's tasks.
    async fn list_tasks(
        &self,
        job_id: &str,
        filter: Option<TaskFilter>,
    ) -> Result<TaskPage, PoolError>;

    /// Follow a continuation link returned by a previous page.
    async fn list_tasks_next(&self, continuation_link: &str) -> Result<TaskPage, PoolError>;

    /// Current capacity and active/running load of the pool.
    async fn pool_metrics(&self) -> Result<PoolMetricsInfo, PoolError>;

    /// Sampled pending/running series over the reporting interval.
    async fn batch_metrics(&self) -> Result<BatchMetricsResult, PoolError>;
}

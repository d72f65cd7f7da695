//! Job and task lifecycle over a [`PoolService`].

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use rand::RngCore;
use tracing::{debug, info, warn};

use jobman_core::TaskTemplateConfig;
use jobman_pool::{
    BatchMetricsResult, JobSpec, JobState, OnAllTasksComplete, PoolMetricsInfo, PoolService,
    TaskFilter, TaskPage, TaskSpec,
};
use jobman_queue::{parse_body, QueueMessage};

use crate::command_line;
use crate::error::BatchError;
use crate::job_task::{JobTask, JobTaskState};

/// Upper bound on a single task's run time.
pub const TASK_MAX_WALL_CLOCK_TIME: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Random bytes appended to a job id when a unique one is requested.
const JOB_SUFFIX_BYTES: usize = 5;

/// Tracks the tasks this process submitted, keyed by task id in submission
/// order.
pub struct Batch {
    service: Arc<dyn PoolService>,
    pool_id: String,
    template: TaskTemplateConfig,
    self_task_id: Option<String>,
    tasks: IndexMap<String, JobTask>,
}

impl Batch {
    pub fn new(
        service: Arc<dyn PoolService>,
        pool_id: impl Into<String>,
        template: TaskTemplateConfig,
    ) -> Self {
        Self {
            service,
            pool_id: pool_id.into(),
            template,
            self_task_id: None,
            tasks: IndexMap::new(),
        }
    }

    /// Task id this process runs as inside the pool. [`Batch::wait_job`]
    /// does not wait for it.
    pub fn with_self_task_id(mut self, task_id: Option<String>) -> Self {
        self.self_task_id = task_id;
        self
    }

    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }

    /// Return the id of an active job, creating it when it does not exist.
    ///
    /// With `add_suffix`, a new job gets `_<10 hex chars>` appended to
    /// `job_id`. An existing job is reused as-is, suffix or not.
    pub async fn create_job_if_not_exists(
        &self,
        job_id: &str,
        add_suffix: bool,
    ) -> Result<String, BatchError> {
        match self.service.get_job(job_id).await {
            Ok(job) if job.state == JobState::Active => {
                debug!(job_id, "reusing active job");
                Ok(job_id.to_string())
            }
            Ok(job) => Err(BatchError::JobNotActive {
                job_id: job_id.to_string(),
                state: job.state,
            }),
            Err(e) if e.is_not_found() => {
                let id = if add_suffix {
                    let mut suffix = [0u8; JOB_SUFFIX_BYTES];
                    rand::thread_rng().fill_bytes(&mut suffix);
                    format!("{job_id}_{}", hex::encode(suffix))
                } else {
                    job_id.to_string()
                };

                self.service
                    .add_job(&JobSpec {
                        id: id.clone(),
                        pool_id: self.pool_id.clone(),
                        on_all_tasks_complete: OnAllTasksComplete::TerminateJob,
                    })
                    .await?;
                info!(job_id = %id, pool_id = %self.pool_id, "job created");
                Ok(id)
            }
            Err(source) => Err(BatchError::JobLookup {
                job_id: job_id.to_string(),
                source,
            }),
        }
    }

    /// Submit one task per message in a single batched call and return the
    /// whole registry.
    pub async fn create_tasks(
        &mut self,
        job_id: &str,
        messages: &[QueueMessage],
    ) -> Result<Vec<JobTask>, BatchError> {
        self.add_tasks(job_id, messages).await?;
        Ok(self.tasks())
    }

    /// Submit one task per message in a single batched call.
    ///
    /// Every message is validated before anything is registered or sent.
    /// Per-task rejections are recorded on the task and do not fail the
    /// call. Returns the tasks created by this call, in message order.
    pub async fn add_tasks(
        &mut self,
        job_id: &str,
        messages: &[QueueMessage],
    ) -> Result<Vec<JobTask>, BatchError> {
        if messages.is_empty() {
            info!(job_id, "no messages, no tasks to create");
            return Ok(Vec::new());
        }

        let mut created = Vec::with_capacity(messages.len());
        let mut specs = Vec::with_capacity(messages.len());
        for message in messages {
            let params = parse_body(message).map_err(|source| BatchError::InvalidMessage {
                message_id: message.id.clone(),
                source,
            })?;
            let task = JobTask::new(message.id.clone())?;
            specs.push(TaskSpec {
                id: task.id.clone(),
                command_line: command_line::render(&self.template.command_line, &params),
                resource_files: self.template.resource_files.clone(),
                environment_settings: self.template.environment_settings.clone(),
                max_wall_clock_time: TASK_MAX_WALL_CLOCK_TIME,
            });
            created.push(task);
        }

        // A repeated id replaces the earlier entry where it sits.
        let ids: Vec<String> = created.iter().map(|t| t.id.clone()).collect();
        for task in created {
            self.tasks.insert(task.id.clone(), task);
        }

        let results = match self.service.add_tasks(job_id, &specs).await {
            Ok(results) => results,
            Err(e) => {
                let reason = e.to_string();
                for id in &ids {
                    if let Some(task) = self.tasks.get_mut(id) {
                        task.mark_failed(reason.clone());
                    }
                }
                warn!(job_id, error = %reason, "batched task add failed");
                return Err(e.into());
            }
        };

        for result in results {
            let Some(task) = self.tasks.get_mut(&result.task_id) else {
                warn!(task_id = %result.task_id, "add result for unknown task");
                continue;
            };
            if result.is_success() {
                task.mark_queued();
            } else {
                let reason = result
                    .error
                    .unwrap_or_else(|| format!("{:?}", result.status));
                warn!(job_id, task_id = %task.id, error = %reason, "task rejected");
                task.mark_failed(reason);
            }
        }

        let mut submitted = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(task) = self.tasks.get_mut(id) {
                if task.state == JobTaskState::New {
                    task.mark_failed("no result returned for task");
                }
                submitted.push(task.clone());
            }
        }

        let queued = submitted
            .iter()
            .filter(|t| t.state == JobTaskState::Queued)
            .count();
        info!(job_id, submitted = submitted.len(), queued, "tasks submitted");

        Ok(submitted)
    }

    /// Poll until the job has no unfinished tasks besides this process's
    /// own. The first failed poll ends the wait.
    pub async fn wait_job(&self, job_id: &str, poll_interval: Duration) -> Result<(), BatchError> {
        loop {
            tokio::time::sleep(poll_interval).await;

            let page = self
                .service
                .list_tasks(job_id, Some(TaskFilter::NotCompleted))
                .await
                .map_err(|source| BatchError::WaitPoll {
                    job_id: job_id.to_string(),
                    source,
                })?;

            if self.only_self_remaining(&page) {
                info!(job_id, "job has no unfinished tasks");
                return Ok(());
            }
            debug!(job_id, unfinished = page.items.len(), "waiting for job");
        }
    }

    fn only_self_remaining(&self, page: &TaskPage) -> bool {
        match page.items.as_slice() {
            [] => true,
            [only] => self.self_task_id.as_deref() == Some(only.id.as_str()),
            _ => false,
        }
    }

    /// Refresh registry entries from the service's task listing, following
    /// continuation links. Tasks this process did not create are ignored.
    pub async fn get_created_tasks_state(
        &mut self,
        job_id: &str,
    ) -> Result<Vec<JobTask>, BatchError> {
        let mut page = self.service.list_tasks(job_id, None).await?;
        loop {
            for item in &page.items {
                if let Some(task) = self.tasks.get_mut(&item.id) {
                    task.apply_remote(item.state, item.result);
                }
            }
            match page.continuation_link.take() {
                Some(link) => page = self.service.list_tasks_next(&link).await?,
                None => break,
            }
        }
        Ok(self.tasks())
    }

    pub async fn pool_metrics(&self) -> Result<PoolMetricsInfo, BatchError> {
        Ok(self.service.pool_metrics().await?)
    }

    pub async fn batch_metrics(&self) -> Result<BatchMetricsResult, BatchError> {
        Ok(self.service.batch_metrics().await?)
    }

    /// Registry snapshot in submission order.
    pub fn tasks(&self) -> Vec<JobTask> {
        self.tasks.values().cloned().collect()
    }
}

//! Shared fixtures for manager integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use jobman_core::TaskTemplateConfig;
use jobman_manager::Batch;
use jobman_pool::{
    AddTaskResult, AddTaskStatus, BatchMetricsResult, JobInfo, JobSpec, JobState, PoolError,
    PoolLoad, PoolMetricsInfo, PoolService, TaskFilter, TaskPage, TaskSpec,
};

pub const POOL_ID: &str = "pool-1";

#[derive(Default)]
struct State {
    jobs: HashMap<String, JobState>,
    lookup_failure: Option<String>,
    /// Command lines the service rejects with a client error.
    rejected_commands: Vec<String>,
    /// Fails every batched add with this message.
    add_failure: Option<String>,
    pool_metrics: VecDeque<PoolMetricsInfo>,
    batch_metrics: VecDeque<BatchMetricsResult>,
    task_pages: VecDeque<Result<TaskPage, String>>,
    next_pages: HashMap<String, TaskPage>,

    added_jobs: Vec<JobSpec>,
    add_task_calls: Vec<(String, Vec<TaskSpec>)>,
    list_calls: Vec<(String, Option<TaskFilter>)>,
    pool_metrics_calls: usize,
}

/// Scripted, recording `PoolService`.
///
/// Metric sequences hand out one entry per call and repeat the last one
/// once exhausted. Task pages are consumed in order and narrowed by the
/// listing filter; an exhausted script lists no tasks.
#[derive(Default)]
pub struct FakePoolService {
    state: Mutex<State>,
}

impl FakePoolService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_job(&self, id: &str, state: JobState) {
        self.state.lock().unwrap().jobs.insert(id.to_string(), state);
    }

    pub fn fail_lookups(&self, message: &str) {
        self.state.lock().unwrap().lookup_failure = Some(message.to_string());
    }

    pub fn reject_command(&self, command_line: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_commands
            .push(command_line.to_string());
    }

    pub fn clear_rejections(&self) {
        self.state.lock().unwrap().rejected_commands.clear();
    }

    pub fn fail_add_tasks(&self, message: &str) {
        self.state.lock().unwrap().add_failure = Some(message.to_string());
    }

    pub fn push_pool_load(&self, max_tasks_per_pool: i64, active: i64, running: i64) {
        self.state
            .lock()
            .unwrap()
            .pool_metrics
            .push_back(PoolMetricsInfo {
                id: POOL_ID.to_string(),
                max_tasks_per_pool,
                load: PoolLoad {
                    active_tasks: active,
                    running_tasks: running,
                },
            });
    }

    pub fn push_batch_metrics(&self, minutes: f64, pending: Vec<f64>, running: Vec<f64>) {
        self.state
            .lock()
            .unwrap()
            .batch_metrics
            .push_back(BatchMetricsResult {
                pool_id: POOL_ID.to_string(),
                time_interval_in_minutes: minutes,
                pending_tasks_vector: pending,
                running_tasks_vector: running,
            });
    }

    pub fn push_task_page(&self, page: TaskPage) {
        self.state.lock().unwrap().task_pages.push_back(Ok(page));
    }

    pub fn push_task_page_error(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .task_pages
            .push_back(Err(message.to_string()));
    }

    pub fn add_next_page(&self, link: &str, page: TaskPage) {
        self.state
            .lock()
            .unwrap()
            .next_pages
            .insert(link.to_string(), page);
    }

    pub fn added_jobs(&self) -> Vec<JobSpec> {
        self.state.lock().unwrap().added_jobs.clone()
    }

    pub fn add_task_calls(&self) -> Vec<(String, Vec<TaskSpec>)> {
        self.state.lock().unwrap().add_task_calls.clone()
    }

    pub fn list_calls(&self) -> Vec<(String, Option<TaskFilter>)> {
        self.state.lock().unwrap().list_calls.clone()
    }

    pub fn pool_metrics_calls(&self) -> usize {
        self.state.lock().unwrap().pool_metrics_calls
    }
}

fn next_or_last<T: Clone>(items: &mut VecDeque<T>) -> Option<T> {
    if items.len() > 1 {
        items.pop_front()
    } else {
        items.front().cloned()
    }
}

fn api_error(message: &str) -> PoolError {
    PoolError::Api {
        status: 500,
        code: "InternalError".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl PoolService for FakePoolService {
    async fn get_job(&self, job_id: &str) -> Result<JobInfo, PoolError> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.lookup_failure {
            return Err(api_error(message));
        }
        match state.jobs.get(job_id) {
            Some(s) => Ok(JobInfo {
                id: job_id.to_string(),
                state: *s,
            }),
            None => Err(PoolError::NotFound(format!("JobNotFound: {job_id}"))),
        }
    }

    async fn add_job(&self, job: &JobSpec) -> Result<(), PoolError> {
        let mut state = self.state.lock().unwrap();
        state.jobs.insert(job.id.clone(), JobState::Active);
        state.added_jobs.push(job.clone());
        Ok(())
    }

    async fn add_tasks(
        &self,
        job_id: &str,
        tasks: &[TaskSpec],
    ) -> Result<Vec<AddTaskResult>, PoolError> {
        let mut state = self.state.lock().unwrap();
        state
            .add_task_calls
            .push((job_id.to_string(), tasks.to_vec()));
        if let Some(message) = &state.add_failure {
            return Err(api_error(message));
        }
        Ok(tasks
            .iter()
            .map(|t| {
                if state.rejected_commands.contains(&t.command_line) {
                    AddTaskResult {
                        task_id: t.id.clone(),
                        status: AddTaskStatus::ClientError,
                        error: Some("The specified task already exists.".to_string()),
                    }
                } else {
                    AddTaskResult {
                        task_id: t.id.clone(),
                        status: AddTaskStatus::Success,
                        error: None,
                    }
                }
            })
            .collect())
    }

    async fn list_tasks(
        &self,
        job_id: &str,
        filter: Option<TaskFilter>,
    ) -> Result<TaskPage, PoolError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls.push((job_id.to_string(), filter));
        match state.task_pages.pop_front() {
            Some(Ok(mut page)) => {
                if let Some(filter) = filter {
                    page.items.retain(|item| filter.matches(item.state));
                }
                Ok(page)
            }
            Some(Err(message)) => Err(api_error(&message)),
            None => Ok(TaskPage::default()),
        }
    }

    async fn list_tasks_next(&self, continuation_link: &str) -> Result<TaskPage, PoolError> {
        self.state
            .lock()
            .unwrap()
            .next_pages
            .get(continuation_link)
            .cloned()
            .ok_or_else(|| PoolError::NotFound(continuation_link.to_string()))
    }

    async fn pool_metrics(&self) -> Result<PoolMetricsInfo, PoolError> {
        let mut state = self.state.lock().unwrap();
        state.pool_metrics_calls += 1;
        next_or_last(&mut state.pool_metrics)
            .ok_or_else(|| PoolError::Decode("no pool metrics scripted".to_string()))
    }

    async fn batch_metrics(&self) -> Result<BatchMetricsResult, PoolError> {
        let mut state = self.state.lock().unwrap();
        next_or_last(&mut state.batch_metrics)
            .ok_or_else(|| PoolError::Decode("no batch metrics scripted".to_string()))
    }
}

pub fn template(command_line: &str) -> TaskTemplateConfig {
    TaskTemplateConfig {
        command_line: command_line.to_string(),
        resource_files: Vec::new(),
        environment_settings: Vec::new(),
    }
}

pub fn batch(service: &Arc<FakePoolService>, command_line: &str) -> Batch {
    Batch::new(service.clone(), POOL_ID, template(command_line))
}

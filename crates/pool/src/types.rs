use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use jobman_core::config::{EnvironmentSetting, ResourceFile};

// ── Load and throughput ──────────────────────────────────────

/// Task counts across the pool at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolLoad {
    /// Accepted by the pool but not yet scheduled on a node.
    pub active_tasks: i64,
    /// Executing on a node.
    pub running_tasks: i64,
}

impl PoolLoad {
    pub fn total(&self) -> i64 {
        self.active_tasks + self.running_tasks
    }
}

/// Snapshot of pool capacity and load, fetched once per control-loop cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetricsInfo {
    pub id: String,
    pub max_tasks_per_pool: i64,
    pub load: PoolLoad,
}

/// Pending/running task series sampled over the last reporting interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetricsResult {
    pub pool_id: String,
    pub time_interval_in_minutes: f64,
    pub pending_tasks_vector: Vec<f64>,
    pub running_tasks_vector: Vec<f64>,
}

// ── Jobs ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Active,
    Disabling,
    Disabled,
    Enabling,
    Terminating,
    Completed,
    Deleting,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Active => "active",
            JobState::Disabling => "disabling",
            JobState::Disabled => "disabled",
            JobState::Enabling => "enabling",
            JobState::Terminating => "terminating",
            JobState::Completed => "completed",
            JobState::Deleting => "deleting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub state: JobState,
}

/// What the service does with a job once all of its tasks complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnAllTasksComplete {
    NoAction,
    TerminateJob,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub id: String,
    pub pool_id: String,
    pub on_all_tasks_complete: OnAllTasksComplete,
}

// ── Tasks ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: String,
    pub command_line: String,
    pub resource_files: Vec<ResourceFile>,
    pub environment_settings: Vec<EnvironmentSetting>,
    pub max_wall_clock_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddTaskStatus {
    Success,
    ClientError,
    ServerError,
}

/// Per-task outcome of a batched add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTaskResult {
    pub task_id: String,
    pub status: AddTaskStatus,
    /// Server-provided message for non-success statuses.
    pub error: Option<String>,
}

impl AddTaskResult {
    pub fn is_success(&self) -> bool {
        self.status == AddTaskStatus::Success
    }
}

/// Task state as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteTaskState {
    Active,
    Preparing,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskExecutionResult {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub id: String,
    pub state: RemoteTaskState,
    pub result: Option<TaskExecutionResult>,
}

/// One page of a task listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPage {
    pub items: Vec<TaskItem>,
    /// Opaque link to the next page, absent on the last one.
    pub continuation_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    NotCompleted,
}

impl TaskFilter {
    /// OData `$filter` expression understood by the service.
    pub fn odata(&self) -> &'static str {
        match self {
            TaskFilter::NotCompleted => "state ne 'completed'",
        }
    }

    pub fn matches(&self, state: RemoteTaskState) -> bool {
        match self {
            TaskFilter::NotCompleted => state != RemoteTaskState::Completed,
        }
    }
}

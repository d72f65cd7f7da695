use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a JSON-valued env var, warning and falling back to the default on
/// malformed input.
fn profiled_env_json<T: serde::de::DeserializeOwned + Default>(profile: &str, key: &str) -> T {
    match profiled_env_opt(profile, key) {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "ignoring malformed JSON config value");
            T::default()
        }),
        None => T::default(),
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub batch: BatchConfig,
    pub aws: AwsConfig,
    pub queue: QueueConfig,
    pub job_manager: JobManagerConfig,
    pub task: TaskTemplateConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `JOBMAN_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("JOBMAN_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            batch: BatchConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            job_manager: JobManagerConfig::from_env_profiled(p),
            task: TaskTemplateConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  batch:       url={}, pool={}, job={}, task={}",
            self.batch.account_url,
            self.batch.pool_id,
            self.batch.job_id,
            self.batch.task_id.as_deref().unwrap_or("(none)")
        );
        tracing::info!("  queue:       url={}, region={}", self.queue.queue_url, self.aws.region);
        tracing::info!(
            "  job manager: ratio={}, interval={}s, restart after {}h",
            self.job_manager.active_to_running_tasks_ratio,
            self.job_manager.add_tasks_interval_in_seconds,
            self.job_manager.max_wall_clock_time_in_hours
        );
        tracing::info!(
            "  task:        resource_files={}, env_settings={}",
            self.task.resource_files.len(),
            self.task.environment_settings.len()
        );
    }
}

// ── Compute pool service ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub account_url: String,
    pub pool_id: String,
    pub api_version: String,
    pub access_token: Option<String>,
    /// Job the manager admits work into.
    pub job_id: String,
    /// Id of the task the manager itself runs as, when hosted inside the pool.
    pub task_id: Option<String>,
    /// Window of the sampled pending/running series.
    pub metrics_interval_in_minutes: u32,
}

impl BatchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            account_url: profiled_env_or(p, "BATCH_ACCOUNT_URL", "http://localhost:8080"),
            pool_id: profiled_env_or(p, "BATCH_POOL_ID", "default-pool"),
            api_version: profiled_env_or(p, "BATCH_API_VERSION", "2023-05-01.17.0"),
            access_token: profiled_env_opt(p, "BATCH_ACCESS_TOKEN"),
            job_id: profiled_env_or(p, "AZ_BATCH_JOB_ID", "job-manager"),
            task_id: profiled_env_opt(p, "AZ_BATCH_TASK_ID"),
            metrics_interval_in_minutes: profiled_env_parse(p, "BATCH_METRICS_INTERVAL_MINUTES", 5),
        }
    }
}

// ── AWS / SQS ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "QUEUE_AWS_ENDPOINT_URL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_url: String,
    pub visibility_timeout_secs: u32,
    /// Long-poll wait per receive call. Zero returns immediately when drained.
    pub wait_time_secs: u32,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            queue_url: profiled_env_or(p, "QUEUE_URL", ""),
            visibility_timeout_secs: profiled_env_parse(p, "QUEUE_VISIBILITY_TIMEOUT_SECS", 300),
            wait_time_secs: profiled_env_parse(p, "QUEUE_WAIT_TIME_SECS", 1),
        }
    }
}

// ── Job manager control loop ──────────────────────────────────

/// Tuning of the admission control loops.
///
/// Deserializes from the `jobManagerConfig` JSON document; every field has a
/// default so partial documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobManagerConfig {
    /// Target active-to-running ratio the load-driven worker starts from.
    #[serde(default = "default_active_to_running_ratio")]
    pub active_to_running_tasks_ratio: f64,
    /// Throughput-driven runner admits work only at or above this ratio.
    #[serde(default = "default_min_processing_ratio")]
    pub min_task_processing_ratio: f64,
    /// Ratio the throughput-driven runner sizes its increment against.
    #[serde(default = "default_max_processing_ratio")]
    pub max_task_processing_ratio: f64,
    #[serde(default = "default_interval_secs")]
    pub add_tasks_interval_in_seconds: u64,
    #[serde(default = "default_interval_secs")]
    pub task_increment_interval_in_seconds: u64,
    /// The worker drains and exits once it has run this long.
    #[serde(default = "default_max_wall_clock_hours")]
    pub max_wall_clock_time_in_hours: f64,
    /// Fallback increment when no usable throughput ratio is available.
    #[serde(default = "default_task_increment_count")]
    pub task_increment_count: u32,
}

fn default_active_to_running_ratio() -> f64 { 2.0 }
fn default_min_processing_ratio() -> f64 { 0.5 }
fn default_max_processing_ratio() -> f64 { 1.0 }
fn default_interval_secs() -> u64 { 15 }
fn default_max_wall_clock_hours() -> f64 { 2.0 }
fn default_task_increment_count() -> u32 { 20 }

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            active_to_running_tasks_ratio: default_active_to_running_ratio(),
            min_task_processing_ratio: default_min_processing_ratio(),
            max_task_processing_ratio: default_max_processing_ratio(),
            add_tasks_interval_in_seconds: default_interval_secs(),
            task_increment_interval_in_seconds: default_interval_secs(),
            max_wall_clock_time_in_hours: default_max_wall_clock_hours(),
            task_increment_count: default_task_increment_count(),
        }
    }
}

impl JobManagerConfig {
    /// Parse a `jobManagerConfig` JSON document.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// `JOB_MANAGER_CONFIG` (a JSON document) wins over the individual keys.
    fn from_env_profiled(p: &str) -> Self {
        if let Some(raw) = profiled_env_opt(p, "JOB_MANAGER_CONFIG") {
            match Self::from_json(&raw) {
                Ok(cfg) => return cfg,
                Err(e) => tracing::warn!(error = %e, "ignoring malformed JOB_MANAGER_CONFIG"),
            }
        }

        let d = Self::default();
        Self {
            active_to_running_tasks_ratio: profiled_env_parse(
                p,
                "JOB_MANAGER_ACTIVE_TO_RUNNING_TASKS_RATIO",
                d.active_to_running_tasks_ratio,
            ),
            min_task_processing_ratio: profiled_env_parse(
                p,
                "JOB_MANAGER_MIN_TASK_PROCESSING_RATIO",
                d.min_task_processing_ratio,
            ),
            max_task_processing_ratio: profiled_env_parse(
                p,
                "JOB_MANAGER_MAX_TASK_PROCESSING_RATIO",
                d.max_task_processing_ratio,
            ),
            add_tasks_interval_in_seconds: profiled_env_parse(
                p,
                "JOB_MANAGER_ADD_TASKS_INTERVAL_SECS",
                d.add_tasks_interval_in_seconds,
            ),
            task_increment_interval_in_seconds: profiled_env_parse(
                p,
                "JOB_MANAGER_TASK_INCREMENT_INTERVAL_SECS",
                d.task_increment_interval_in_seconds,
            ),
            max_wall_clock_time_in_hours: profiled_env_parse(
                p,
                "JOB_MANAGER_MAX_WALL_CLOCK_HOURS",
                d.max_wall_clock_time_in_hours,
            ),
            task_increment_count: profiled_env_parse(
                p,
                "JOB_MANAGER_TASK_INCREMENT_COUNT",
                d.task_increment_count,
            ),
        }
    }
}

// ── Task template ─────────────────────────────────────────────

/// A file the pool downloads onto the node before the task starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFile {
    pub http_url: String,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSetting {
    pub name: String,
    pub value: String,
}

/// Static parts of every task specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskTemplateConfig {
    /// Command line with `%name%` placeholders filled from the message body.
    pub command_line: String,
    pub resource_files: Vec<ResourceFile>,
    pub environment_settings: Vec<EnvironmentSetting>,
}

impl TaskTemplateConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            command_line: profiled_env_or(p, "TASK_COMMAND_LINE", ""),
            resource_files: profiled_env_json(p, "TASK_RESOURCE_FILES"),
            environment_settings: profiled_env_json(p, "TASK_ENVIRONMENT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_manager_config_partial_json_uses_defaults() {
        let cfg = JobManagerConfig::from_json(
            r#"{"activeToRunningTasksRatio": 3, "taskIncrementCount": 7}"#,
        )
        .unwrap();
        assert_eq!(cfg.active_to_running_tasks_ratio, 3.0);
        assert_eq!(cfg.task_increment_count, 7);
        assert_eq!(cfg.add_tasks_interval_in_seconds, 15);
        assert_eq!(cfg.max_task_processing_ratio, 1.0);
    }

    #[test]
    fn job_manager_config_rejects_wrong_types() {
        assert!(JobManagerConfig::from_json(r#"{"taskIncrementCount": "many"}"#).is_err());
    }

    #[test]
    fn profiled_lookup_prefers_prefixed_key() {
        env::set_var("JMTEST_POOL_KEY", "plain");
        env::set_var("STAGE_JMTEST_POOL_KEY", "staged");
        assert_eq!(profiled_env_or("STAGE", "JMTEST_POOL_KEY", "x"), "staged");
        assert_eq!(profiled_env_or("", "JMTEST_POOL_KEY", "x"), "plain");
        assert_eq!(profiled_env_or("OTHER", "JMTEST_POOL_KEY", "x"), "plain");
        env::remove_var("JMTEST_POOL_KEY");
        env::remove_var("STAGE_JMTEST_POOL_KEY");
    }

    #[test]
    fn resource_files_parse_from_json_env() {
        env::set_var(
            "JMTEST_RESOURCE_FILES",
            r#"[{"httpUrl": "https://blob/scan.js", "filePath": "scan.js"}]"#,
        );
        let files: Vec<ResourceFile> = profiled_env_json("", "JMTEST_RESOURCE_FILES");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_path, "scan.js");
        env::remove_var("JMTEST_RESOURCE_FILES");
    }

    #[test]
    fn malformed_json_env_falls_back_to_default() {
        env::set_var("JMTEST_BAD_ENV", "not json");
        let settings: Vec<EnvironmentSetting> = profiled_env_json("", "JMTEST_BAD_ENV");
        assert!(settings.is_empty());
        env::remove_var("JMTEST_BAD_ENV");
    }
}

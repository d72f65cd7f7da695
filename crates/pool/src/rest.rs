//! REST client for a Batch-style job scheduler service.
//!
//! Speaks the JSON/OData dialect of the service: `api-version` query
//! parameter on every call, bearer token auth, `odata.nextLink` paging.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use jobman_core::config::{BatchConfig, EnvironmentSetting, ResourceFile};

use crate::error::PoolError;
use crate::sampler::{sample_interval, spawn_sampler, MetricsWindow, SharedWindow};
use crate::service::PoolService;
use crate::types::{
    AddTaskResult, AddTaskStatus, BatchMetricsResult, JobInfo, JobSpec, JobState,
    OnAllTasksComplete, PoolLoad, PoolMetricsInfo, RemoteTaskState, TaskExecutionResult,
    TaskFilter, TaskItem, TaskPage, TaskSpec,
};

/// Pool service client over HTTP.
pub struct RestPoolClient {
    client: reqwest::Client,
    base_url: Url,
    pool_id: String,
    api_version: String,
    access_token: Option<String>,
    window: SharedWindow,
}

impl RestPoolClient {
    pub fn new(config: &BatchConfig) -> Result<Self, PoolError> {
        let base_url = Url::parse(&config.account_url)
            .map_err(|e| PoolError::Config(format!("account url {}: {e}", config.account_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(PoolError::Config(format!(
                "account url {} cannot address resources",
                config.account_url
            )));
        }
        info!(
            url = %config.account_url,
            pool = %config.pool_id,
            api_version = %config.api_version,
            "pool service client initialized"
        );
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            pool_id: config.pool_id.clone(),
            api_version: config.api_version.clone(),
            access_token: config.access_token.clone(),
            window: MetricsWindow::shared(config.metrics_interval_in_minutes),
        })
    }

    /// Start sampling pool load into the window behind
    /// [`PoolService::batch_metrics`]. Abort the handle to stop.
    pub fn start_sampler(self: &Arc<Self>) -> JoinHandle<()> {
        let service: Arc<dyn PoolService> = self.clone();
        spawn_sampler(service, self.window.clone(), sample_interval())
    }

    /// Resource URL under the account. Each segment is percent-encoded, so
    /// ids cannot inject path or query components.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header(reqwest::header::ACCEPT, "application/json");
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response, PoolError> {
        let response = self
            .authorize(req)
            .query(&[("api-version", self.api_version.as_str())])
            .send()
            .await?;
        check(response, what).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, PoolError> {
        let path = segments.join("/");
        debug!(%path, "pool service GET");
        let req = self.client.get(self.endpoint(segments)).query(query);
        let response = self.send(req, &path).await?;
        decode(response, &path).await
    }

    /// Active jobs bound to this client's pool, across all pages.
    async fn pool_job_ids(&self) -> Result<Vec<String>, PoolError> {
        let mut page: JobListWire = self
            .get_json(
                &["jobs"],
                &[("$select", "id,poolInfo"), ("$filter", "state eq 'active'")],
            )
            .await?;
        let mut ids = Vec::new();
        loop {
            ids.extend(
                page.value
                    .into_iter()
                    .filter(|j| j.pool_id() == Some(self.pool_id.as_str()))
                    .map(|j| j.id),
            );
            match page.next_link {
                Some(link) => {
                    let response = self
                        .authorize(self.client.get(&link))
                        .send()
                        .await?;
                    page = decode(check(response, "jobs").await?, "jobs").await?;
                }
                None => break,
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl PoolService for RestPoolClient {
    async fn get_job(&self, job_id: &str) -> Result<JobInfo, PoolError> {
        let job: JobWire = self
            .get_json(&["jobs", job_id], &[("$select", "id,state")])
            .await?;
        Ok(JobInfo {
            id: job.id,
            state: job.state,
        })
    }

    async fn add_job(&self, job: &JobSpec) -> Result<(), PoolError> {
        let body = AddJobWire {
            id: &job.id,
            pool_info: PoolInfoWire {
                pool_id: Some(job.pool_id.clone()),
            },
            on_all_tasks_complete: job.on_all_tasks_complete,
        };
        let req = self.client.post(self.endpoint(&["jobs"])).json(&body);
        self.send(req, "jobs").await?;
        info!(job_id = %job.id, pool = %job.pool_id, "job created");
        Ok(())
    }

    async fn add_tasks(
        &self,
        job_id: &str,
        tasks: &[TaskSpec],
    ) -> Result<Vec<AddTaskResult>, PoolError> {
        let segments = ["jobs", job_id, "addtaskcollection"];
        let path = segments.join("/");
        let body = TaskCollectionWire {
            value: tasks.iter().map(TaskWire::from).collect(),
        };
        let req = self.client.post(self.endpoint(&segments)).json(&body);
        let response = self.send(req, &path).await?;
        let results: AddTaskCollectionResultWire = decode(response, &path).await?;
        Ok(results.value.into_iter().map(AddTaskResult::from).collect())
    }

    async fn list_tasks(
        &self,
        job_id: &str,
        filter: Option<TaskFilter>,
    ) -> Result<TaskPage, PoolError> {
        let mut query = vec![("$select", "id,state,executionInfo")];
        if let Some(filter) = filter {
            query.push(("$filter", filter.odata()));
        }
        let page: TaskListWire = self.get_json(&["jobs", job_id, "tasks"], &query).await?;
        Ok(page.into())
    }

    async fn list_tasks_next(&self, continuation_link: &str) -> Result<TaskPage, PoolError> {
        // The link already carries api-version and the original query.
        let response = self
            .authorize(self.client.get(continuation_link))
            .send()
            .await?;
        let page: TaskListWire = decode(check(response, "tasks").await?, "tasks").await?;
        Ok(page.into())
    }

    async fn pool_metrics(&self) -> Result<PoolMetricsInfo, PoolError> {
        let pool: PoolWire = self
            .get_json(
                &["pools", self.pool_id.as_str()],
                &[(
                    "$select",
                    "id,taskSlotsPerNode,currentDedicatedNodes,currentLowPriorityNodes",
                )],
            )
            .await?;

        let mut load = PoolLoad::default();
        for job_id in self.pool_job_ids().await? {
            let counts: TaskCountsWire = self
                .get_json(&["jobs", job_id.as_str(), "taskcounts"], &[])
                .await?;
            load.active_tasks += counts.task_counts.active;
            load.running_tasks += counts.task_counts.running;
        }

        Ok(PoolMetricsInfo {
            max_tasks_per_pool: pool.max_tasks(),
            id: pool.id,
            load,
        })
    }

    async fn batch_metrics(&self) -> Result<BatchMetricsResult, PoolError> {
        Ok(self.window.lock().await.snapshot(&self.pool_id))
    }
}

async fn check(response: Response, what: &str) -> Result<Response, PoolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status, &body, what))
}

async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, PoolError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| PoolError::Decode(format!("{what}: {e}")))
}

/// Map a non-2xx response to a [`PoolError`]. 404 becomes `NotFound`.
fn api_error(status: StatusCode, body: &str, what: &str) -> PoolError {
    let parsed: ApiErrorWire = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        let detail = if code.is_empty() { "404".to_string() } else { code };
        return PoolError::NotFound(format!("{what} ({detail})"));
    }
    let message = parsed
        .message
        .and_then(|m| m.value)
        .unwrap_or_else(|| body.to_string());
    PoolError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

/// ISO 8601 duration in whole seconds, e.g. `PT600S`.
fn iso8601_duration(d: Duration) -> String {
    format!("PT{}S", d.as_secs())
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ApiErrorWire {
    code: Option<String>,
    message: Option<ErrorMessageWire>,
}

#[derive(Debug, Deserialize)]
struct ErrorMessageWire {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobWire {
    id: String,
    state: JobState,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolInfoWire {
    pool_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddJobWire<'a> {
    id: &'a str,
    pool_info: PoolInfoWire,
    on_all_tasks_complete: OnAllTasksComplete,
}

#[derive(Debug, Deserialize)]
struct JobListWire {
    #[serde(default)]
    value: Vec<JobListItemWire>,
    #[serde(rename = "odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobListItemWire {
    id: String,
    pool_info: Option<PoolInfoWire>,
}

impl JobListItemWire {
    fn pool_id(&self) -> Option<&str> {
        self.pool_info.as_ref().and_then(|p| p.pool_id.as_deref())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskWire<'a> {
    id: &'a str,
    command_line: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    resource_files: &'a [ResourceFile],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    environment_settings: &'a [EnvironmentSetting],
    constraints: ConstraintsWire,
}

impl<'a> From<&'a TaskSpec> for TaskWire<'a> {
    fn from(spec: &'a TaskSpec) -> Self {
        Self {
            id: &spec.id,
            command_line: &spec.command_line,
            resource_files: &spec.resource_files,
            environment_settings: &spec.environment_settings,
            constraints: ConstraintsWire {
                max_wall_clock_time: iso8601_duration(spec.max_wall_clock_time),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConstraintsWire {
    max_wall_clock_time: String,
}

#[derive(Debug, Serialize)]
struct TaskCollectionWire<'a> {
    value: Vec<TaskWire<'a>>,
}

#[derive(Debug, Deserialize)]
struct AddTaskCollectionResultWire {
    #[serde(default)]
    value: Vec<AddTaskResultWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTaskResultWire {
    status: AddTaskStatusWire,
    task_id: String,
    error: Option<ApiErrorWire>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum AddTaskStatusWire {
    Success,
    #[serde(alias = "clienterror")]
    ClientError,
    #[serde(alias = "servererror")]
    ServerError,
}

impl From<AddTaskResultWire> for AddTaskResult {
    fn from(wire: AddTaskResultWire) -> Self {
        let status = match wire.status {
            AddTaskStatusWire::Success => AddTaskStatus::Success,
            AddTaskStatusWire::ClientError => AddTaskStatus::ClientError,
            AddTaskStatusWire::ServerError => AddTaskStatus::ServerError,
        };
        let error = wire.error.map(|e| {
            e.message
                .and_then(|m| m.value)
                .or(e.code)
                .unwrap_or_else(|| "unknown error".to_string())
        });
        Self {
            task_id: wire.task_id,
            status,
            error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskListWire {
    #[serde(default)]
    value: Vec<TaskItemWire>,
    #[serde(rename = "odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskItemWire {
    id: String,
    state: RemoteTaskState,
    execution_info: Option<ExecutionInfoWire>,
}

#[derive(Debug, Deserialize)]
struct ExecutionInfoWire {
    result: Option<TaskExecutionResult>,
}

impl From<TaskListWire> for TaskPage {
    fn from(wire: TaskListWire) -> Self {
        Self {
            items: wire
                .value
                .into_iter()
                .map(|t| TaskItem {
                    id: t.id,
                    state: t.state,
                    result: t.execution_info.and_then(|e| e.result),
                })
                .collect(),
            continuation_link: wire.next_link,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolWire {
    id: String,
    #[serde(default = "one")]
    task_slots_per_node: i64,
    #[serde(default)]
    current_dedicated_nodes: i64,
    #[serde(default)]
    current_low_priority_nodes: i64,
}

fn one() -> i64 {
    1
}

impl PoolWire {
    fn max_tasks(&self) -> i64 {
        self.task_slots_per_node * (self.current_dedicated_nodes + self.current_low_priority_nodes)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskCountsWire {
    task_counts: TaskCountsInnerWire,
}

#[derive(Debug, Deserialize)]
struct TaskCountsInnerWire {
    #[serde(default)]
    active: i64,
    #[serde(default)]
    running: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_not_found() {
        let body = r#"{"code":"JobNotFound","message":{"lang":"en-US","value":"The specified job does not exist."}}"#;
        let err = api_error(StatusCode::NOT_FOUND, body, "jobs/scan");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("JobNotFound"));
    }

    #[test]
    fn other_status_keeps_code_and_message() {
        let body = r#"{"code":"OperationTimedOut","message":{"value":"try later"}}"#;
        match api_error(StatusCode::INTERNAL_SERVER_ERROR, body, "jobs") {
            PoolError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 500);
                assert_eq!(code, "OperationTimedOut");
                assert_eq!(message, "try later");
            }
            other => panic!("expected Api error, got: {other:?}"),
        }
    }

    #[test]
    fn unparseable_error_body_is_kept_verbatim() {
        match api_error(StatusCode::BAD_GATEWAY, "upstream down", "pools/p") {
            PoolError::Api { message, .. } => assert_eq!(message, "upstream down"),
            other => panic!("expected Api error, got: {other:?}"),
        }
    }

    #[test]
    fn task_wire_shape() {
        let spec = TaskSpec {
            id: "task_m1_ab".into(),
            command_line: "/bin/sh -c 'scan https://a.test'".into(),
            resource_files: vec![ResourceFile {
                http_url: "https://blob/scan.js".into(),
                file_path: "scan.js".into(),
            }],
            environment_settings: vec![],
            max_wall_clock_time: Duration::from_secs(600),
        };
        let json = serde_json::to_value(TaskWire::from(&spec)).unwrap();
        assert_eq!(json["commandLine"], "/bin/sh -c 'scan https://a.test'");
        assert_eq!(json["constraints"]["maxWallClockTime"], "PT600S");
        assert_eq!(json["resourceFiles"][0]["httpUrl"], "https://blob/scan.js");
        assert!(json.get("environmentSettings").is_none());
    }

    #[test]
    fn add_job_wire_uses_service_enum_spelling() {
        let body = AddJobWire {
            id: "scan",
            pool_info: PoolInfoWire {
                pool_id: Some("pool-a".into()),
            },
            on_all_tasks_complete: OnAllTasksComplete::TerminateJob,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["onAllTasksComplete"], "terminatejob");
        assert_eq!(json["poolInfo"]["poolId"], "pool-a");
    }

    #[test]
    fn add_task_results_decode_partial_failure() {
        let raw = r#"{"value":[
            {"status":"success","taskId":"t1"},
            {"status":"clientError","taskId":"t2","error":{"code":"TaskExists","message":{"value":"The specified task already exists."}}}
        ]}"#;
        let wire: AddTaskCollectionResultWire = serde_json::from_str(raw).unwrap();
        let results: Vec<AddTaskResult> = wire.value.into_iter().map(Into::into).collect();
        assert!(results[0].is_success());
        assert_eq!(results[1].status, AddTaskStatus::ClientError);
        assert_eq!(
            results[1].error.as_deref(),
            Some("The specified task already exists.")
        );
    }

    #[test]
    fn task_page_decodes_result_and_next_link() {
        let raw = r#"{
            "value":[
                {"id":"t1","state":"completed","executionInfo":{"result":"failure"}},
                {"id":"t2","state":"running"}
            ],
            "odata.nextLink":"https://acct/jobs/j/tasks?api-version=x&$skiptoken=2"
        }"#;
        let page: TaskPage = serde_json::from_str::<TaskListWire>(raw).unwrap().into();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].result, Some(TaskExecutionResult::Failure));
        assert_eq!(page.items[1].state, RemoteTaskState::Running);
        assert!(page.continuation_link.unwrap().contains("skiptoken"));
    }

    #[test]
    fn pool_capacity_counts_all_nodes() {
        let pool: PoolWire = serde_json::from_str(
            r#"{"id":"p","taskSlotsPerNode":4,"currentDedicatedNodes":3,"currentLowPriorityNodes":5}"#,
        )
        .unwrap();
        assert_eq!(pool.max_tasks(), 32);
    }

    fn config(account_url: &str) -> BatchConfig {
        BatchConfig {
            account_url: account_url.into(),
            pool_id: "p".into(),
            api_version: "v".into(),
            access_token: None,
            job_id: "j".into(),
            task_id: None,
            metrics_interval_in_minutes: 5,
        }
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = RestPoolClient::new(&config("https://acct.region.batch.example/")).unwrap();
        assert_eq!(
            client.endpoint(&["jobs", "j"]).as_str(),
            "https://acct.region.batch.example/jobs/j"
        );
    }

    #[test]
    fn endpoint_encodes_ids() {
        let client = RestPoolClient::new(&config("https://acct.region.batch.example")).unwrap();
        let url = client.endpoint(&["jobs", "scan/../pools?x=1#f", "tasks"]);
        assert_eq!(
            url.as_str(),
            "https://acct.region.batch.example/jobs/scan%2F..%2Fpools%3Fx=1%23f/tasks"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.path_segments().unwrap().count(), 3);
    }

    #[test]
    fn unusable_account_url_is_a_config_error() {
        for url in ["not a url", "mailto:ops@example.com"] {
            match RestPoolClient::new(&config(url)) {
                Err(PoolError::Config(_)) => {}
                Err(other) => panic!("expected Config error for {url}, got: {other:?}"),
                Ok(_) => panic!("expected Config error for {url}"),
            }
        }
    }
}

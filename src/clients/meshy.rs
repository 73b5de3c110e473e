//! HTTP + SSE client for the Meshy 3D-generation API.
//!
//! One client covers all four task families; `TaskKind` supplies the
//! endpoint path and the creation-response id field, so the lifecycle
//! methods here stay uniform: create, retrieve, list, stream or poll to
//! a terminal status, plus the account balance call.

use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::{header, Client, Response};
use serde_json::Value as JsonValue;

use crate::domain::{CreatedTask, ListTasksPage, MeshyError, TaskKind, TaskStatus};
use crate::infra::config::{ToolConfig, DEFAULT_MESHY_BASE_URL};
use crate::infra::http::headers::{add_standard_headers, generate_request_id};
use crate::infra::http::sse::SseDecoder;
use crate::infra::logging::log_metric;
use crate::infra::runtime::limits::{make_http_client, make_http_client_with, retry_async_if};

#[derive(Clone)]
pub struct MeshyRemote {
    base: String,
    api_key: Option<String>,
    http: Client,
    retries: u32,
    stream_timeout: Duration,
    poll_interval: Duration,
}

impl MeshyRemote {
    pub fn new(base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base: base.into(),
            api_key,
            http: make_http_client(),
            retries: 2,
            stream_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn from_config(cfg: &ToolConfig) -> Self {
        Self {
            base: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_MESHY_BASE_URL.to_string()),
            api_key: cfg.api_key.clone(),
            http: make_http_client_with(cfg),
            retries: cfg.retries.unwrap_or(2),
            stream_timeout: Duration::from_secs(cfg.stream_timeout_secs.unwrap_or(300)),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms.unwrap_or(2_000)),
        }
    }

    pub fn api_key_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn default_stream_timeout(&self) -> Duration {
        self.stream_timeout
    }

    fn bearer(&self) -> Result<String, MeshyError> {
        match self.api_key.as_deref() {
            Some(k) if !k.trim().is_empty() => Ok(k.to_string()),
            _ => Err(MeshyError::MissingApiKey),
        }
    }

    fn endpoint_url(&self, kind: TaskKind) -> String {
        format!("{}/{}", self.base.trim_end_matches('/'), kind.endpoint())
    }

    fn task_url(&self, kind: TaskKind, task_id: &str) -> String {
        format!("{}/{}", self.endpoint_url(kind), task_id)
    }

    /// Create a task and normalize the inconsistent creation response into
    /// a `CreatedTask`.
    pub async fn create_task(
        &self,
        kind: TaskKind,
        payload: &JsonValue,
    ) -> Result<CreatedTask, MeshyError> {
        let url = self.endpoint_url(kind);
        let key = self.bearer()?;
        let req_id = generate_request_id();
        tracing::debug!(endpoint = %url, kind = %kind, "meshy.create_task request");
        let start = Instant::now();
        let http = self.http.clone();
        let payload = payload.clone();
        let res: Result<JsonValue, MeshyError> = retry_async_if(
            self.retries,
            move |_| {
                let http = http.clone();
                let url = url.clone();
                let key = key.clone();
                let req_id = req_id.clone();
                let payload = payload.clone();
                async move {
                    let (builder, _rid) = add_standard_headers(http.post(url), Some(req_id));
                    let resp = builder.bearer_auth(key).json(&payload).send().await?;
                    let resp = check_status(resp).await?;
                    Ok(resp.json::<JsonValue>().await?)
                }
            },
            MeshyError::is_retryable,
        )
        .await;
        let metric = format!("{}.create", kind);
        if res.is_err() {
            log_metric(&metric, "remote_error_total", 1.0);
        }
        let body = res?;
        log_metric(&metric, "remote_latency_ms", start.elapsed().as_millis() as f64);
        CreatedTask::from_response(kind, &body)
    }

    /// Fetch the raw task object, upstream field names untouched.
    pub async fn retrieve_task(
        &self,
        kind: TaskKind,
        task_id: &str,
    ) -> Result<JsonValue, MeshyError> {
        let url = self.task_url(kind, task_id);
        let key = self.bearer()?;
        tracing::debug!(endpoint = %url, "meshy.retrieve_task request");
        let start = Instant::now();
        let out = async {
            let (builder, _rid) = add_standard_headers(self.http.get(url), None);
            let resp = builder.bearer_auth(key).send().await?;
            let resp = check_status(resp).await?;
            Ok(resp.json::<JsonValue>().await?)
        }
        .await;
        note_outcome(&format!("{kind}.retrieve"), start, &out);
        out
    }

    pub async fn list_tasks(
        &self,
        kind: TaskKind,
        page: ListTasksPage,
    ) -> Result<JsonValue, MeshyError> {
        let url = self.endpoint_url(kind);
        let key = self.bearer()?;
        tracing::debug!(endpoint = %url, page = page.page, page_size = page.page_size, "meshy.list_tasks request");
        let start = Instant::now();
        let out = async {
            let (builder, _rid) = add_standard_headers(self.http.get(url), None);
            let resp = builder.bearer_auth(key).query(&page).send().await?;
            let resp = check_status(resp).await?;
            Ok(resp.json::<JsonValue>().await?)
        }
        .await;
        note_outcome(&format!("{kind}.list"), start, &out);
        out
    }

    /// Follow the task's SSE stream until a terminal status or the timeout.
    /// Returns the last event payload, which at a terminal status is the
    /// full task object.
    pub async fn stream_task(
        &self,
        kind: TaskKind,
        task_id: &str,
        timeout: Duration,
    ) -> Result<JsonValue, MeshyError> {
        let url = format!("{}/stream", self.task_url(kind, task_id));
        let key = self.bearer()?;
        tracing::debug!(endpoint = %url, timeout_secs = timeout.as_secs(), "meshy.stream_task request");
        let start = Instant::now();

        let fut = async {
            let (builder, _rid) = add_standard_headers(self.http.get(url), None);
            let resp = builder
                .bearer_auth(key)
                .header(header::ACCEPT, "text/event-stream")
                // Per-request override: the shared client timeout is sized
                // for unary calls, not long-lived streams.
                .timeout(timeout.saturating_add(Duration::from_secs(1)))
                .send()
                .await?;
            let resp = check_status(resp).await?;

            let mut decoder = SseDecoder::default();
            let mut body = resp.bytes_stream();
            let mut last: Option<JsonValue> = None;
            while let Some(chunk) = body.next().await {
                for data in decoder.push(&chunk?) {
                    let event: JsonValue = serde_json::from_str(&data)?;
                    let terminal = TaskStatus::of(&event).is_some_and(|s| s.is_terminal());
                    last = Some(event);
                    if terminal {
                        return Ok(last);
                    }
                }
            }
            Ok(last)
        };

        let metric = format!("{}.stream", kind);
        let out = match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(Some(event))) => Ok(event),
            Ok(Ok(None)) => Err(MeshyError::StreamEnded(task_id.to_string())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MeshyError::StreamTimeout(task_id.to_string(), timeout.as_secs())),
        };
        if out.is_err() {
            log_metric(&metric, "remote_error_total", 1.0);
        } else {
            log_metric(&metric, "remote_latency_ms", start.elapsed().as_millis() as f64);
        }
        out
    }

    /// Polling counterpart to `stream_task`: re-fetch the task at the
    /// configured interval until a terminal status or the timeout.
    pub async fn poll_task(
        &self,
        kind: TaskKind,
        task_id: &str,
        timeout: Duration,
    ) -> Result<JsonValue, MeshyError> {
        let interval = self.poll_interval;
        let start = Instant::now();
        let fut = async {
            loop {
                let task = self.retrieve_task(kind, task_id).await?;
                if TaskStatus::of(&task).is_some_and(|s| s.is_terminal()) {
                    return Ok(task);
                }
                tokio::time::sleep(interval).await;
            }
        };
        let out = match tokio::time::timeout(timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(MeshyError::PollTimeout(task_id.to_string(), timeout.as_secs())),
        };
        note_outcome(&format!("{kind}.poll"), start, &out);
        out
    }

    pub async fn balance(&self) -> Result<JsonValue, MeshyError> {
        let url = format!("{}/openapi/v1/balance", self.base.trim_end_matches('/'));
        let key = self.bearer()?;
        let start = Instant::now();
        let out = async {
            let (builder, _rid) = add_standard_headers(self.http.get(url), None);
            let resp = builder.bearer_auth(key).send().await?;
            let resp = check_status(resp).await?;
            Ok(resp.json::<JsonValue>().await?)
        }
        .await;
        note_outcome("balance", start, &out);
        out
    }
}

/// One metric line per call: error count on failure, latency on success.
fn note_outcome<T>(metric: &str, start: Instant, out: &Result<T, MeshyError>) {
    if out.is_err() {
        log_metric(metric, "remote_error_total", 1.0);
    } else {
        log_metric(metric, "remote_latency_ms", start.elapsed().as_millis() as f64);
    }
}

async fn check_status(resp: Response) -> Result<Response, MeshyError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(MeshyError::UpstreamStatus { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(base: impl Into<String>) -> MeshyRemote {
        MeshyRemote::new(base, Some("test-key".into()))
    }

    #[tokio::test]
    async fn create_text_to_3d_reads_result_field() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/openapi/v2/text-to-3d")
                .header("authorization", "Bearer test-key")
                .header_exists("x-request-id")
                .header_exists("user-agent")
                .json_body(json!({
                    "mode": "preview",
                    "prompt": "a chair",
                    "art_style": "realistic",
                    "should_remesh": true
                }));
            then.status(200).json_body(json!({"result": "task-123"}));
        });

        let cli = client(server.base_url());
        let payload = json!({
            "mode": "preview",
            "prompt": "a chair",
            "art_style": "realistic",
            "should_remesh": true
        });
        let created = cli.create_task(TaskKind::TextTo3d, &payload).await.unwrap();
        m.assert();
        assert_eq!(created.id, "task-123");
    }

    #[tokio::test]
    async fn create_remesh_reads_id_field() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/openapi/v1/remesh");
            then.status(200).json_body(json!({"id": "task-456"}));
        });

        let cli = client(server.base_url());
        let created = cli
            .create_task(TaskKind::Remesh, &json!({"input_task_id": "task-123"}))
            .await
            .unwrap();
        assert_eq!(created.id, "task-456");
    }

    #[tokio::test]
    async fn create_retries_then_succeeds() {
        let server = MockServer::start();

        // First call 500. httpmock serves the earliest matching mock on
        // every request, so this one must stop matching after its first
        // hit to let the 200 mock below answer the retry. `matches` only
        // accepts a plain fn pointer, hence the static flag.
        static FIRST_HIT: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);
        fn only_first_request(_req: &HttpMockRequest) -> bool {
            !FIRST_HIT.swap(true, std::sync::atomic::Ordering::SeqCst)
        }
        server.mock(|when, then| {
            when.method(POST)
                .path("/openapi/v1/image-to-3d")
                .matches(only_first_request);
            then.status(500).body("err");
        });

        // Second call 200
        server.mock(|when, then| {
            when.method(POST).path("/openapi/v1/image-to-3d");
            then.status(200).json_body(json!({"id": "task-789"}));
        });

        let cli = client(server.base_url());
        let created = cli
            .create_task(TaskKind::ImageTo3d, &json!({"image_url": "https://x/i.png"}))
            .await
            .unwrap();
        assert_eq!(created.id, "task-789");
    }

    #[tokio::test]
    async fn create_surfaces_upstream_client_error_without_retrying() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/openapi/v1/text-to-texture");
            then.status(400).body("bad prompt");
        });
        let cli = client(server.base_url());
        let err = cli
            .create_task(TaskKind::TextToTexture, &json!({"model_url": "x"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("bad prompt"));
        assert_eq!(m.hits(), 1, "a 4xx creation must not be retried");
    }

    #[tokio::test]
    async fn missing_api_key_is_actionable_without_io() {
        let cli = MeshyRemote::new("http://unreachable.invalid", None);
        let err = cli
            .create_task(TaskKind::TextTo3d, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshyError::MissingApiKey));
        assert!(!cli.api_key_configured());
    }

    #[tokio::test]
    async fn retrieve_returns_raw_task_object() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/openapi/v2/text-to-3d/task-123")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({
                "id": "task-123",
                "status": "IN_PROGRESS",
                "progress": 42
            }));
        });
        let cli = client(server.base_url());
        let task = cli.retrieve_task(TaskKind::TextTo3d, "task-123").await.unwrap();
        m.assert();
        assert_eq!(task["progress"], 42);
        assert_eq!(TaskStatus::of(&task), Some(TaskStatus::InProgress));
    }

    #[tokio::test]
    async fn list_sends_pagination_query() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/openapi/v1/remesh")
                .query_param("page_size", "25")
                .query_param("page", "3");
            then.status(200).json_body(json!([{"id": "t1"}, {"id": "t2"}]));
        });
        let cli = client(server.base_url());
        let page = ListTasksPage { page_size: 25, page: 3 };
        let tasks = cli.list_tasks(TaskKind::Remesh, page).await.unwrap();
        m.assert();
        assert_eq!(tasks.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stream_returns_last_event_at_terminal_status() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/openapi/v2/text-to-3d/task-123/stream")
                .header("accept", "text/event-stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(concat!(
                    "data: {\"id\":\"task-123\",\"status\":\"PENDING\",\"progress\":0}\n\n",
                    "data: {\"id\":\"task-123\",\"status\":\"IN_PROGRESS\",\"progress\":50}\n\n",
                    "data: {\"id\":\"task-123\",\"status\":\"SUCCEEDED\",\"progress\":100}\n\n",
                ));
        });
        let cli = client(server.base_url());
        let task = cli
            .stream_task(TaskKind::TextTo3d, "task-123", Duration::from_secs(5))
            .await
            .unwrap();
        m.assert();
        assert_eq!(task["status"], "SUCCEEDED");
        assert_eq!(task["progress"], 100);
    }

    #[tokio::test]
    async fn stream_without_any_data_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/openapi/v1/remesh/task-9/stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(": keep-alive\n\n");
        });
        let cli = client(server.base_url());
        let err = cli
            .stream_task(TaskKind::Remesh, "task-9", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshyError::StreamEnded(_)));
    }

    #[tokio::test]
    async fn stream_is_bounded_by_timeout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/openapi/v1/image-to-3d/task-slow/stream");
            then.status(200)
                .delay(std::time::Duration::from_secs(3))
                .header("content-type", "text/event-stream")
                .body("data: {\"status\":\"SUCCEEDED\"}\n\n");
        });
        let cli = client(server.base_url());
        let err = cli
            .stream_task(TaskKind::ImageTo3d, "task-slow", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshyError::StreamTimeout(_, _)));
    }

    #[tokio::test]
    async fn poll_returns_terminal_task() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/openapi/v1/text-to-texture/task-7");
            then.status(200)
                .json_body(json!({"id": "task-7", "status": "FAILED", "task_error": {"message": "boom"}}));
        });
        let cli = client(server.base_url());
        let task = cli
            .poll_task(TaskKind::TextToTexture, "task-7", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(task["status"], "FAILED");
    }

    #[tokio::test]
    async fn poll_times_out_on_nonterminal_task() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/openapi/v2/text-to-3d/task-stuck");
            then.status(200).json_body(json!({"id": "task-stuck", "status": "PENDING"}));
        });
        let mut cli = client(server.base_url());
        cli.poll_interval = Duration::from_millis(10);
        let err = cli
            .poll_task(TaskKind::TextTo3d, "task-stuck", Duration::from_millis(80))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshyError::PollTimeout(_, _)));
    }

    #[tokio::test]
    async fn balance_gets_v1_endpoint() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/openapi/v1/balance")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({"balance": 1000}));
        });
        let cli = client(server.base_url());
        let out = cli.balance().await.unwrap();
        m.assert();
        assert_eq!(out["balance"], 1000);
    }
}

//! HTTP_REQUEST / WEBHOOK executor
//!
//! Expected data: { "endpoint": "https://api.example.com/orders", "method": "POST", "body": "{\"id\": 1}" }
//!
//! Merges `{ "httpResponse": { "status", "statusText", "data" } }` into the
//! context. The call runs inside one step, so a replayed run does not send the
//! request twice once it has completed.

use crate::{
    error::{EngineError, EngineResult},
    runtime::{
        executor::{ExecutorInput, NodeExecutor},
        status::{NodeStatus, StatusChannel},
    },
    workflow::types::ExecutionContext,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Context key the response is written under
pub const HTTP_RESPONSE_KEY: &str = "httpResponse";

/// Schema of an HTTP node's data
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestData {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    /// String bodies are sent as JSON when they parse, as text otherwise
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    fn parse(method: &str) -> Option<Self> {
        match method.trim().to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            _ => None,
        }
    }

    fn accepts_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Text(String),
}

/// A validated, ready-to-send request
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub endpoint: String,
    pub method: HttpMethod,
    pub body: RequestBody,
}

impl PreparedRequest {
    /// Validate node data; never touches the network
    pub fn from_node(node_id: &str, data: &Map<String, Value>) -> EngineResult<Self> {
        let config_error = |message: String| EngineError::NodeConfig {
            node_id: node_id.to_string(),
            message,
        };

        let data: HttpRequestData = serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| config_error(format!("malformed HTTP node data: {}", e)))?;

        let endpoint = data
            .endpoint
            .map(|endpoint| endpoint.trim().to_string())
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| config_error("HTTP request node has no endpoint configured".to_string()))?;

        let method = match data.method.as_deref() {
            None | Some("") => HttpMethod::Get,
            Some(raw) => HttpMethod::parse(raw)
                .ok_or_else(|| config_error(format!("unsupported HTTP method: {}", raw)))?,
        };

        let body = if method.accepts_body() {
            match data.body {
                None | Some(Value::Null) => RequestBody::Empty,
                Some(Value::String(text)) if text.trim().is_empty() => RequestBody::Empty,
                Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
                    Ok(json) => RequestBody::Json(json),
                    Err(_) => RequestBody::Text(text),
                },
                Some(json) => RequestBody::Json(json),
            }
        } else {
            RequestBody::Empty
        };

        Ok(Self { endpoint, method, body })
    }
}

/// What the node contributes to the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub data: Value,
}

/// Executor shared by HTTP_REQUEST and WEBHOOK nodes
#[derive(Debug, Clone)]
pub struct HttpRequestExecutor {
    client: reqwest::Client,
    /// When set, timeouts, connection failures and 5xx responses are retriable
    retry_transient: bool,
}

impl HttpRequestExecutor {
    pub fn new(timeout: Duration, retry_transient: bool) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::NonRetriable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, retry_transient })
    }

    fn classify(&self, transient: bool, message: String) -> EngineError {
        if self.retry_transient && transient {
            EngineError::Retriable(message)
        } else {
            EngineError::NonRetriable(message)
        }
    }

    /// Issue the request and interpret the response
    pub async fn send(&self, request: &PreparedRequest) -> EngineResult<HttpResponse> {
        tracing::debug!("🌍 HTTP Request: {:?} {}", request.method, request.endpoint);

        let mut builder = self.client.request(request.method.as_reqwest(), &request.endpoint);
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(json) => builder.json(json),
            RequestBody::Text(text) => builder.header(CONTENT_TYPE, "text/plain").body(text.clone()),
        };

        let response = builder.send().await.map_err(|e| {
            self.classify(
                e.is_timeout() || e.is_connect(),
                format!("HTTP request to {} failed: {}", request.endpoint, e),
            )
        })?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("json"))
            .unwrap_or(false);

        let text = response.text().await.map_err(|e| {
            self.classify(
                e.is_timeout(),
                format!("failed to read response body from {}: {}", request.endpoint, e),
            )
        })?;

        let data = if is_json {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };

        tracing::debug!("📡 Response status: {}", status);

        if !status.is_success() {
            let body = match &data {
                Value::String(text) => text.clone(),
                json => json.to_string(),
            };
            return Err(self.classify(
                status.is_server_error(),
                format!(
                    "HTTP request to {} failed with status {} {}: {}",
                    request.endpoint,
                    status.as_u16(),
                    status_text,
                    body
                ),
            ));
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text,
            data,
        })
    }
}

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    fn channel(&self) -> StatusChannel {
        StatusChannel::HttpRequest
    }

    async fn execute(&self, input: ExecutorInput<'_>) -> EngineResult<ExecutionContext> {
        input.report(self.channel(), NodeStatus::Loading);
        let result = self.call(&input).await;
        input.finish(self.channel(), result)
    }
}

impl HttpRequestExecutor {
    async fn call(&self, input: &ExecutorInput<'_>) -> EngineResult<ExecutionContext> {
        let request = PreparedRequest::from_node(input.node_id, input.data)?;

        let executor = self;
        let prepared = &request;
        let response = input
            .step
            .run(&format!("http-request:{}", input.node_id), move || executor.send(prepared))
            .await?;

        tracing::info!(
            "✅ HTTP request completed: {:?} {} (status: {})",
            request.method,
            request.endpoint,
            response.status
        );

        let mut context = input.context.clone();
        context.insert(HTTP_RESPONSE_KEY, serde_json::to_value(&response)?);
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        status::ChannelStatusPublisher,
        step::{MemoryStepStore, RetryPolicy, StepRunner},
    };
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    async fn spawn_mock_server(hits: Arc<AtomicU32>) -> String {
        let counted = hits.clone();
        let app = Router::new()
            .route("/ok", get(|| async { Json(json!({ "id": 7 })) }))
            .route("/text", get(|| async { "plain text" }))
            .route(
                "/boom",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" }))) }),
            )
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, "no such order") }),
            )
            .route(
                "/echo",
                post(|headers: HeaderMap, body: String| async move {
                    let content_type = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(json!({ "contentType": content_type, "body": body }))
                }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    "too late"
                }),
            )
            .route(
                "/count",
                get(move || {
                    let counted = counted.clone();
                    async move {
                        counted.fetch_add(1, Ordering::SeqCst);
                        Json(json!({ "ok": true }))
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn executor() -> HttpRequestExecutor {
        HttpRequestExecutor::new(Duration::from_secs(5), false).unwrap()
    }

    async fn run_node(
        executor: &HttpRequestExecutor,
        step: &StepRunner,
        hub: &ChannelStatusPublisher,
        node_data: Map<String, Value>,
    ) -> EngineResult<ExecutionContext> {
        executor
            .execute(ExecutorInput {
                node_id: "http",
                data: &node_data,
                context: ExecutionContext::new(),
                step,
                publisher: hub,
            })
            .await
    }

    fn step_runner(run_id: &str) -> StepRunner {
        StepRunner::new(run_id, Arc::new(MemoryStepStore::new()), RetryPolicy::default())
    }

    #[tokio::test]
    async fn get_json_response_is_merged_into_context() {
        let base = spawn_mock_server(Arc::default()).await;
        let hub = ChannelStatusPublisher::default();

        let context = run_node(
            &executor(),
            &step_runner("run-1"),
            &hub,
            data(json!({ "endpoint": format!("{}/ok", base), "method": "GET" })),
        )
        .await
        .unwrap();

        assert_eq!(
            context.get(HTTP_RESPONSE_KEY),
            Some(&json!({ "status": 200, "statusText": "OK", "data": { "id": 7 } }))
        );
        assert_eq!(hub.run_status("run-1")[0].status, NodeStatus::Success);
    }

    #[tokio::test]
    async fn non_json_response_is_kept_as_text() {
        let base = spawn_mock_server(Arc::default()).await;

        let context = run_node(
            &executor(),
            &step_runner("run-1"),
            &ChannelStatusPublisher::default(),
            data(json!({ "endpoint": format!("{}/text", base) })),
        )
        .await
        .unwrap();

        assert_eq!(context.get(HTTP_RESPONSE_KEY).unwrap()["data"], json!("plain text"));
    }

    #[tokio::test]
    async fn server_error_is_fatal_and_carries_status_and_body() {
        let base = spawn_mock_server(Arc::default()).await;
        let hub = ChannelStatusPublisher::default();

        let error = run_node(
            &executor(),
            &step_runner("run-1"),
            &hub,
            data(json!({ "endpoint": format!("{}/boom", base), "method": "GET" })),
        )
        .await
        .unwrap_err();

        assert!(!error.is_retriable());
        let message = error.to_string();
        assert!(message.contains("500"), "{}", message);
        assert!(message.contains("boom"), "{}", message);
        assert_eq!(hub.run_status("run-1")[0].status, NodeStatus::Error);
    }

    #[tokio::test]
    async fn client_error_body_is_read_as_text() {
        let base = spawn_mock_server(Arc::default()).await;

        let error = run_node(
            &executor(),
            &step_runner("run-1"),
            &ChannelStatusPublisher::default(),
            data(json!({ "endpoint": format!("{}/missing", base) })),
        )
        .await
        .unwrap_err();

        let message = error.to_string();
        assert!(message.contains("404 Not Found"), "{}", message);
        assert!(message.contains("no such order"), "{}", message);
    }

    #[tokio::test]
    async fn server_error_is_retriable_when_transient_retries_enabled() {
        let base = spawn_mock_server(Arc::default()).await;
        let executor = HttpRequestExecutor::new(Duration::from_secs(5), true).unwrap();
        let request = PreparedRequest::from_node("http", &data(json!({ "endpoint": format!("{}/boom", base) }))).unwrap();

        assert!(executor.send(&request).await.unwrap_err().is_retriable());
    }

    #[tokio::test]
    async fn missing_endpoint_fails_before_any_request() {
        let store = Arc::new(MemoryStepStore::new());
        let step = StepRunner::new("run-1", store.clone(), RetryPolicy::default());
        let hub = ChannelStatusPublisher::default();

        let error = run_node(&executor(), &step, &hub, Map::new()).await.unwrap_err();

        assert!(matches!(error, EngineError::NodeConfig { ref node_id, .. } if node_id == "http"));
        assert!(error.to_string().contains("endpoint"));
        assert_eq!(store.len().await, 0);
        assert_eq!(hub.run_status("run-1")[0].status, NodeStatus::Error);
    }

    #[tokio::test]
    async fn string_body_is_sent_as_json_when_it_parses() {
        let base = spawn_mock_server(Arc::default()).await;

        let context = run_node(
            &executor(),
            &step_runner("run-1"),
            &ChannelStatusPublisher::default(),
            data(json!({
                "endpoint": format!("{}/echo", base),
                "method": "post",
                "body": "{\"orderId\": 42}"
            })),
        )
        .await
        .unwrap();

        let echoed = &context.get(HTTP_RESPONSE_KEY).unwrap()["data"];
        assert!(echoed["contentType"].as_str().unwrap().starts_with("application/json"));
        assert_eq!(serde_json::from_str::<Value>(echoed["body"].as_str().unwrap()).unwrap(), json!({ "orderId": 42 }));
    }

    #[tokio::test]
    async fn unparseable_string_body_falls_back_to_text() {
        let base = spawn_mock_server(Arc::default()).await;

        let context = run_node(
            &executor(),
            &step_runner("run-1"),
            &ChannelStatusPublisher::default(),
            data(json!({
                "endpoint": format!("{}/echo", base),
                "method": "POST",
                "body": "hello {not json"
            })),
        )
        .await
        .unwrap();

        let echoed = &context.get(HTTP_RESPONSE_KEY).unwrap()["data"];
        assert_eq!(echoed["contentType"], json!("text/plain"));
        assert_eq!(echoed["body"], json!("hello {not json"));
    }

    #[test]
    fn body_is_ignored_for_get_and_method_defaults_to_get() {
        let request = PreparedRequest::from_node(
            "http",
            &data(json!({ "endpoint": "https://example.test/ok", "body": "{\"a\":1}" })),
        )
        .unwrap();

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.body, RequestBody::Empty);
    }

    #[test]
    fn unsupported_method_is_a_configuration_error() {
        let result = PreparedRequest::from_node(
            "http",
            &data(json!({ "endpoint": "https://example.test/ok", "method": "TRACE" })),
        );
        assert!(matches!(result, Err(EngineError::NodeConfig { .. })));
    }

    #[tokio::test]
    async fn completed_request_is_not_resent_on_replay() {
        let hits = Arc::new(AtomicU32::new(0));
        let base = spawn_mock_server(hits.clone()).await;
        let store = Arc::new(MemoryStepStore::new());
        let node_data = data(json!({ "endpoint": format!("{}/count", base) }));

        for _ in 0..2 {
            let step = StepRunner::new("run-replayed", store.clone(), RetryPolicy::default());
            let context = run_node(&executor(), &step, &ChannelStatusPublisher::default(), node_data.clone())
                .await
                .unwrap();
            assert_eq!(context.get(HTTP_RESPONSE_KEY).unwrap()["status"], json!(200));
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Address nothing is listening on any more
    async fn closed_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/orders", addr)
    }

    fn get_request(endpoint: &str) -> PreparedRequest {
        PreparedRequest::from_node("http", &data(json!({ "endpoint": endpoint }))).unwrap()
    }

    #[tokio::test]
    async fn connection_failure_is_fatal_and_names_the_endpoint() {
        let endpoint = closed_endpoint().await;

        let err = executor().send(&get_request(&endpoint)).await.unwrap_err();

        assert!(!err.is_retriable());
        assert!(matches!(err, EngineError::NonRetriable(ref msg) if msg.contains(&endpoint)), "{}", err);
    }

    #[tokio::test]
    async fn connection_failure_is_retriable_when_transient_retries_enabled() {
        let endpoint = closed_endpoint().await;
        let executor = HttpRequestExecutor::new(Duration::from_secs(5), true).unwrap();

        let err = executor.send(&get_request(&endpoint)).await.unwrap_err();

        assert!(matches!(err, EngineError::Retriable(ref msg) if msg.contains(&endpoint)), "{}", err);
    }

    #[tokio::test]
    async fn timeout_is_fatal_by_default() {
        let base = spawn_mock_server(Arc::default()).await;
        let executor = HttpRequestExecutor::new(Duration::from_millis(100), false).unwrap();

        let err = executor.send(&get_request(&format!("{}/slow", base))).await.unwrap_err();

        assert!(matches!(err, EngineError::NonRetriable(ref msg) if msg.contains("/slow")), "{}", err);
    }

    #[tokio::test]
    async fn timeout_is_retried_then_reported_as_exhausted() {
        let base = spawn_mock_server(Arc::default()).await;
        let executor = HttpRequestExecutor::new(Duration::from_millis(100), true).unwrap();
        let endpoint = format!("{}/slow", base);

        let err = executor.send(&get_request(&endpoint)).await.unwrap_err();
        assert!(err.is_retriable(), "{}", err);

        let step = StepRunner::new(
            "run-slow",
            Arc::new(MemoryStepStore::new()),
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            },
        );
        let hub = ChannelStatusPublisher::default();
        let err = run_node(&executor, &step, &hub, data(json!({ "endpoint": endpoint })))
            .await
            .unwrap_err();

        assert!(
            matches!(err, EngineError::NonRetriable(ref msg) if msg.contains("failed after 2 attempts")),
            "{}",
            err
        );
        assert_eq!(hub.run_status("run-slow")[0].status, NodeStatus::Error);
    }
}

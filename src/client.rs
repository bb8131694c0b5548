use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::RuntimeCallError;
use crate::models::{CompletionParams, Message};

// body the runtime sends back from /api/chat while a previous generation is still running
pub const BUSY_SIGNAL: &str = "llm is running";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RuntimeUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64
}

// the shapes a runtime may answer a chat call with
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RuntimeReply {
    Generated {
        text: String,
        #[serde(default)]
        usage: Option<RuntimeUsage>,
    },
    Message {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Reply(RuntimeReply),
    Busy,
}

// the call contract shared by the HTTP client and the mock
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn reset(&self, system_prompt: &str) -> Result<(), RuntimeCallError>;

    async fn chat(&self, messages: &[Message], params: &CompletionParams) -> Result<ChatOutcome, RuntimeCallError>;

    async fn health(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub reset: Duration,
    pub chat: Duration,
    pub health: Duration
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            reset: Duration::from_secs(30),
            chat: Duration::from_secs(90),
            health: Duration::from_secs(1),
        }
    }
}

#[derive(Serialize)]
struct ResetPayload<'a> {
    system_prompt: &'a str
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    messages: &'a [Message],
    #[serde(flatten)]
    params: &'a CompletionParams
}

// one shared reqwest client so connections to the runtime are pooled
#[derive(Clone)]
pub struct RuntimeClient {
    http: Client,
    base_url: String,
    timeouts: Timeouts
}

impl RuntimeClient {

    pub fn new(base_url: impl Into<String>, timeouts: Timeouts) -> Self {

        RuntimeClient {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeouts,
        }

    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

}

#[async_trait]
impl Runtime for RuntimeClient {

    async fn reset(&self, system_prompt: &str) -> Result<(), RuntimeCallError> {

        let response = self.http
            .post(self.url("/api/reset"))
            .timeout(self.timeouts.reset)
            .json(&ResetPayload { system_prompt })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeCallError::Http { status: status.as_u16(), body });
        }

        Ok(())

    }

    async fn chat(&self, messages: &[Message], params: &CompletionParams) -> Result<ChatOutcome, RuntimeCallError> {

        let response = self.http
            .post(self.url("/api/chat"))
            .timeout(self.timeouts.chat)
            .json(&ChatPayload { messages, params })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // the busy signal can arrive with any status, so look at the body first
        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        let is_busy = parsed
            .as_ref()
            .and_then(|value| value.get("error"))
            .and_then(Value::as_str)
            == Some(BUSY_SIGNAL);

        if is_busy {
            return Ok(ChatOutcome::Busy);
        }

        if !status.is_success() {
            return Err(RuntimeCallError::Http { status: status.as_u16(), body });
        }

        let value = parsed.ok_or_else(|| {
            RuntimeCallError::Protocol(format!("response body is not JSON: {}", preview(&body)))
        })?;

        let reply: RuntimeReply = serde_json::from_value(value)
            .map_err(|e| RuntimeCallError::Protocol(format!("unrecognised response shape: {}", e)))?;

        Ok(ChatOutcome::Reply(reply))

    }

    async fn health(&self) -> bool {

        match self.http
            .get(self.url("/api/health"))
            .timeout(self.timeouts.health)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "runtime health check failed");
                false
            }
        }

    }

}

fn preview(body: &str) -> String {

    const LIMIT: usize = 120;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }

}

#[cfg(test)]
pub(crate) mod tests {

    use super::*;
    use crate::models::Role;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    pub(crate) async fn spawn_stub(app: Router) -> SocketAddr {

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr

    }

    // a port nothing is listening on
    pub(crate) async fn closed_port_url() -> String {

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)

    }

    fn client_for(addr: SocketAddr) -> RuntimeClient {
        RuntimeClient::new(format!("http://{}/", addr), Timeouts::default())
    }

    fn params() -> CompletionParams {
        CompletionParams { max_tokens: 64, temperature: 0.2 }
    }

    #[tokio::test]
    async fn test_reset_sends_system_prompt() {

        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let app = Router::new()
            .route("/api/reset", post(|State(seen): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
                seen.lock().unwrap().push(body);
                Json(json!({"ok": true}))
            }))
            .with_state(seen.clone());
        let client = client_for(spawn_stub(app).await);

        client.reset("You are helpful.").await.unwrap();

        let bodies = seen.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0], json!({"system_prompt": "You are helpful."}));

    }

    #[tokio::test]
    async fn test_reset_non_success_is_http_error() {

        let app = Router::new().route(
            "/api/reset",
            post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "kv reset failed") }),
        );
        let client = client_for(spawn_stub(app).await);

        let err = client.reset("").await.unwrap_err();
        match err {
            RuntimeCallError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "kv reset failed");
            }
            other => panic!("expected http error, got {:?}", other),
        }

    }

    #[tokio::test]
    async fn test_chat_flattens_params_and_returns_message_reply() {

        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let app = Router::new()
            .route("/api/chat", post(|State(seen): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
                seen.lock().unwrap().push(body);
                Json(json!({"done": true, "message": "Hello!"}))
            }))
            .with_state(seen.clone());
        let client = client_for(spawn_stub(app).await);

        let messages = vec![Message::new(Role::User, "Hi")];
        let outcome = client.chat(&messages, &params()).await.unwrap();

        assert_eq!(
            outcome,
            ChatOutcome::Reply(RuntimeReply::Message { message: "Hello!".to_string() })
        );
        let bodies = seen.lock().unwrap();
        assert_eq!(bodies[0]["messages"], json!([{"role": "user", "content": "Hi"}]));
        assert_eq!(bodies[0]["max_tokens"], json!(64));
        assert!(bodies[0].get("temperature").is_some());

    }

    #[tokio::test]
    async fn test_chat_detects_busy_signal_in_success_body() {

        let app = Router::new().route("/api/chat", post(|| async { Json(json!({"error": BUSY_SIGNAL})) }));
        let client = client_for(spawn_stub(app).await);

        let outcome = client.chat(&[], &params()).await.unwrap();
        assert_eq!(outcome, ChatOutcome::Busy);

    }

    #[tokio::test]
    async fn test_chat_detects_busy_signal_in_error_body() {

        let app = Router::new().route(
            "/api/chat",
            post(|| async { (AxumStatus::SERVICE_UNAVAILABLE, Json(json!({"error": BUSY_SIGNAL}))) }),
        );
        let client = client_for(spawn_stub(app).await);

        let outcome = client.chat(&[], &params()).await.unwrap();
        assert_eq!(outcome, ChatOutcome::Busy);

    }

    #[tokio::test]
    async fn test_chat_other_error_status_is_http_error() {

        let app = Router::new().route(
            "/api/chat",
            post(|| async { (AxumStatus::BAD_REQUEST, Json(json!({"error": "bad messages"}))) }),
        );
        let client = client_for(spawn_stub(app).await);

        let err = client.chat(&[], &params()).await.unwrap_err();
        assert!(matches!(err, RuntimeCallError::Http { status: 400, .. }));

    }

    #[tokio::test]
    async fn test_chat_non_json_body_is_protocol_error() {

        let app = Router::new().route("/api/chat", post(|| async { "definitely not json" }));
        let client = client_for(spawn_stub(app).await);

        let err = client.chat(&[], &params()).await.unwrap_err();
        assert!(matches!(err, RuntimeCallError::Protocol(_)));

    }

    #[tokio::test]
    async fn test_chat_unknown_shape_is_protocol_error() {

        let app = Router::new().route("/api/chat", post(|| async { Json(json!({"done": false})) }));
        let client = client_for(spawn_stub(app).await);

        let err = client.chat(&[], &params()).await.unwrap_err();
        assert!(matches!(err, RuntimeCallError::Protocol(_)));

    }

    #[tokio::test]
    async fn test_chat_connection_refused_is_network_error() {

        let client = RuntimeClient::new(closed_port_url().await, Timeouts::default());

        let err = client.chat(&[], &params()).await.unwrap_err();
        assert!(matches!(err, RuntimeCallError::Network(_)));

    }

    #[tokio::test]
    async fn test_health_check() {

        let app = Router::new().route("/api/health", get(|| async { "ok" }));
        let healthy = client_for(spawn_stub(app).await);
        assert!(healthy.health().await);

        let unreachable = RuntimeClient::new(closed_port_url().await, Timeouts::default());
        assert!(!unreachable.health().await);

        let app = Router::new().route("/api/health", get(|| async { AxumStatus::SERVICE_UNAVAILABLE }));
        let starting = client_for(spawn_stub(app).await);
        assert!(!starting.health().await);

    }

    #[test]
    fn test_reply_shapes_deserialize() {

        let generated: RuntimeReply = serde_json::from_value(json!({
            "text": "hi",
            "usage": {"prompt_tokens": 3, "completion_tokens": 1}
        }))
        .unwrap();
        assert_eq!(
            generated,
            RuntimeReply::Generated {
                text: "hi".to_string(),
                usage: Some(RuntimeUsage { prompt_tokens: 3, completion_tokens: 1 }),
            }
        );

        let message: RuntimeReply = serde_json::from_value(json!({"done": true, "message": "hi"})).unwrap();
        assert_eq!(message, RuntimeReply::Message { message: "hi".to_string() });

    }

}

//! HTTP transport for the OpenAI API.
//!
//! Thin wrapper around `reqwest` that every upstream call goes through:
//!
//! - attaches the bearer credential, checked on every call so a missing key
//!   fails each request rather than only the first
//! - serializes JSON request bodies
//! - content-negotiates the response (JSON body vs. raw text)
//! - normalizes non-2xx responses into [`TransportError::Upstream`] with the
//!   payload preserved
//!
//! No retries happen here; retry policy belongs to the caller.

use futures::stream::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;

use crate::ports::ApiError;

/// Configuration for the OpenAI adapter.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication. Absent keys fail every call.
    api_key: Option<Secret<String>>,
    /// Default model for reply generation.
    pub model: String,
    /// Base URL for the API (default: https://api.openai.com/v1).
    pub base_url: String,
    /// Timeout for buffered requests.
    pub timeout: Duration,
    /// Connect timeout, also applied to streaming requests.
    pub connect_timeout: Duration,
    /// Request buffered generations as background responses.
    pub background: bool,
}

impl OpenAIConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::without_key().with_api_key(api_key)
    }

    /// Creates a configuration with no credential.
    pub fn without_key() -> Self {
        Self {
            api_key: None,
            model: "gpt-5-nano-2025-08-07".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            background: true,
        }
    }

    /// Sets the API key. Blank keys are treated as missing.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.trim().is_empty()).then(|| Secret::new(key));
        self
    }

    /// Sets the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets whether buffered generations run in the background.
    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, TransportError> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .ok_or(TransportError::MissingCredential)
    }
}

/// Transport-level failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("OPENAI_API_KEY is not configured")]
    MissingCredential,

    #[error("upstream request failed ({status}): {payload}")]
    Upstream { status: u16, payload: Value },

    #[error("upstream returned no response body ({status})")]
    MissingBody { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::MissingCredential => ApiError::Configuration(err.to_string()),
            TransportError::Upstream { status, payload } => ApiError::upstream(status, payload),
            TransportError::MissingBody { status } => {
                ApiError::upstream(status, Value::String("empty response body".to_string()))
            }
            TransportError::Network(msg) => ApiError::Network(msg),
            TransportError::Parse(msg) => ApiError::Parse(msg),
        }
    }
}

/// A single upstream request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Path relative to the base URL, including any query string.
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(&'static str, String)>,
    pub accept: Option<&'static str>,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            accept: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
            headers: Vec::new(),
            accept: None,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = Some(accept);
        self
    }
}

/// Response body after content negotiation.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// Converts into a JSON value, wrapping raw text in a JSON string.
    pub fn into_json(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Text(text) => Value::String(text),
        }
    }
}

/// A successful upstream response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub payload: Payload,
}

/// Raw byte stream from a streaming call.
pub type TransportStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// HTTP transport bound to one base URL and credential.
pub struct HttpTransport {
    config: OpenAIConfig,
    client: Client,
    stream_client: Client,
}

impl HttpTransport {
    /// Creates a transport. Fails only if the HTTP client cannot be built.
    pub fn new(config: OpenAIConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {}", e)))?;

        // Streams may legitimately stay open longer than any request timeout.
        let stream_client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            stream_client,
        })
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn send(&self, client: &Client, request: TransportRequest) -> Result<Response, TransportError> {
        let api_key = self.config.api_key()?;

        let mut builder = client
            .request(request.method.clone(), self.url(&request.path))
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, request.accept.unwrap_or("application/json"));

        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Network(format!(
                    "request timed out after {}s",
                    self.config.timeout.as_secs()
                ))
            } else if e.is_connect() {
                TransportError::Network(format!("Connection failed: {}", e))
            } else {
                TransportError::Network(e.to_string())
            }
        })
    }

    /// Performs a buffered call.
    pub async fn call(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let method = request.method.clone();
        let path = request.path.clone();
        let response = self.send(&self.client, request).await?;
        let status = response.status();

        let payload = read_payload(response).await;

        if !status.is_success() {
            let payload = payload.unwrap_or_else(|e| Payload::Text(e.to_string()));
            tracing::warn!(%method, %path, status = status.as_u16(), "upstream call failed");
            return Err(TransportError::Upstream {
                status: status.as_u16(),
                payload: payload.into_json(),
            });
        }

        tracing::debug!(%method, %path, status = status.as_u16(), "upstream call succeeded");
        Ok(TransportResponse {
            status: status.as_u16(),
            payload: payload?,
        })
    }

    /// Performs a streaming call, returning the raw body stream.
    ///
    /// Fails before returning on a non-2xx status or an empty body, reading
    /// the error payload eagerly.
    pub async fn call_stream(&self, request: TransportRequest) -> Result<TransportStream, TransportError> {
        let path = request.path.clone();
        let response = self.send(&self.stream_client, request).await?;
        let status = response.status();

        if !status.is_success() {
            let payload = read_payload(response)
                .await
                .unwrap_or_else(|e| Payload::Text(e.to_string()));
            tracing::warn!(%path, status = status.as_u16(), "upstream stream request failed");
            return Err(TransportError::Upstream {
                status: status.as_u16(),
                payload: payload.into_json(),
            });
        }

        if response.content_length() == Some(0) {
            return Err(TransportError::MissingBody {
                status: status.as_u16(),
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Network(format!("Stream error: {}", e))));

        Ok(Box::pin(stream))
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

/// Reads the body as JSON when declared as such, otherwise as text.
async fn read_payload(response: Response) -> Result<Payload, TransportError> {
    let json = is_json(&response);
    let text = response
        .text()
        .await
        .map_err(|e| TransportError::Network(format!("failed to read response body: {}", e)))?;

    if !json {
        return Ok(Payload::Text(text));
    }
    if text.trim().is_empty() {
        return Ok(Payload::Json(Value::Null));
    }
    serde_json::from_str(&text)
        .map(Payload::Json)
        .map_err(|e| TransportError::Parse(format!("invalid JSON body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::new(OpenAIConfig::new("sk-test").with_base_url(server.uri())).unwrap()
    }

    #[test]
    fn config_builder_works() {
        let config = OpenAIConfig::new("test-key")
            .with_model("gpt-4o")
            .with_base_url("https://custom.api.com/")
            .with_timeout(Duration::from_secs(30))
            .with_background(false);

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.base_url, "https://custom.api.com");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.background);
        assert_eq!(config.api_key().unwrap(), "test-key");
    }

    #[test]
    fn blank_key_counts_as_missing() {
        assert!(!OpenAIConfig::new("  ").has_api_key());
        assert!(!OpenAIConfig::without_key().has_api_key());
    }

    #[test]
    fn debug_output_redacts_key() {
        let rendered = format!("{:?}", OpenAIConfig::new("sk-very-secret"));
        assert!(!rendered.contains("sk-very-secret"));
    }

    #[tokio::test]
    async fn call_attaches_bearer_and_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({"x": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "conv_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let response = transport(&server)
            .call(TransportRequest::post("/conversations", json!({"x": 1})))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.payload, Payload::Json(json!({"id": "conv_1"})));
    }

    #[tokio::test]
    async fn call_returns_text_for_non_json_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let response = transport(&server)
            .call(TransportRequest::get("/plain"))
            .await
            .unwrap();

        assert_eq!(response.payload, Payload::Text("hello".to_string()));
    }

    #[tokio::test]
    async fn call_normalizes_error_status_with_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations/stale"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"error": {"message": "Conversation not found"}})),
            )
            .mount(&server)
            .await;

        let err = transport(&server)
            .call(TransportRequest::get("/conversations/stale"))
            .await
            .unwrap_err();

        match err {
            TransportError::Upstream { status, payload } => {
                assert_eq!(status, 404);
                assert_eq!(payload["error"]["message"], "Conversation not found");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_keeps_text_error_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = transport(&server)
            .call(TransportRequest::get("/boom"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Upstream { status: 502, ref payload } if payload == &json!("bad gateway")
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_every_call_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            OpenAIConfig::without_key().with_base_url(server.uri()),
        )
        .unwrap();

        for _ in 0..2 {
            let err = transport.call(TransportRequest::get("/x")).await.unwrap_err();
            assert!(matches!(err, TransportError::MissingCredential));
        }
        let err = transport
            .call_stream(TransportRequest::get("/x"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::MissingCredential));
    }

    #[tokio::test]
    async fn call_stream_yields_raw_bytes() {
        let server = MockServer::start().await;
        let body = "event: response.output_text.delta\ndata: {\"delta\":\"Hi\"}\n\n";
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = transport(&server)
            .call_stream(
                TransportRequest::post("/responses", json!({"stream": true}))
                    .with_accept("text/event-stream"),
            )
            .await
            .unwrap();

        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(joined, body.as_bytes());
    }

    #[tokio::test]
    async fn call_stream_fails_fast_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "slow"}})),
            )
            .mount(&server)
            .await;

        let err = transport(&server)
            .call_stream(TransportRequest::post("/responses", json!({})))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, TransportError::Upstream { status: 429, .. }));
    }

    #[tokio::test]
    async fn call_stream_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = transport(&server)
            .call_stream(TransportRequest::post("/responses", json!({})))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, TransportError::MissingBody { status: 200 }));
    }

    #[test]
    fn transport_errors_map_to_api_errors() {
        let api: ApiError = TransportError::MissingCredential.into();
        assert!(matches!(api, ApiError::Configuration(_)));

        let api: ApiError = TransportError::Upstream {
            status: 404,
            payload: json!({}),
        }
        .into();
        assert!(api.is_not_found());
    }
}

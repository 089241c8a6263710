//! The AI provider boundary.
//!
//! The orchestrator only sees [`ProviderAdapter`]. Production uses
//! [`HttpProviderAdapter`], an OpenAI-style chat-completions client; tests
//! substitute `ScriptedProvider`.

use std::time::Duration;

use async_trait::async_trait;
use relaygate_store::TaskKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{ControlError, Result};
use crate::payload;

/// A successful provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    /// Tokens billed for the prompt.
    pub prompt_tokens: u64,
    /// Tokens billed for the completion.
    pub completion_tokens: u64,
    /// Structured result stored on the task.
    pub output: Value,
}

/// Typed provider failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with an error status.
    #[error("upstream returned {status}: {message}")]
    Upstream {
        /// HTTP status.
        status: u16,
        /// Error text from the body, or the status reason.
        message: String,
        /// Whether the status is worth retrying (429 and 5xx).
        retryable: bool,
    },

    /// The call exceeded its per-request timeout.
    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),

    /// The provider could not be reached.
    #[error("provider unreachable: {0}")]
    Unavailable(String),

    /// The provider answered with data that does not fit the contract.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Returns true for failures that a later attempt may not repeat.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Upstream { retryable, .. } => *retryable,
            Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Trait for calling the AI provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Run one task against the provider.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] describing why no usable result came back.
    async fn invoke(
        &self,
        kind: TaskKind,
        payload: &Value,
    ) -> std::result::Result<ProviderResponse, ProviderError>;
}

/// Connection settings for the chat-completions provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Bearer key, if the provider needs one.
    pub api_key: Option<String>,
    /// Model name.
    pub model: String,
    /// Per-request timeout in seconds.
    pub request_timeout_seconds: u64,
    /// Completion size used when the payload does not set `max_tokens`.
    pub default_max_tokens: u64,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            request_timeout_seconds: 60,
            default_max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<payload::ChatMessage>,
    max_tokens: u64,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Sentiment {
    sentiment: String,
    score: f64,
}

/// HTTP client for an OpenAI-compatible chat-completions API.
#[derive(Debug, Clone)]
pub struct HttpProviderAdapter {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpProviderAdapter {
    /// Create an adapter from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Internal` if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ControlError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn map_transport(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(Duration::from_secs(self.config.request_timeout_seconds))
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }

    fn shape_output(kind: TaskKind, text: &str) -> std::result::Result<Value, ProviderError> {
        match kind {
            TaskKind::ContentGeneration => Ok(serde_json::json!({ "content": text.trim() })),
            TaskKind::Optimization => Ok(serde_json::json!({ "suggestions": text.trim() })),
            TaskKind::SentimentAnalysis => {
                let parsed: Sentiment = serde_json::from_str(text.trim()).map_err(|e| {
                    ProviderError::InvalidResponse(format!("sentiment is not JSON: {e}"))
                })?;
                if !matches!(parsed.sentiment.as_str(), "positive" | "neutral" | "negative") {
                    return Err(ProviderError::InvalidResponse(format!(
                        "unknown sentiment label `{}`",
                        parsed.sentiment
                    )));
                }
                if !(-1.0..=1.0).contains(&parsed.score) {
                    return Err(ProviderError::InvalidResponse(format!(
                        "sentiment score {} outside [-1, 1]",
                        parsed.score
                    )));
                }
                Ok(serde_json::json!({ "sentiment": parsed.sentiment, "score": parsed.score }))
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    async fn invoke(
        &self,
        kind: TaskKind,
        payload: &Value,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.config.model,
            messages: payload::messages(kind, payload),
            max_tokens: payload::requested_max_tokens(payload)
                .unwrap_or(self.config.default_max_tokens),
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| status.to_string());
            let retryable =
                status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;

            tracing::warn!(status = %status, kind = %kind, error = %message, "Provider returned error");
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                message,
                retryable,
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_transport(&e)
            } else {
                ProviderError::InvalidResponse(e.to_string())
            }
        })?;

        let usage = body
            .usage
            .ok_or_else(|| ProviderError::InvalidResponse("missing usage block".to_string()))?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no completion text".to_string()))?;

        Ok(ProviderResponse {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            output: Self::shape_output(kind, &text)?,
        })
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedProvider;

#[cfg(any(test, feature = "test-utils"))]
mod scripted {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relaygate_store::TaskKind;
    use serde_json::Value;

    use super::{ProviderAdapter, ProviderError, ProviderResponse};

    struct Step {
        delay: Duration,
        outcome: Option<Result<ProviderResponse, ProviderError>>,
    }

    /// Provider double that replays queued outcomes in order.
    ///
    /// When the queue is empty every call succeeds with the fallback response.
    pub struct ScriptedProvider {
        steps: Mutex<VecDeque<Step>>,
        fallback: ProviderResponse,
        calls: AtomicUsize,
    }

    impl Default for ScriptedProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ScriptedProvider {
        /// A provider that answers 1000 prompt and 500 completion tokens.
        #[must_use]
        pub fn new() -> Self {
            Self {
                steps: Mutex::new(VecDeque::new()),
                fallback: ProviderResponse {
                    prompt_tokens: 1000,
                    completion_tokens: 500,
                    output: serde_json::json!({ "content": "scripted" }),
                },
                calls: AtomicUsize::new(0),
            }
        }

        /// Queue a successful response.
        pub fn push_ok(&self, response: ProviderResponse) {
            self.push_after(Duration::ZERO, Ok(response));
        }

        /// Queue a failure.
        pub fn push_err(&self, error: ProviderError) {
            self.push_after(Duration::ZERO, Err(error));
        }

        /// Queue an outcome delivered after `delay`.
        pub fn push_after(
            &self,
            delay: Duration,
            outcome: Result<ProviderResponse, ProviderError>,
        ) {
            self.steps.lock().push_back(Step {
                delay,
                outcome: Some(outcome),
            });
        }

        /// Queue a call that never returns.
        pub fn push_hang(&self) {
            self.steps.lock().push_back(Step {
                delay: Duration::ZERO,
                outcome: None,
            });
        }

        /// Number of calls made so far.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedProvider {
        async fn invoke(
            &self,
            _kind: TaskKind,
            _payload: &Value,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().pop_front();
            let Some(step) = step else {
                return Ok(self.fallback.clone());
            };

            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }
            match step.outcome {
                Some(outcome) => outcome,
                None => std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> HttpProviderAdapter {
        HttpProviderAdapter::new(ProviderConfig {
            base_url: server.uri(),
            api_key: Some("sk-test".to_string()),
            request_timeout_seconds: 1,
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    fn completion(content: &str) -> Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200 }
        })
    }

    #[tokio::test]
    async fn maps_completion_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Big news!")))
            .mount(&server)
            .await;

        let response = adapter(&server)
            .invoke(TaskKind::ContentGeneration, &json!({ "prompt": "launch" }))
            .await
            .unwrap();

        assert_eq!(response.prompt_tokens, 120);
        assert_eq!(response.completion_tokens, 80);
        assert_eq!(response.output, json!({ "content": "Big news!" }));
    }

    #[tokio::test]
    async fn parses_sentiment_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"sentiment": "positive", "score": 0.8}"#,
            )))
            .mount(&server)
            .await;

        let response = adapter(&server)
            .invoke(TaskKind::SentimentAnalysis, &json!({ "text": "love it" }))
            .await
            .unwrap();
        assert_eq!(response.output["sentiment"], "positive");
    }

    #[tokio::test]
    async fn free_text_sentiment_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Positive!")))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .invoke(TaskKind::SentimentAnalysis, &json!({ "text": "love it" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn missing_usage_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "hi" } }]
            })))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .invoke(TaskKind::Optimization, &json!({ "content": "post" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": { "message": "overloaded" }
            })))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .invoke(TaskKind::ContentGeneration, &json!({ "prompt": "x" }))
            .await
            .unwrap_err();
        match &err {
            ProviderError::Upstream {
                status, message, ..
            } => {
                assert_eq!(*status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn client_errors_are_final() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .invoke(TaskKind::ContentGeneration, &json!({ "prompt": "x" }))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn rate_limited_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .invoke(TaskKind::ContentGeneration, &json!({ "prompt": "x" }))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = adapter(&server)
            .invoke(TaskKind::ContentGeneration, &json!({ "prompt": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::new();
        provider.push_err(ProviderError::Unavailable("down".into()));

        let payload = json!({ "prompt": "x" });
        assert!(provider
            .invoke(TaskKind::ContentGeneration, &payload)
            .await
            .is_err());
        let ok = provider
            .invoke(TaskKind::ContentGeneration, &payload)
            .await
            .unwrap();
        assert_eq!(ok.prompt_tokens, 1000);
        assert_eq!(provider.calls(), 2);
    }
}

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmSettings;

/// Failure of a single chat-completion call. The call either yields text or one of these.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("OPENROUTER_API_KEY is not configured and no API key was supplied with the request")]
    MissingApiKey,
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request to OpenRouter timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("request to OpenRouter failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("openrouter call failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected OpenRouter response payload: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout(err)
        } else {
            GenerationError::Transport(err)
        }
    }
}

/// Defines the shape of a chat-style interaction with an LLM.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Per-request key; takes precedence over the configured default.
    pub api_key: Option<String>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
            api_key: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        self
    }
}

/// Individual chat message, compatible with OpenAI compliant providers.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[serde(rename = "content")]
    pub text: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Supported chat roles passed to providers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// Captures basic token usage metrics associated with a call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
}

/// Full response surface returned to callers.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub token_usage: TokenUsage,
    pub model: String,
}

/// Main entry point for invoking OpenRouter.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(GenerationError::ClientBuild)?;

        Ok(Self { http, settings })
    }

    pub fn default_model(&self) -> &str {
        &self.settings.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url)
    }

    /// Execute a chat completion and return the first choice's content, trimmed.
    pub async fn execute(&self, request: LlmRequest) -> Result<LlmResponse, GenerationError> {
        let api_key = request
            .api_key
            .as_deref()
            .or(self.settings.api_key.as_deref())
            .ok_or(GenerationError::MissingApiKey)?;

        let payload = ChatCompletionPayload {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut req_builder = self
            .http
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&payload);

        if let Some(referer) = &self.settings.http_referer {
            req_builder = req_builder.header("HTTP-Referer", referer);
        }

        if let Some(title) = &self.settings.x_title {
            req_builder = req_builder.header("X-Title", title);
        }

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            key_override = request.api_key.is_some(),
            "sending chat completion request"
        );

        let response = req_builder.send().await?;
        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(GenerationError::Status {
                status,
                body: preview(&response_text),
            });
        }

        let body: ChatCompletionResponse = serde_json::from_str(&response_text).map_err(|err| {
            GenerationError::MalformedResponse(format!(
                "{err}. Response body: {}",
                preview(&response_text)
            ))
        })?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationError::MalformedResponse(format!(
                    "missing choices[0].message.content. Response body: {}",
                    preview(&response_text)
                ))
            })?
            .trim()
            .to_string();

        let prompt_tokens = approximate_token_count(
            &request
                .messages
                .iter()
                .map(|m| m.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let token_usage = match body.usage {
            Some(usage) => TokenUsage {
                prompt_tokens: usage.prompt_tokens.unwrap_or(prompt_tokens),
                response_tokens: usage
                    .completion_tokens
                    .unwrap_or_else(|| approximate_token_count(&text)),
            },
            None => TokenUsage {
                prompt_tokens,
                response_tokens: approximate_token_count(&text),
            },
        };

        Ok(LlmResponse {
            text,
            token_usage,
            model: request.model,
        })
    }
}

fn preview(body: &str) -> String {
    const LIMIT: usize = 500;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

fn approximate_token_count(input: &str) -> usize {
    input.split_whitespace().count()
}

#[derive(Serialize)]
struct ChatCompletionPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;

    use super::test_support::*;
    use super::*;

    fn request() -> LlmRequest {
        LlmRequest::new(
            "anthropic/claude-3.5-sonnet",
            vec![
                ChatMessage::new(MessageRole::System, "system"),
                ChatMessage::new(MessageRole::User, "user"),
            ],
        )
        .with_max_tokens(1500)
        .with_temperature(0.7)
    }

    #[tokio::test]
    async fn returns_trimmed_content_and_sends_expected_payload() {
        let (url, captured) =
            spawn_completion_server(MockReply::Json(completion_body("  A review.\n"))).await;
        let client = LlmClient::new(settings_for(&url, Some("sk-default"))).unwrap();

        let response = client.execute(request()).await.expect("completion");
        assert_eq!(response.text, "A review.");
        assert_eq!(response.token_usage.prompt_tokens, 12);
        assert_eq!(response.token_usage.response_tokens, 3);

        let seen = captured.lock().unwrap();
        let (auth, body) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-default"));
        assert_eq!(body["model"], "anthropic/claude-3.5-sonnet");
        assert_eq!(body["max_tokens"], 1500);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
    }

    #[tokio::test]
    async fn request_key_overrides_configured_default() {
        let (url, captured) =
            spawn_completion_server(MockReply::Json(completion_body("ok"))).await;
        let client = LlmClient::new(settings_for(&url, Some("sk-default"))).unwrap();

        client
            .execute(request().with_api_key(Some("sk-user".into())))
            .await
            .unwrap();

        let seen = captured.lock().unwrap();
        assert_eq!(seen[0].0.as_deref(), Some("Bearer sk-user"));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let (url, captured) =
            spawn_completion_server(MockReply::Json(completion_body("ok"))).await;
        let client = LlmClient::new(settings_for(&url, None)).unwrap();

        let err = client
            .execute(request().with_api_key(Some("   ".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingApiKey));
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_error_status_is_reported() {
        let (url, _) = spawn_completion_server(MockReply::Status(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream exploded",
        ))
        .await;
        let client = LlmClient::new(settings_for(&url, Some("sk"))).unwrap();

        let err = client.execute(request()).await.unwrap_err();
        match err {
            GenerationError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let (url, _) =
            spawn_completion_server(MockReply::Delay(Duration::from_secs(5))).await;
        let mut settings = settings_for(&url, Some("sk"));
        settings.timeout = Duration::from_millis(200);
        let client = LlmClient::new(settings).unwrap();

        let err = client.execute(request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let (url, _) = spawn_completion_server(MockReply::Json(
            serde_json::json!({ "choices": [] }),
        ))
        .await;
        let client = LlmClient::new(settings_for(&url, Some("sk"))).unwrap();

        let err = client.execute(request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));
    }

    #[test]
    fn preview_truncates_long_bodies_on_char_boundary() {
        let body = "ğ".repeat(600);
        let shortened = preview(&body);
        assert!(shortened.ends_with("..."));
        assert_eq!(shortened.chars().count(), 503);
    }
}

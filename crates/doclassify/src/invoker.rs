//! Builds the Messages API request for a document and captures the raw
//! model reply.

use std::sync::Arc;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::{ApiConfig, ClassificationPrompt};
use crate::error::{ApiError, ConfigError};

const JSON_ONLY_INSTRUCTION: &str = "Respond with ONLY a valid JSON object. Do not wrap it in \
markdown code fences and do not add any text before or after it.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl MessagesResponse {
    /// Concatenated text of all `text` blocks, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect()
    }
}

/// Transport to the model. Implemented over HTTP in production and by
/// in-memory fakes in tests.
pub trait ModelClient: Send + Sync {
    fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse, ApiError>;
}

pub struct AnthropicClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_version: String,
    api_key: SecretString,
}

impl AnthropicClient {
    pub fn new(
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_version: api_version.into(),
            api_key,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.resolve()?;
        Self::new(
            config.base_url.clone(),
            config.api_version.clone(),
            api_key,
            config.timeout(),
        )
    }
}

impl ModelClient for AnthropicClient {
    fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse, ApiError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", self.api_version.as_str())
            .json(request)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().map_err(transport_error)?;

        if !status.is_success() {
            return Err(ApiError::from_status(
                status.as_u16(),
                error_message(&body),
                retry_after,
            ));
        }

        serde_json::from_str(&body).map_err(|e| ApiError::InvalidRequest {
            status: Some(status.as_u16()),
            message: format!("unexpected response body: {}", e),
        })
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

/// `error.message` from an API error body, else the start of the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Request settings that are the same for every document in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    pub model: String,
    pub max_tokens: u32,
    pub max_content_chars: usize,
    pub json_only: bool,
    pub system_prompt: Option<String>,
}

impl From<&ApiConfig> for InvokeOptions {
    fn from(config: &ApiConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_content_chars: config.max_content_chars,
            json_only: config.json_only,
            system_prompt: config.system_prompt.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawModelResponse {
    pub text: String,
    pub model: String,
    pub usage: Usage,
    pub latency: Duration,
    pub truncated: bool,
}

pub struct PromptInvoker {
    client: Arc<dyn ModelClient>,
    options: InvokeOptions,
}

impl PromptInvoker {
    pub fn new(client: Arc<dyn ModelClient>, options: InvokeOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &InvokeOptions {
        &self.options
    }

    /// Assembles the request without sending it.
    pub fn build_request(
        &self,
        prompt: &ClassificationPrompt,
        file_name: &str,
        content: &str,
    ) -> (MessagesRequest, bool) {
        let (content, truncated) = truncate_content(content, self.options.max_content_chars);

        let mut user_message = format!(
            "{}\n\nFile name: {}\n\nDocument content:\n<document>\n{}\n</document>",
            prompt.body, file_name, content
        );
        if self.options.json_only {
            user_message.push_str("\n\n");
            user_message.push_str(JSON_ONLY_INSTRUCTION);
        }

        let request = MessagesRequest {
            model: self.options.model.clone(),
            max_tokens: self.options.max_tokens,
            temperature: 0.0,
            system: self.options.system_prompt.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message,
            }],
        };
        (request, truncated)
    }

    /// One LLM call. Retries are the caller's business.
    pub fn classify(
        &self,
        prompt: &ClassificationPrompt,
        file_name: &str,
        content: &str,
    ) -> Result<RawModelResponse, ApiError> {
        let (request, truncated) = self.build_request(prompt, file_name, content);

        let started = Instant::now();
        let response = self.client.send(&request)?;
        let latency = started.elapsed();

        let text = response.text();
        if text.trim().is_empty() {
            return Err(ApiError::InvalidRequest {
                status: None,
                message: format!(
                    "response contained no text (stop_reason: {})",
                    response.stop_reason.as_deref().unwrap_or("unknown")
                ),
            });
        }

        tracing::info!(
            prompt = %prompt.name,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            latency_ms = latency.as_millis() as u64,
            truncated,
            "LLM call complete"
        );

        Ok(RawModelResponse {
            text,
            model: response.model.unwrap_or_else(|| request.model.clone()),
            usage: response.usage,
            latency,
            truncated,
        })
    }
}

/// Keeps the first `max_chars` characters (never splitting a UTF-8
/// sequence) and appends a marker when anything was cut.
pub fn truncate_content(content: &str, max_chars: usize) -> (std::borrow::Cow<'_, str>, bool) {
    match content.char_indices().nth(max_chars) {
        None => (std::borrow::Cow::Borrowed(content), false),
        Some((byte_index, _)) => {
            let total = content.chars().count();
            let truncated = format!(
                "{}\n\n[Content truncated: showing the first {} of {} characters]",
                &content[..byte_index],
                max_chars,
                total
            );
            (std::borrow::Cow::Owned(truncated), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptCatalog;
    use std::sync::Mutex;

    struct RecordingClient {
        reply: Result<MessagesResponse, ApiError>,
        seen: Mutex<Vec<MessagesRequest>>,
    }

    impl RecordingClient {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(MessagesResponse {
                    model: Some("claude-test".to_string()),
                    content: vec![ContentBlock {
                        kind: "text".to_string(),
                        text: Some(text.to_string()),
                    }],
                    stop_reason: Some("end_turn".to_string()),
                    usage: Usage {
                        input_tokens: 120,
                        output_tokens: 40,
                    },
                }),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ModelClient for RecordingClient {
        fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse, ApiError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn options() -> InvokeOptions {
        InvokeOptions::from(&ApiConfig::default())
    }

    fn prompt() -> ClassificationPrompt {
        PromptCatalog::builtin().default_prompt().clone()
    }

    #[test]
    fn test_truncate_short_content_untouched() {
        let (text, truncated) = truncate_content("short", 10);
        assert_eq!(text, "short");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let content = "ééééé";
        let (text, truncated) = truncate_content(content, 3);
        assert!(truncated);
        assert!(text.starts_with("ééé\n\n[Content truncated"));
        assert!(text.contains("first 3 of 5 characters"));
    }

    #[test]
    fn test_truncate_exact_length_is_not_truncated() {
        let (_, truncated) = truncate_content("abcd", 4);
        assert!(!truncated);
    }

    #[test]
    fn test_request_shape() {
        let client = Arc::new(RecordingClient::replying("{}"));
        let invoker = PromptInvoker::new(client.clone(), options());

        let raw = invoker.classify(&prompt(), "notes.txt", "hello").unwrap();
        assert_eq!(raw.text, "{}");
        assert_eq!(raw.model, "claude-test");
        assert_eq!(raw.usage.input_tokens, 120);

        let seen = client.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
        assert!(request.messages[0].content.contains("File name: notes.txt"));
        assert!(request.messages[0].content.contains("hello"));
        assert!(!request.messages[0].content.contains(JSON_ONLY_INSTRUCTION));

        let body = serde_json::to_value(request).unwrap();
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_json_only_and_system_prompt() {
        let client = Arc::new(RecordingClient::replying("{}"));
        let mut opts = options();
        opts.json_only = true;
        opts.system_prompt = Some("You classify documents.".to_string());
        let invoker = PromptInvoker::new(client, opts);

        let (request, _) = invoker.build_request(&prompt(), "a.md", "x");
        assert!(request.messages[0].content.ends_with(JSON_ONLY_INSTRUCTION));
        assert_eq!(request.system.as_deref(), Some("You classify documents."));
    }

    #[test]
    fn test_long_content_is_truncated_in_request() {
        let mut opts = options();
        opts.max_content_chars = 10;
        let invoker = PromptInvoker::new(Arc::new(RecordingClient::replying("{}")), opts);

        let content = "x".repeat(50);
        let (request, truncated) = invoker.build_request(&prompt(), "big.txt", &content);
        assert!(truncated);
        assert!(!request.messages[0].content.contains(&"x".repeat(11)));
    }

    #[test]
    fn test_empty_reply_is_invalid() {
        let invoker = PromptInvoker::new(Arc::new(RecordingClient::replying("  ")), options());
        let result = invoker.classify(&prompt(), "a.txt", "x");
        assert!(matches!(result, Err(ApiError::InvalidRequest { status: None, .. })));
    }

    #[test]
    fn test_api_error_passes_through() {
        let client = RecordingClient {
            reply: Err(ApiError::AuthFailed("invalid x-api-key".to_string())),
            seen: Mutex::new(Vec::new()),
        };
        let invoker = PromptInvoker::new(Arc::new(client), options());
        let result = invoker.classify(&prompt(), "a.txt", "x");
        assert!(matches!(result, Err(ApiError::AuthFailed(_))));
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"Number of requests has exceeded your rate limit"}}"#;
        assert_eq!(
            error_message(body),
            "Number of requests has exceeded your rate limit"
        );
        assert_eq!(error_message("<html>Bad Gateway</html>"), "<html>Bad Gateway</html>");
    }

    #[test]
    fn test_response_text_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"tool_use"},{"type":"text","text":"1}"}],"usage":{"input_tokens":3,"output_tokens":2}}"#,
        )
        .unwrap();
        assert_eq!(response.text(), r#"{"a":1}"#);
        assert_eq!(response.usage.output_tokens, 2);
    }
}

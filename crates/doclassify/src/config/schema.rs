use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::prompts::OutputSchema;
use crate::retry::RetryPolicy;
use crate::secrets::SecretSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_reports_directory")]
    pub reports_directory: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            reports_directory: default_reports_directory(),
            api: ApiConfig::default(),
            extraction: ExtractionConfig::default(),
            batch: BatchConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

impl Config {
    /// Configured database path, falling back to `~/.doclassify/data/doclassify.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(crate::secrets::expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }

    pub fn reports_directory(&self) -> PathBuf {
        PathBuf::from(crate::secrets::expand_home(&self.reports_directory))
    }
}

fn default_reports_directory() -> String {
    "reports".to_string()
}

/// Messages API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Content is truncated to this many characters before the request is built.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// Appends an explicit "emit only JSON" instruction to every request.
    #[serde(default)]
    pub json_only: bool,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_api_key")]
    pub api_key: SecretSource,
}

fn default_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_model() -> String {
    "claude-3-7-sonnet-20250219".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_content_chars() -> usize {
    16_000
}

fn default_api_key() -> SecretSource {
    SecretSource::from_env("ANTHROPIC_API_KEY")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_content_chars: default_max_content_chars(),
            json_only: false,
            system_prompt: None,
            api_key: default_api_key(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Content extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Remote downloads carry their own, shorter timeout than LLM calls.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_drive_api_url")]
    pub drive_api_url: String,
    #[serde(default = "default_drive_token")]
    pub drive_token: SecretSource,
}

fn default_download_timeout_secs() -> u64 {
    15
}

fn default_drive_api_url() -> String {
    "https://www.googleapis.com/drive/v3/files".to_string()
}

fn default_drive_token() -> SecretSource {
    SecretSource::from_env("GOOGLE_DRIVE_TOKEN")
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: default_download_timeout_secs(),
            drive_api_url: default_drive_api_url(),
            drive_token: default_drive_token(),
        }
    }
}

impl ExtractionConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Batch concurrency and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retries of the LLM call per document after the first attempt.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_batch_size() -> usize {
    5
}

fn default_retry_count() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retry_count: default_retry_count(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl BatchConfig {
    /// Policy for the per-document LLM call: one attempt plus `retry_count` retries.
    pub fn document_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_count + 1,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_multiplier,
        )
    }
}

/// Prompt catalog overrides. Built-in prompts and mappings apply unless replaced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_prompt_name")]
    pub default_prompt: String,
    #[serde(default = "default_transcript_prompt_name")]
    pub transcript_prompt: String,
    /// Extra or replacement MIME mappings, applied over the built-in table.
    #[serde(default)]
    pub mappings: Vec<PromptMapping>,
    /// Extra or replacement templates, keyed by name.
    #[serde(default)]
    pub templates: Vec<PromptTemplateConfig>,
}

pub(crate) fn default_prompt_name() -> String {
    "document-classification-prompt-new".to_string()
}

pub(crate) fn default_transcript_prompt_name() -> String {
    "transcript-classification-prompt".to_string()
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            default_prompt: default_prompt_name(),
            transcript_prompt: default_transcript_prompt_name(),
            mappings: Vec::new(),
            templates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMapping {
    pub mime_type: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplateConfig {
    pub name: String,
    pub body: String,
    #[serde(default)]
    pub schema: OutputSchema,
}

use std::path::{Path, PathBuf};

use crate::config::prompts::PromptCatalog;
use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Loads and validates a config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads `path` if given, else `~/.doclassify/config.json` if it exists, else defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }
    match default_config_path() {
        Some(default_path) if default_path.exists() => load_config(default_path),
        _ => Ok(Config::default()),
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".doclassify").join("config.json"))
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.batch.batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "batch.batch_size must be greater than zero".to_string(),
        });
    }

    if config.batch.backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation {
            message: format!(
                "batch.backoff_multiplier must be >= 1.0, got {}",
                config.batch.backoff_multiplier
            ),
        });
    }

    if config.api.max_content_chars == 0 {
        return Err(ConfigError::Validation {
            message: "api.max_content_chars must be greater than zero".to_string(),
        });
    }

    if config.api.timeout_secs < 30 {
        tracing::warn!(
            timeout_secs = config.api.timeout_secs,
            "LLM timeout below 30s; large documents may time out"
        );
    }

    // Surfaces unknown prompt references at load time rather than mid-batch.
    PromptCatalog::from_config(&config.prompts)?;

    Ok(())
}

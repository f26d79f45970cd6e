//! Secret resolution for API credentials.
//!
//! Credentials (the Messages API key, the Drive export token) are configured
//! as a [`SecretSource`] and resolved in priority order:
//!
//! 1. **Direct value** - quick local testing (`"value": "sk-..."`)
//! 2. **File reference** - mounted secrets (`"file": "/run/secrets/anthropic"`)
//! 3. **Env var reference** - the usual production path (`"env": "ANTHROPIC_API_KEY"`)

use std::fs;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: value, file, or env)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where a credential comes from. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl SecretSource {
    pub fn from_env(name: &str) -> Self {
        Self {
            env: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        has_secret_source(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env.as_deref(),
        )
    }

    pub fn resolve(&self) -> Result<SecretString> {
        resolve_secret(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env.as_deref(),
        )
    }

    pub fn resolve_optional(&self) -> Result<Option<SecretString>> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NoSourceProvided) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Resolves a secret from direct value, then file contents, then env var.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return fs::read_to_string(&expanded)
            .map(|content| SecretString::from(content.trim().to_string()))
            .map_err(|e| SecretError::FileReadError {
                path: expanded,
                source: e,
            });
    }

    if let Some(var_name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(var_name) {
            // Env vars may carry trailing newlines.
            Ok(value) => Ok(SecretString::from(value.trim())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: var_name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: var_name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

pub fn has_secret_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    direct.is_some_and(|s| !s.is_empty())
        || file_path.is_some_and(|s| !s.is_empty())
        || env_var.is_some_and(|s| !s.is_empty())
}

/// Expands `~` and `~/path`. `~user/path` is not supported.
pub(crate) fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_direct_value_takes_priority() {
        let secret = resolve_secret(Some("direct"), Some("/nonexistent"), Some("NOPE")).unwrap();
        assert_eq!(secret.expose_secret(), "direct");
    }

    #[test]
    fn test_file_takes_priority_over_env() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  from-file  ").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let secret = resolve_secret(None, Some(&path), Some("DOCLASSIFY_TEST_UNSET")).unwrap();
        assert_eq!(secret.expose_secret(), "from-file");
    }

    #[test]
    fn test_missing_env_var() {
        let source = SecretSource::from_env("DOCLASSIFY_TEST_DEFINITELY_UNSET_VAR");
        assert!(source.is_configured());
        assert!(matches!(
            source.resolve(),
            Err(SecretError::EnvVarNotSet { .. })
        ));
    }

    #[test]
    fn test_empty_source_is_optional() {
        let source = SecretSource {
            value: Some(String::new()),
            ..SecretSource::default()
        };
        assert!(!source.is_configured());
        assert!(source.resolve_optional().unwrap().is_none());
        assert!(matches!(
            source.resolve(),
            Err(SecretError::NoSourceProvided)
        ));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), "/abs/path");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~"), home.to_string_lossy());
            assert!(expand_home("~/x").ends_with("/x"));
        }
    }
}

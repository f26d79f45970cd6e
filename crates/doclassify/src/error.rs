use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Mapping for '{mime_type}' references unknown prompt '{prompt}'")]
    UnknownPrompt { mime_type: String, prompt: String },

    #[error("Failed to resolve secret: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt file '{path}': {reason}")]
    CorruptFile { path: String, reason: String },

    #[error("Download failed for '{location}': {reason}")]
    DownloadFailed { location: String, reason: String },

    #[error("Source file missing: {0}")]
    SourceMissing(String),
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ExtractionError::CorruptFile { .. } => ErrorKind::CorruptFile,
            ExtractionError::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            ExtractionError::SourceMissing(_) => ErrorKind::SourceMissing,
        }
    }

    /// The document is gone at its source and should be flagged deleted.
    pub fn is_source_missing(&self) -> bool {
        matches!(self, ExtractionError::SourceMissing(_))
    }

    pub(crate) fn corrupt(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ExtractionError::CorruptFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Upstream server error ({status}): {message}")]
    UpstreamServerError { status: u16, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest {
        status: Option<u16>,
        message: String,
    },
}

impl ApiError {
    /// Maps an HTTP status and the upstream `error.message` to an error kind.
    pub fn from_status(status: u16, message: String, retry_after_secs: Option<u64>) -> Self {
        match status {
            401 | 403 => ApiError::AuthFailed(message),
            408 => ApiError::Timeout(message),
            429 => ApiError::RateLimited {
                message,
                retry_after_secs,
            },
            // 529 is the upstream "overloaded" status.
            500..=599 => ApiError::UpstreamServerError { status, message },
            _ => ApiError::InvalidRequest {
                status: Some(status),
                message,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_)
                | ApiError::RateLimited { .. }
                | ApiError::Timeout(_)
                | ApiError::UpstreamServerError { .. }
        )
    }

    /// How long the server asked us to wait before retrying.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            ApiError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(std::time::Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Fatal errors abort the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::AuthFailed(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::AuthFailed(_) => ErrorKind::AuthFailed,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::UpstreamServerError { .. } => ErrorKind::UpstreamServerError,
            ApiError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed JSON in model response: {raw_snippet}")]
    MalformedJson { raw_snippet: String },

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::MalformedJson { .. } => ErrorKind::MalformedJson,
            ParseError::InvalidFieldValue { .. } => ErrorKind::InvalidFieldValue,
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ParseError::InvalidFieldValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Permanent storage failure: {0}")]
    Permanent(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Transient(_) => ErrorKind::StorageTransient,
            StorageError::Permanent(_) => ErrorKind::StoragePermanent,
        }
    }
}

impl From<crate::db::DatabaseError> for StorageError {
    fn from(err: crate::db::DatabaseError) -> Self {
        if err.is_transient() {
            StorageError::Transient(err.to_string())
        } else {
            StorageError::Permanent(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch {0} is already complete")]
    AlreadyComplete(String),

    #[error("Batch {id} has {terminal} of {total} documents terminal")]
    Incomplete { id: String, terminal: u64, total: u64 },

    #[error("Batch {id} received more outcomes than the {total} documents requested")]
    Overfilled { id: String, total: u64 },

    #[error("Batch record: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("Failed to write report '{path}': {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan directory '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Terminal error label recorded per failed document in batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    CorruptFile,
    DownloadFailed,
    SourceMissing,
    Network,
    RateLimited,
    AuthFailed,
    Timeout,
    UpstreamServerError,
    InvalidRequest,
    MalformedJson,
    InvalidFieldValue,
    StorageTransient,
    StoragePermanent,
    BatchAborted,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::CorruptFile => "CorruptFile",
            ErrorKind::DownloadFailed => "DownloadFailed",
            ErrorKind::SourceMissing => "SourceMissing",
            ErrorKind::Network => "Network",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthFailed => "AuthFailed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::UpstreamServerError => "UpstreamServerError",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::MalformedJson => "MalformedJson",
            ErrorKind::InvalidFieldValue => "InvalidFieldValue",
            ErrorKind::StorageTransient => "StorageTransient",
            ErrorKind::StoragePermanent => "StoragePermanent",
            ErrorKind::BatchAborted => "BatchAborted",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(label)
    }
}

pub type Result<T> = std::result::Result<T, ClassifyError>;

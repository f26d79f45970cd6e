use thiserror::Error;

use crate::error::{ApiError, ErrorKind, ExtractionError, ParseError, StorageError};

/// Failure of one document. Never escapes the document's own run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Model call failed: {0}")]
    Api(#[from] ApiError),

    #[error("Response rejected: {0}")]
    Parse(#[from] ParseError),

    #[error("Write failed: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Extraction(e) => e.kind(),
            PipelineError::Api(e) => e.kind(),
            PipelineError::Parse(e) => e.kind(),
            PipelineError::Storage(e) => e.kind(),
        }
    }

    /// Errors that should stop the whole batch, not just this document.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Api(e) if e.is_fatal())
    }
}

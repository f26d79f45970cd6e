use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::db::document_repo::DocumentRow;
use crate::error::ErrorKind;
use crate::extractor::{DocumentSource, ExtractionRequest};
use crate::pipeline::DocumentState;

/// File paths of Drive-hosted documents carry this prefix in the tracking store.
pub const DRIVE_PATH_PREFIX: &str = "drive:";

/// One document to classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentJob {
    pub document_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub source: DocumentSource,
}

impl DocumentJob {
    pub fn from_row(row: &DocumentRow) -> Self {
        let source = match (&row.drive_id, row.file_path.strip_prefix(DRIVE_PATH_PREFIX)) {
            (Some(file_id), _) => DocumentSource::Drive {
                file_id: file_id.clone(),
            },
            (None, Some(file_id)) => DocumentSource::Drive {
                file_id: file_id.to_string(),
            },
            (None, None) => DocumentSource::Local {
                path: PathBuf::from(&row.file_path),
            },
        };
        Self {
            document_id: row.id.clone(),
            file_name: row.file_name.clone(),
            mime_type: row.mime_type.clone(),
            source,
        }
    }

    pub fn extraction_request(&self) -> ExtractionRequest {
        ExtractionRequest {
            source: self.source.clone(),
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Why a document ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Terminal result of one document's run through the pipeline.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub document_id: String,
    pub file_name: String,
    pub state: DocumentState,
    pub prompt_name: Option<String>,
    pub document_type: Option<String>,
    pub assessment_version: Option<u32>,
    pub error: Option<OutcomeError>,
    /// LLM calls made, including retries.
    pub llm_attempts: u32,
    pub elapsed: Duration,
}

impl DocumentOutcome {
    pub fn new(job: &DocumentJob) -> Self {
        Self {
            document_id: job.document_id.clone(),
            file_name: job.file_name.clone(),
            state: DocumentState::Pending,
            prompt_name: None,
            document_type: None,
            assessment_version: None,
            error: None,
            llm_attempts: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Recorded for documents that were never dispatched because the batch aborted.
    pub fn aborted(job: &DocumentJob, reason: &str) -> Self {
        Self {
            state: DocumentState::Failed,
            error: Some(OutcomeError {
                kind: ErrorKind::BatchAborted,
                message: reason.to_string(),
            }),
            ..Self::new(job)
        }
    }

    /// Succeeded and Deleted both count toward the batch's successful total.
    pub fn is_success(&self) -> bool {
        matches!(self.state, DocumentState::Succeeded | DocumentState::Deleted)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

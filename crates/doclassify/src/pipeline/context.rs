use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::extractor::ExtractedContent;
use crate::invoker::RawModelResponse;
use crate::parser::ParsedClassification;
use crate::persistence::Ack;
use crate::worker::job::DocumentJob;

/// Where a document is in its run. Every run ends in `Succeeded`, `Failed`
/// or `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Pending,
    Extracting,
    Classifying,
    Parsing,
    Persisting,
    Succeeded,
    Failed,
    /// The source no longer exists; the document was flagged deleted.
    Deleted,
}

impl DocumentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentState::Succeeded | DocumentState::Failed | DocumentState::Deleted
        )
    }

    /// Allowed forward moves. Any non-terminal state may fail.
    pub fn can_advance_to(&self, next: DocumentState) -> bool {
        use DocumentState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Pending, Extracting)
            | (Extracting, Classifying)
            | (Extracting, Deleted)
            | (Extracting, Succeeded)
            | (Classifying, Parsing)
            | (Parsing, Persisting)
            | (Persisting, Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentState::Pending => "Pending",
            DocumentState::Extracting => "Extracting",
            DocumentState::Classifying => "Classifying",
            DocumentState::Parsing => "Parsing",
            DocumentState::Persisting => "Persisting",
            DocumentState::Succeeded => "Succeeded",
            DocumentState::Failed => "Failed",
            DocumentState::Deleted => "Deleted",
        };
        f.pad(label)
    }
}

pub struct PipelineContext {
    pub job: DocumentJob,
    pub state: DocumentState,
    pub started: Instant,

    // Set before extraction
    pub prompt_name: Option<String>,

    // Extracting
    pub content: Option<ExtractedContent>,

    // Classifying
    pub response: Option<RawModelResponse>,
    pub llm_attempts: u32,

    // Parsing
    pub parsed: Option<ParsedClassification>,

    // Persisting
    pub ack: Option<Ack>,
}

impl PipelineContext {
    pub fn new(job: DocumentJob) -> Self {
        Self {
            job,
            state: DocumentState::Pending,
            started: Instant::now(),
            prompt_name: None,
            content: None,
            response: None,
            llm_attempts: 0,
            parsed: None,
            ack: None,
        }
    }

    /// Moves to `next`. Illegal moves are a programming error and are
    /// logged, not applied.
    pub fn advance(&mut self, next: DocumentState) {
        if self.state.can_advance_to(next) {
            self.state = next;
        } else {
            tracing::error!(
                document_id = %self.job.document_id,
                "illegal state transition {} -> {}",
                self.state,
                next
            );
        }
    }
}

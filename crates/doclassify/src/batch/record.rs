//! The `ProcessingBatch` aggregate: counts and per-item errors for one run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::batch_repo::BatchErrorEntry;
use crate::error::{BatchError, ErrorKind};
use crate::worker::job::DocumentOutcome;

/// One failed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub document_id: String,
    pub file_name: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&BatchItemError> for BatchErrorEntry {
    fn from(item: &BatchItemError) -> Self {
        BatchErrorEntry {
            document_id: item.document_id.clone(),
            file_name: item.file_name.clone(),
            kind: item.kind.to_string(),
            message: item.message.clone(),
        }
    }
}

/// Accumulates terminal outcomes until every requested document is
/// accounted for. Read-only once completed.
#[derive(Debug, Clone)]
pub struct ProcessingBatch {
    pub id: String,
    pub total_requested: u64,
    pub batch_size: usize,
    pub retry_budget: u32,
    pub started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    successful: u64,
    failed: u64,
    deleted: u64,
    errors: Vec<BatchItemError>,
}

impl ProcessingBatch {
    pub fn new(total_requested: u64, batch_size: usize, retry_budget: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            total_requested,
            batch_size,
            retry_budget,
            started_at: Utc::now(),
            completed_at: None,
            successful: 0,
            failed: 0,
            deleted: 0,
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: &DocumentOutcome) -> Result<(), BatchError> {
        if self.is_complete() {
            return Err(BatchError::AlreadyComplete(self.id.clone()));
        }
        if self.terminal_count() >= self.total_requested {
            return Err(BatchError::Overfilled {
                id: self.id.clone(),
                total: self.total_requested,
            });
        }

        if outcome.is_success() {
            self.successful += 1;
            if outcome.state == crate::pipeline::DocumentState::Deleted {
                self.deleted += 1;
            }
        } else {
            self.failed += 1;
            let (kind, message) = match &outcome.error {
                Some(e) => (e.kind, e.message.clone()),
                None => (ErrorKind::Internal, "failed without an error".to_string()),
            };
            self.errors.push(BatchItemError {
                document_id: outcome.document_id.clone(),
                file_name: outcome.file_name.clone(),
                kind,
                message,
            });
        }
        Ok(())
    }

    /// Seals the batch. Every requested document must have an outcome.
    pub fn complete(&mut self) -> Result<(), BatchError> {
        if self.is_complete() {
            return Err(BatchError::AlreadyComplete(self.id.clone()));
        }
        if self.terminal_count() != self.total_requested {
            return Err(BatchError::Incomplete {
                id: self.id.clone(),
                terminal: self.terminal_count(),
                total: self.total_requested,
            });
        }
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn terminal_count(&self) -> u64 {
        self.successful + self.failed
    }

    pub fn remaining(&self) -> u64 {
        self.total_requested - self.terminal_count()
    }

    pub fn successful(&self) -> u64 {
        self.successful
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Successful outcomes that were deleted-flag flips rather than classifications.
    pub fn deleted(&self) -> u64 {
        self.deleted
    }

    pub fn errors(&self) -> &[BatchItemError] {
        &self.errors
    }

    pub fn aborted_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.kind == ErrorKind::BatchAborted)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::DocumentSource;
    use crate::pipeline::DocumentState;
    use crate::worker::job::{DocumentJob, OutcomeError};

    fn job(n: usize) -> DocumentJob {
        DocumentJob {
            document_id: format!("doc-{}", n),
            file_name: format!("file{}.md", n),
            mime_type: "text/markdown".into(),
            source: DocumentSource::Local {
                path: format!("/docs/file{}.md", n).into(),
            },
        }
    }

    fn outcome(n: usize, state: DocumentState) -> DocumentOutcome {
        let mut outcome = DocumentOutcome::new(&job(n));
        outcome.state = state;
        if state == DocumentState::Failed {
            outcome.error = Some(OutcomeError {
                kind: ErrorKind::CorruptFile,
                message: "bad zip".into(),
            });
        }
        outcome
    }

    #[test]
    fn test_counts_and_errors() {
        let mut batch = ProcessingBatch::new(3, 5, 3);
        batch.record(&outcome(1, DocumentState::Succeeded)).unwrap();
        batch.record(&outcome(2, DocumentState::Failed)).unwrap();
        batch.record(&outcome(3, DocumentState::Deleted)).unwrap();

        assert_eq!(batch.successful(), 2);
        assert_eq!(batch.deleted(), 1);
        assert_eq!(batch.failed(), 1);
        assert_eq!(batch.errors()[0].document_id, "doc-2");
        assert_eq!(batch.errors()[0].kind, ErrorKind::CorruptFile);
        batch.complete().unwrap();
    }

    #[test]
    fn test_cannot_complete_with_items_outstanding() {
        let mut batch = ProcessingBatch::new(2, 5, 3);
        batch.record(&outcome(1, DocumentState::Succeeded)).unwrap();
        assert!(matches!(
            batch.complete(),
            Err(BatchError::Incomplete { terminal: 1, total: 2, .. })
        ));
        assert!(!batch.is_complete());
    }

    #[test]
    fn test_completed_batch_is_immutable() {
        let mut batch = ProcessingBatch::new(1, 5, 3);
        batch.record(&outcome(1, DocumentState::Succeeded)).unwrap();
        batch.complete().unwrap();

        assert!(matches!(
            batch.record(&outcome(2, DocumentState::Failed)),
            Err(BatchError::AlreadyComplete(_))
        ));
        assert!(matches!(batch.complete(), Err(BatchError::AlreadyComplete(_))));
        assert_eq!(batch.failed(), 0);
    }

    #[test]
    fn test_never_exceeds_total() {
        let mut batch = ProcessingBatch::new(1, 5, 3);
        batch.record(&outcome(1, DocumentState::Succeeded)).unwrap();
        assert!(matches!(
            batch.record(&outcome(2, DocumentState::Succeeded)),
            Err(BatchError::Overfilled { .. })
        ));
        assert_eq!(batch.terminal_count(), 1);
    }

    #[test]
    fn test_empty_batch_completes_immediately() {
        let mut batch = ProcessingBatch::new(0, 5, 3);
        batch.complete().unwrap();
        assert_eq!(batch.remaining(), 0);
    }
}

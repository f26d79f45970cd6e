use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ErrorKind;

use super::context::DocumentState;

/// Events emitted by the pipeline while a document moves through its states.
pub enum ProgressEvent {
    State {
        state: DocumentState,
        message: String,
    },
    Completed {
        state: DocumentState,
        document_type: Option<String>,
        assessment_version: Option<u32>,
    },
    Failed {
        kind: ErrorKind,
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests and runs without subscribers.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Wire form of a progress event, as delivered to broadcast subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProgressEvent {
    pub document_id: String,
    pub file_name: String,
    pub state: DocumentState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl DocumentProgressEvent {
    fn new(document_id: &str, file_name: &str, state: DocumentState, message: String) -> Self {
        Self {
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            state,
            message,
            timestamp: Utc::now(),
            document_type: None,
            assessment_version: None,
            error_kind: None,
        }
    }
}

/// Forwards a single document's events to a broadcast channel. Sending
/// with no subscribers is not an error.
pub struct BroadcastProgress {
    document_id: String,
    file_name: String,
    sender: Arc<broadcast::Sender<DocumentProgressEvent>>,
}

impl BroadcastProgress {
    pub fn new(
        document_id: &str,
        file_name: &str,
        sender: Arc<broadcast::Sender<DocumentProgressEvent>>,
    ) -> Self {
        Self {
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            sender,
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        let payload = match event {
            ProgressEvent::State { state, message } => {
                DocumentProgressEvent::new(&self.document_id, &self.file_name, state, message)
            }
            ProgressEvent::Completed {
                state,
                document_type,
                assessment_version,
            } => {
                let message = match state {
                    DocumentState::Deleted => "Source missing; flagged deleted".to_string(),
                    _ => "Classification completed".to_string(),
                };
                let mut payload =
                    DocumentProgressEvent::new(&self.document_id, &self.file_name, state, message);
                payload.document_type = document_type;
                payload.assessment_version = assessment_version;
                payload
            }
            ProgressEvent::Failed { kind, error } => {
                let mut payload = DocumentProgressEvent::new(
                    &self.document_id,
                    &self.file_name,
                    DocumentState::Failed,
                    error,
                );
                payload.error_kind = Some(kind);
                payload
            }
        };
        let _ = self.sender.send(payload);
    }
}

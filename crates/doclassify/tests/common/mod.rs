//! Shared fixtures for the integration suites: a scripted model client and
//! a temp directory with its own tracking database.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use doclassify::config::ApiConfig;
use doclassify::db::document_repo::{self, DocumentRow};
use doclassify::extractor::SourceLoader;
use doclassify::invoker::{ContentBlock, InvokeOptions, MessagesRequest, MessagesResponse, Usage};
use doclassify::{
    ApiError, Database, ExtractorRegistry, ModelClient, PersistenceWriter, Pipeline, PipelineMode,
    PromptCatalog, PromptInvoker, PromptResolver, RetryPolicy, SqliteStore,
};
use tempfile::TempDir;

pub const CANONICAL_REPLY: &str = r#"{
  "name": "Meeting Transcript",
  "document_type_id": "meeting_transcript",
  "category": "Operations",
  "classification_confidence": 0.88,
  "classification_reasoning": "Alternating speaker turns",
  "document_summary": "Weekly staffing meeting.",
  "key_topics": ["staffing", "rota"],
  "status_recommendation": "KEEP"
}"#;

pub const LEGACY_REPLY: &str = r#"Here is the classification:
```json
{
  "generalCategory": "Clinical",
  "specificDocumentType": "Discharge Summary",
  "keyConcepts": ["cardiology", "follow-up"],
  "confidence": 0.7,
  "reasoning": "Mentions admission and discharge dates"
}
```"#;

/// Answers each call with the next scripted reply, repeating the last one.
pub struct ScriptedClient {
    replies: Vec<Result<String, ApiError>>,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<String, ApiError>>) -> Arc<Self> {
        Arc::new(Self {
            replies,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn always(reply: &str) -> Arc<Self> {
        Self::new(vec![Ok(reply.to_string())])
    }

    pub fn failing(error: ApiError) -> Arc<Self> {
        Self::new(vec![Err(error)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl ModelClient for ScriptedClient {
    fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse, ApiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        self.prompts
            .lock()
            .unwrap()
            .push(request.messages[0].content.clone());
        let reply = &self.replies[call.min(self.replies.len() - 1)];
        reply.clone().map(|text| MessagesResponse {
            model: Some("claude-test".into()),
            content: vec![ContentBlock {
                kind: "text".into(),
                text: Some(text),
            }],
            stop_reason: Some("end_turn".into()),
            usage: Usage::default(),
        })
    }
}

/// A temp directory holding source files and a file-backed database.
pub struct TestHarness {
    pub dir: TempDir,
    pub db: Database,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("doclassify.db")).unwrap();
        Self { dir, db }
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(file_name)
    }

    /// Writes `body` to `file_name` and registers it as pending.
    pub fn add_document(&self, file_name: &str, body: &str) -> DocumentRow {
        let path = self.path(file_name);
        std::fs::write(&path, body).unwrap();
        let mime = doclassify::extractor::detect_mime_type(&path);
        let row = DocumentRow::new_pending(path.to_string_lossy(), file_name, mime);
        document_repo::insert(&self.db, &row).unwrap();
        row
    }

    /// Registers `count` plain-text notes named `note-00.txt` onwards.
    pub fn add_notes(&self, count: usize) -> Vec<DocumentRow> {
        (0..count)
            .map(|i| self.add_document(&format!("note-{:02}.txt", i), "Ward round notes"))
            .collect()
    }

    pub fn live_pipeline(&self, client: Arc<ScriptedClient>, retries: u32) -> Pipeline {
        let writer = Arc::new(PersistenceWriter::with_policy(
            Arc::new(SqliteStore::new(self.db.clone())),
            RetryPolicy::new(3, Duration::from_millis(1), 2.0),
        ));
        Pipeline::new(
            PromptResolver::new(Arc::new(PromptCatalog::builtin())),
            ExtractorRegistry::new(SourceLoader::offline()),
            PipelineMode::Live {
                invoker: PromptInvoker::new(client, InvokeOptions::from(&ApiConfig::default())),
                writer,
                retry_policy: RetryPolicy::new(retries + 1, Duration::from_millis(1), 2.0),
            },
        )
    }
}

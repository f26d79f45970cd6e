//! Classification writes: one outstanding write per document, transient
//! failures retried with backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};

use crate::db::classification_repo::{self, ClassificationRow};
use crate::db::document_repo::{self, STATUS_FAILED};
use crate::db::Database;
use crate::error::StorageError;
use crate::parser::ParsedClassification;
use crate::retry::{retry_with_policy, RetryPolicy};

/// A parsed classification bound to its document, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub id: String,
    pub document_id: String,
    pub classification: ParsedClassification,
    pub prompt_name: String,
    pub model_id: String,
    pub assessed_at: DateTime<Utc>,
    /// Set by the store on write.
    pub assessment_version: Option<u32>,
}

impl ClassificationResult {
    pub fn new(
        document_id: impl Into<String>,
        classification: ParsedClassification,
        prompt_name: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            classification,
            prompt_name: prompt_name.into(),
            model_id: model_id.into(),
            assessed_at: Utc::now(),
            assessment_version: None,
        }
    }

    fn to_row(&self) -> ClassificationRow {
        let c = &self.classification;
        ClassificationRow {
            id: self.id.clone(),
            document_id: self.document_id.clone(),
            assessment_version: self.assessment_version.unwrap_or(0),
            name: c.name.clone(),
            document_type_id: c.document_type_id.clone(),
            category: c.category.clone(),
            classification_confidence: c.classification_confidence,
            classification_reasoning: c.classification_reasoning.clone(),
            document_summary: c.document_summary.clone(),
            key_topics: c.key_topics.clone(),
            target_audience: c.target_audience.clone(),
            unique_insights: c.unique_insights.clone(),
            status_recommendation: c.status_recommendation.as_str().to_string(),
            status_defaulted: c.status_defaulted,
            assessment_quality_score: c.assessment_quality_score,
            prompt_name: self.prompt_name.clone(),
            model_id: self.model_id.clone(),
            assessed_at: self.assessed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            extras: c.extras.clone(),
        }
    }
}

/// Acknowledgement of a successful classification write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub document_id: String,
    pub assessment_version: u32,
}

/// Backing store for classifications and document flags.
pub trait ClassificationStore: Send + Sync {
    /// Writes the next version for the document and returns that version.
    fn write_classification(&self, result: &ClassificationResult) -> Result<u32, StorageError>;

    fn mark_deleted(&self, document_id: &str) -> Result<(), StorageError>;

    fn mark_failed(&self, document_id: &str) -> Result<(), StorageError>;
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl ClassificationStore for SqliteStore {
    fn write_classification(&self, result: &ClassificationResult) -> Result<u32, StorageError> {
        Ok(classification_repo::insert_versioned(&self.db, &result.to_row())?)
    }

    fn mark_deleted(&self, document_id: &str) -> Result<(), StorageError> {
        Ok(document_repo::mark_deleted(&self.db, document_id)?)
    }

    fn mark_failed(&self, document_id: &str) -> Result<(), StorageError> {
        Ok(document_repo::set_status(&self.db, document_id, STATUS_FAILED)?)
    }
}

/// Serializes writes per document id and retries transient store failures.
/// Writes for distinct documents never wait on each other.
pub struct PersistenceWriter {
    store: Arc<dyn ClassificationStore>,
    policy: RetryPolicy,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PersistenceWriter {
    pub fn new(store: Arc<dyn ClassificationStore>) -> Self {
        Self::with_policy(store, RetryPolicy::storage())
    }

    pub fn with_policy(store: Arc<dyn ClassificationStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn document_lock(&self, document_id: &str) -> Result<Arc<Mutex<()>>, StorageError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StorageError::Permanent("writer lock map poisoned".to_string()))?;
        Ok(Arc::clone(
            locks.entry(document_id.to_string()).or_default(),
        ))
    }

    /// Runs `op` while holding the document's write lock.
    fn serialized<T>(
        &self,
        document_id: &str,
        op: impl FnMut(u32) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let lock = self.document_lock(document_id)?;
        let result = match lock.lock() {
            Ok(_guard) => retry_with_policy(&self.policy, StorageError::is_transient, op),
            Err(_) => Err(StorageError::Permanent(format!(
                "write lock for {} poisoned",
                document_id
            ))),
        };
        self.release_lock(document_id, &lock);
        result
    }

    /// Drops the map entry once the caller holds the only other reference.
    /// Clones are only taken under the map lock, so the count is stable here.
    fn release_lock(&self, document_id: &str, lock: &Arc<Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        let idle = locks
            .get(document_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(document_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }

    pub fn upsert(&self, result: &ClassificationResult) -> Result<Ack, StorageError> {
        let version = self.serialized(&result.document_id, |attempt| {
            if attempt > 1 {
                debug!("Retrying write for {} (attempt {})", result.document_id, attempt);
            }
            self.store.write_classification(result)
        })?;

        Ok(Ack {
            document_id: result.document_id.clone(),
            assessment_version: version,
        })
    }

    /// Flips the deleted flag instead of writing a classification.
    pub fn mark_deleted(&self, document_id: &str) -> Result<(), StorageError> {
        self.serialized(document_id, |_| self.store.mark_deleted(document_id))
    }

    /// Best effort: a failure to record the failed status is logged, not raised.
    pub fn mark_failed(&self, document_id: &str) {
        if let Err(e) = self.serialized(document_id, |_| self.store.mark_failed(document_id)) {
            warn!("Could not mark {} as failed: {}", document_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use crate::db::document_repo::DocumentRow;
    use crate::parser;

    fn parsed() -> ParsedClassification {
        parser::parse(
            r#"{"name":"Meeting Notes","category":"Operations","classification_confidence":0.82,
                "key_topics":["staffing"],"status_recommendation":"keep"}"#,
        )
        .unwrap()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), 2.0)
    }

    /// Fails the first `failures` writes with the given error.
    struct FlakyStore {
        failures: u32,
        error: StorageError,
        calls: AtomicU32,
    }

    impl ClassificationStore for FlakyStore {
        fn write_classification(&self, _: &ClassificationResult) -> Result<u32, StorageError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(1)
            }
        }

        fn mark_deleted(&self, _: &str) -> Result<(), StorageError> {
            Ok(())
        }

        fn mark_failed(&self, _: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let store = Arc::new(FlakyStore {
            failures: 2,
            error: StorageError::Transient("database is locked".into()),
            calls: AtomicU32::new(0),
        });
        let writer = PersistenceWriter::with_policy(store.clone(), fast_policy());

        let result = ClassificationResult::new("doc-1", parsed(), "p", "m");
        let ack = writer.upsert(&result).unwrap();
        assert_eq!(ack.assessment_version, 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_transient_failure_gives_up_after_three_attempts() {
        let store = Arc::new(FlakyStore {
            failures: 10,
            error: StorageError::Transient("busy".into()),
            calls: AtomicU32::new(0),
        });
        let writer = PersistenceWriter::with_policy(store.clone(), fast_policy());

        let result = ClassificationResult::new("doc-1", parsed(), "p", "m");
        assert!(writer.upsert(&result).unwrap_err().is_transient());
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let store = Arc::new(FlakyStore {
            failures: 10,
            error: StorageError::Permanent("CHECK constraint failed".into()),
            calls: AtomicU32::new(0),
        });
        let writer = PersistenceWriter::with_policy(store.clone(), fast_policy());

        let result = ClassificationResult::new("doc-1", parsed(), "p", "m");
        assert!(writer.upsert(&result).is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(writer.tracked_locks(), 0);
    }

    /// Records the peak number of concurrent writes per document.
    struct SlowStore {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ClassificationStore for SlowStore {
        fn write_classification(&self, _: &ClassificationResult) -> Result<u32, StorageError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(1)
        }

        fn mark_deleted(&self, _: &str) -> Result<(), StorageError> {
            Ok(())
        }

        fn mark_failed(&self, _: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn test_writes_to_same_document_are_serialized() {
        let store = Arc::new(SlowStore {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let writer = Arc::new(PersistenceWriter::new(store.clone()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    let result = ClassificationResult::new("same-doc", parsed(), "p", "m");
                    writer.upsert(&result).map(|ack| ack.assessment_version)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(store.peak.load(Ordering::SeqCst), 1);
        assert_eq!(writer.tracked_locks(), 0);
    }

    #[test]
    fn test_writes_to_distinct_documents_overlap() {
        let store = Arc::new(SlowStore {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let writer = Arc::new(PersistenceWriter::new(store.clone()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    let result = ClassificationResult::new(format!("doc-{}", i), parsed(), "p", "m");
                    writer.upsert(&result).map(|ack| ack.assessment_version)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert!(store.peak.load(Ordering::SeqCst) > 1);
        assert_eq!(writer.tracked_locks(), 0);
    }

    #[test]
    fn test_sqlite_store_assigns_versions_and_flags() {
        let db = Database::open_in_memory().unwrap();
        let doc = DocumentRow::new_pending("/docs/notes.md", "notes.md", "text/markdown");
        document_repo::insert(&db, &doc).unwrap();
        let writer = PersistenceWriter::new(Arc::new(SqliteStore::new(db.clone())));

        let first = ClassificationResult::new(&doc.id, parsed(), "p", "m");
        let second = ClassificationResult::new(&doc.id, parsed(), "p", "m");
        assert_eq!(writer.upsert(&first).unwrap().assessment_version, 1);
        assert_eq!(writer.upsert(&second).unwrap().assessment_version, 2);

        writer.mark_deleted(&doc.id).unwrap();
        let stored = document_repo::find_by_id(&db, &doc.id).unwrap().unwrap();
        assert!(stored.is_deleted);
    }

    #[test]
    fn test_sqlite_store_unknown_document_is_permanent() {
        let db = Database::open_in_memory().unwrap();
        let writer = PersistenceWriter::new(Arc::new(SqliteStore::new(db)));
        let err = writer.mark_deleted("missing").unwrap_err();
        assert!(!err.is_transient());
    }
}

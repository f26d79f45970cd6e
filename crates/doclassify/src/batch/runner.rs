use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{info, info_span, warn};

use crate::db::batch_repo::{self, BatchErrorEntry, BATCH_ABORTED, BATCH_COMPLETED};
use crate::db::Database;
use crate::error::{BatchError, ErrorKind};
use crate::pipeline::{DocumentProgressEvent, Pipeline};
use crate::worker::job::{DocumentJob, DocumentOutcome};
use crate::worker::WorkerPool;

use super::record::ProcessingBatch;
use super::stats::{format_duration, RoundStats};

const OPERATOR_ABORT: &str = "interrupted by operator";

/// Everything a finished run produced.
#[derive(Debug)]
pub struct BatchSummary {
    pub batch: ProcessingBatch,
    pub rounds: Vec<RoundStats>,
    pub outcomes: Vec<DocumentOutcome>,
    pub abort_reason: Option<String>,
    pub dry_run: bool,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.batch.failed() == 0
    }
}

/// Dispatches documents to the worker pool in rounds of at most
/// `batch_size` and waits for every document in a round before starting
/// the next.
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    batch_size: usize,
    retry_budget: u32,
    abort: Arc<AtomicBool>,
    progress_sender: Option<Arc<broadcast::Sender<DocumentProgressEvent>>>,
    db: Option<Database>,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<Pipeline>, batch_size: usize, retry_budget: u32) -> Result<Self, BatchError> {
        if batch_size == 0 {
            return Err(BatchError::InvalidBatchSize);
        }
        Ok(Self {
            pipeline,
            batch_size,
            retry_budget,
            abort: Arc::new(AtomicBool::new(false)),
            progress_sender: None,
            db: None,
        })
    }

    /// Records the batch in `processing_batches`.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_progress_sender(
        mut self,
        sender: Arc<broadcast::Sender<DocumentProgressEvent>>,
    ) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    /// Setting the flag stops new rounds from being dispatched. Documents
    /// already in flight finish.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn run(&self, jobs: Vec<DocumentJob>) -> Result<BatchSummary, BatchError> {
        let mut batch = ProcessingBatch::new(jobs.len() as u64, self.batch_size, self.retry_budget);
        let _batch_span = info_span!("batch", batch_id = %batch.id, total = jobs.len()).entered();
        info!(
            "Starting batch {}: {} documents, batch size {}, {} retries{}",
            batch.id,
            jobs.len(),
            self.batch_size,
            self.retry_budget,
            if self.pipeline.is_dry_run() { " (dry run)" } else { "" }
        );

        if let Some(db) = &self.db {
            batch_repo::insert(
                db,
                &batch.id,
                batch.total_requested,
                self.batch_size as u32,
                self.retry_budget,
                &batch.started_at.to_rfc3339(),
            )?;
        }

        let started = Instant::now();
        let mut rounds = Vec::new();
        let mut outcomes = Vec::with_capacity(jobs.len());
        let mut abort_reason: Option<String> = None;

        let worker_count = self.batch_size.min(jobs.len()).max(1);
        let pool = WorkerPool::with_progress_sender(
            Arc::clone(&self.pipeline),
            worker_count,
            self.progress_sender.clone(),
        );

        for (index, round_jobs) in jobs.chunks(self.batch_size).enumerate() {
            if self.abort.load(Ordering::SeqCst) {
                let reason = abort_reason.get_or_insert_with(|| OPERATOR_ABORT.to_string());
                for job in round_jobs {
                    let outcome = DocumentOutcome::aborted(job, reason);
                    batch.record(&outcome)?;
                    outcomes.push(outcome);
                }
                continue;
            }

            let round = index + 1;
            let _round_span = info_span!("round", round, documents = round_jobs.len()).entered();
            let round_started = Instant::now();

            for job in round_jobs {
                pool.submit(job.clone())?;
            }

            let (mut succeeded, mut failed) = (0, 0);
            for _ in 0..round_jobs.len() {
                let outcome = pool.recv_result().ok_or(BatchError::ChannelClosed)?;
                if outcome.is_success() {
                    succeeded += 1;
                } else {
                    failed += 1;
                }
                if outcome.error_kind() == Some(ErrorKind::AuthFailed) && abort_reason.is_none() {
                    let message = outcome
                        .error
                        .as_ref()
                        .map(|e| e.message.clone())
                        .unwrap_or_default();
                    warn!("Authentication failed; no further rounds will be dispatched");
                    abort_reason = Some(format!("authentication failed: {}", message));
                    self.abort.store(true, Ordering::SeqCst);
                }
                batch.record(&outcome)?;
                outcomes.push(outcome);
            }

            let stats = RoundStats::compute(
                round,
                succeeded,
                failed,
                batch.terminal_count(),
                batch.total_requested,
                round_started.elapsed(),
                started.elapsed(),
            );
            info!(
                "Round {} done: {} ok, {} failed | {}/{} processed | {:.2} docs/s | ETA {}",
                round,
                succeeded,
                failed,
                stats.processed_total,
                batch.total_requested,
                stats.throughput,
                stats
                    .eta
                    .map(format_duration)
                    .unwrap_or_else(|| "unknown".to_string())
            );
            rounds.push(stats);
        }

        pool.shutdown();
        pool.wait();

        batch.complete()?;

        if let Some(db) = &self.db {
            let errors: Vec<BatchErrorEntry> = batch.errors().iter().map(Into::into).collect();
            let status = if abort_reason.is_some() {
                BATCH_ABORTED
            } else {
                BATCH_COMPLETED
            };
            batch_repo::complete(db, &batch.id, batch.successful(), batch.failed(), status, &errors)?;
        }

        info!(
            "Batch {} complete: {} successful, {} failed in {}",
            batch.id,
            batch.successful(),
            batch.failed(),
            format_duration(started.elapsed())
        );

        Ok(BatchSummary {
            batch,
            rounds,
            outcomes,
            abort_reason,
            dry_run: self.pipeline.is_dry_run(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::TempDir;

    use crate::config::PromptCatalog;
    use crate::extractor::{DocumentSource, ExtractorRegistry, SourceLoader};
    use crate::pipeline::PipelineMode;
    use crate::resolver::PromptResolver;

    fn dry_run_pipeline() -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            PromptResolver::new(Arc::new(PromptCatalog::builtin())),
            ExtractorRegistry::new(SourceLoader::offline()),
            PipelineMode::DryRun,
        ))
    }

    fn jobs(dir: &TempDir, n: usize) -> Vec<DocumentJob> {
        (0..n)
            .map(|i| {
                let path = dir.path().join(format!("doc{}.txt", i));
                writeln!(std::fs::File::create(&path).unwrap(), "document {}", i).unwrap();
                DocumentJob {
                    document_id: format!("doc-{}", i),
                    file_name: format!("doc{}.txt", i),
                    mime_type: "text/plain".into(),
                    source: DocumentSource::Local { path },
                }
            })
            .collect()
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            BatchRunner::new(dry_run_pipeline(), 0, 3),
            Err(BatchError::InvalidBatchSize)
        ));
    }

    #[test]
    fn test_rounds_follow_batch_size() {
        let dir = TempDir::new().unwrap();
        let runner = BatchRunner::new(dry_run_pipeline(), 5, 3).unwrap();
        let summary = runner.run(jobs(&dir, 12)).unwrap();

        let sizes: Vec<usize> = summary.rounds.iter().map(|r| r.dispatched).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        assert!(summary.batch.is_complete());
        assert_eq!(summary.batch.successful(), 12);
        assert!(summary.all_succeeded());
        assert!(summary.dry_run);
    }

    #[test]
    fn test_preset_abort_records_every_document() {
        let dir = TempDir::new().unwrap();
        let runner = BatchRunner::new(dry_run_pipeline(), 2, 0).unwrap();
        runner.abort_handle().store(true, Ordering::SeqCst);

        let summary = runner.run(jobs(&dir, 3)).unwrap();
        assert!(summary.rounds.is_empty());
        assert_eq!(summary.batch.failed(), 3);
        assert_eq!(summary.batch.aborted_count(), 3);
        assert_eq!(summary.abort_reason.as_deref(), Some(OPERATOR_ABORT));
    }

    #[test]
    fn test_batch_is_recorded_in_database() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let runner = BatchRunner::new(dry_run_pipeline(), 5, 3)
            .unwrap()
            .with_database(db.clone());
        let summary = runner.run(jobs(&dir, 2)).unwrap();

        let row = batch_repo::find_by_id(&db, &summary.batch.id).unwrap().unwrap();
        assert_eq!(row.status, BATCH_COMPLETED);
        assert_eq!(row.successful_count, 2);
        assert_eq!(row.total_requested, 2);
    }

    #[test]
    fn test_empty_batch() {
        let runner = BatchRunner::new(dry_run_pipeline(), 5, 3).unwrap();
        let summary = runner.run(Vec::new()).unwrap();
        assert!(summary.batch.is_complete());
        assert!(summary.rounds.is_empty());
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};
use tokio::sync::broadcast;

use crate::error::BatchError;
use crate::pipeline::progress::DocumentProgressEvent;
use crate::pipeline::{BroadcastProgress, NoopProgress, Pipeline, PipelineContext, ProgressEvent};
use crate::pipeline::{DocumentState, ProgressReporter};
use crate::worker::job::{DocumentJob, DocumentOutcome};

/// Fixed set of threads sharing one pipeline. Jobs go in over a bounded
/// channel; each job produces exactly one outcome.
pub struct WorkerPool {
    job_sender: Sender<DocumentJob>,
    result_receiver: Receiver<DocumentOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<Pipeline>, worker_count: usize) -> Self {
        Self::with_progress_sender(pipeline, worker_count, None)
    }

    /// Creates a pool whose workers publish per-document progress events.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn with_progress_sender(
        pipeline: Arc<Pipeline>,
        worker_count: usize,
        progress_sender: Option<Arc<broadcast::Sender<DocumentProgressEvent>>>,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<DocumentJob>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<DocumentOutcome>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);
            let sender = progress_sender.clone();

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    job_rx,
                    result_tx,
                    shutdown_flag,
                    worker_pipeline,
                    sender,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn submit(&self, job: DocumentJob) -> Result<(), BatchError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(BatchError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| BatchError::ChannelClosed)
    }

    pub fn recv_result(&self) -> Option<DocumentOutcome> {
        self.result_receiver.recv().ok()
    }

    /// Stops workers after their current document.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<DocumentJob>,
    result_sender: Sender<DocumentOutcome>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
    progress_sender: Option<Arc<broadcast::Sender<DocumentProgressEvent>>>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} processing document {}", worker_id, job.document_id);

                let outcome = match progress_sender {
                    Some(ref sender) => {
                        let progress =
                            BroadcastProgress::new(&job.document_id, &job.file_name, Arc::clone(sender));
                        progress.report(ProgressEvent::State {
                            state: DocumentState::Pending,
                            message: "Document dispatched".to_string(),
                        });
                        pipeline.run(PipelineContext::new(job), &progress).0
                    }
                    None => pipeline.run(PipelineContext::new(job), &NoopProgress).0,
                };

                if let Err(e) = result_sender.send(outcome) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

pub mod job;
pub mod pool;
pub mod scanner;

pub use job::{DocumentJob, DocumentOutcome, OutcomeError, DRIVE_PATH_PREFIX};
pub use pool::WorkerPool;
pub use scanner::{DirectoryScanner, ScanError, ScanSummary, ScannedFile};

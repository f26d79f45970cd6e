//! Document classification pipeline: resolve a prompt for each document,
//! extract its text, classify it with an LLM, and record the result.

pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod invoker;
pub mod logging;
pub mod parser;
pub mod persistence;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod sanitize;
pub mod secrets;
pub mod worker;

pub use batch::{BatchRunner, BatchSummary, ProcessingBatch, RoundStats};
pub use config::{load_config, load_config_or_default, Config, PromptCatalog};
pub use db::Database;
pub use error::{
    ApiError, BatchError, ClassifyError, ConfigError, ErrorKind, ExtractionError, ParseError,
    Result, StorageError,
};
pub use extractor::{ExtractionRequest, ExtractorRegistry, FormatFamily};
pub use invoker::{AnthropicClient, ModelClient, PromptInvoker};
pub use parser::{parse, ParsedClassification, StatusRecommendation};
pub use persistence::{ClassificationResult, ClassificationStore, PersistenceWriter, SqliteStore};
pub use pipeline::{DocumentState, Pipeline, PipelineContext, PipelineMode};
pub use report::BatchReport;
pub use resolver::PromptResolver;
pub use retry::{retry_with_delay_hint, retry_with_policy, RetryPolicy};
pub use secrets::{SecretError, SecretSource};
pub use worker::{DirectoryScanner, DocumentJob, DocumentOutcome, WorkerPool};

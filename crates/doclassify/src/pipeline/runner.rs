use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

use crate::config::{Config, PromptCatalog};
use crate::db::Database;
use crate::error::ConfigError;
use crate::extractor::{ExtractorRegistry, SourceLoader};
use crate::invoker::{AnthropicClient, InvokeOptions, PromptInvoker};
use crate::parser;
use crate::persistence::{ClassificationResult, PersistenceWriter, SqliteStore};
use crate::resolver::PromptResolver;
use crate::retry::{retry_with_delay_hint, RetryPolicy};
use crate::worker::job::{DocumentOutcome, OutcomeError};

use super::context::{DocumentState, PipelineContext};
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};

/// What happens after extraction.
pub enum PipelineMode {
    /// Classify with the model and write the result.
    Live {
        invoker: PromptInvoker,
        writer: Arc<PersistenceWriter>,
        retry_policy: RetryPolicy,
    },
    /// Resolve the prompt and extract content only. Nothing is written.
    DryRun,
}

/// Per-document state machine: extract, classify, parse, persist.
pub struct Pipeline {
    resolver: PromptResolver,
    extractors: ExtractorRegistry,
    mode: PipelineMode,
}

impl Pipeline {
    pub fn new(resolver: PromptResolver, extractors: ExtractorRegistry, mode: PipelineMode) -> Self {
        Self {
            resolver,
            extractors,
            mode,
        }
    }

    /// Production constructor: builds every collaborator from configuration.
    /// A dry run needs neither an API key nor a database.
    pub fn from_config(
        config: &Config,
        db: Option<Database>,
        dry_run: bool,
    ) -> Result<Self, ConfigError> {
        let catalog = PromptCatalog::from_config(&config.prompts)?;
        let resolver = PromptResolver::new(Arc::new(catalog));
        let extractors = ExtractorRegistry::new(SourceLoader::from_config(&config.extraction)?);

        let mode = match (dry_run, db) {
            (true, _) => PipelineMode::DryRun,
            (false, Some(db)) => {
                let client = AnthropicClient::from_config(&config.api)?;
                PipelineMode::Live {
                    invoker: PromptInvoker::new(Arc::new(client), InvokeOptions::from(&config.api)),
                    writer: Arc::new(PersistenceWriter::new(Arc::new(SqliteStore::new(db)))),
                    retry_policy: config.batch.document_retry_policy(),
                }
            }
            (false, None) => {
                return Err(ConfigError::Validation {
                    message: "a database is required unless running dry".to_string(),
                })
            }
        };

        Ok(Self::new(resolver, extractors, mode))
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.mode, PipelineMode::DryRun)
    }

    /// Runs one document to a terminal state. Errors are captured in the
    /// outcome; nothing here can affect other documents.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (DocumentOutcome, PipelineContext) {
        let _pipeline_span = info_span!("pipeline",
            document_id = %ctx.job.document_id,
            file_name = %ctx.job.file_name,
        )
        .entered();

        let result = self.drive(&mut ctx, progress);

        let mut outcome = DocumentOutcome::new(&ctx.job);
        outcome.prompt_name = ctx.prompt_name.clone();
        outcome.llm_attempts = ctx.llm_attempts;

        match result {
            Ok(()) => {
                outcome.document_type = ctx.parsed.as_ref().and_then(|p| p.name.clone());
                outcome.assessment_version = ctx.ack.as_ref().map(|a| a.assessment_version);
                progress.report(ProgressEvent::Completed {
                    state: ctx.state,
                    document_type: outcome.document_type.clone(),
                    assessment_version: outcome.assessment_version,
                });
            }
            Err(e) => {
                let kind = e.kind();
                let failed_in = ctx.state;
                ctx.advance(DocumentState::Failed);
                warn!(state = %failed_in, error_kind = %kind, "Document failed: {}", e);

                // A fatal error says nothing about the document itself; leave it pending.
                if !e.is_fatal() {
                    if let PipelineMode::Live { writer, .. } = &self.mode {
                        writer.mark_failed(&ctx.job.document_id);
                    }
                }

                progress.report(ProgressEvent::Failed {
                    kind,
                    error: e.to_string(),
                });
                outcome.error = Some(OutcomeError {
                    kind,
                    message: e.to_string(),
                });
            }
        }

        outcome.state = ctx.state;
        outcome.elapsed = ctx.started.elapsed();
        (outcome, ctx)
    }

    fn drive(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let request = ctx.job.extraction_request();
        let prompt = self
            .resolver
            .resolve(&request.effective_mime(), &request.file_name);
        ctx.prompt_name = Some(prompt.name.clone());
        debug!(prompt = %prompt.name, "Prompt resolved");

        // Extract
        {
            let _step = info_span!("extract").entered();
            ctx.advance(DocumentState::Extracting);
            progress.report(ProgressEvent::State {
                state: DocumentState::Extracting,
                message: "Extracting content...".to_string(),
            });

            match self.extractors.extract(&request) {
                Ok(content) => ctx.content = Some(content),
                Err(e) if e.is_source_missing() => return self.flag_deleted(ctx),
                Err(e) => return Err(e.into()),
            }
        }

        let (invoker, writer, retry_policy) = match &self.mode {
            PipelineMode::Live {
                invoker,
                writer,
                retry_policy,
            } => (invoker, writer, retry_policy),
            PipelineMode::DryRun => {
                let chars = ctx.content.as_ref().map(|c| c.char_count()).unwrap_or(0);
                info!(prompt = %prompt.name, chars, "Dry run: skipping model call");
                ctx.advance(DocumentState::Succeeded);
                return Ok(());
            }
        };

        // Classify
        {
            let _step = info_span!("classify").entered();
            ctx.advance(DocumentState::Classifying);
            progress.report(ProgressEvent::State {
                state: DocumentState::Classifying,
                message: format!("Classifying with {}...", prompt.name),
            });

            let text = ctx.content.as_ref().map(|c| c.text.as_str()).unwrap_or_default();
            let mut attempts = 0;
            let response = retry_with_delay_hint(
                retry_policy,
                |e: &crate::error::ApiError| e.is_retryable(),
                |e: &crate::error::ApiError| e.retry_after(),
                |attempt| {
                    attempts = attempt;
                    invoker.classify(prompt, &request.file_name, text)
                },
            );
            ctx.llm_attempts = attempts;
            ctx.response = Some(response?);
        }

        // Parse. Never retried: the same reply would fail the same way.
        {
            let _step = info_span!("parse").entered();
            ctx.advance(DocumentState::Parsing);
            let raw = ctx.response.as_ref().map(|r| r.text.as_str()).unwrap_or_default();
            let parsed = parser::parse(raw)?;
            if parsed.status_defaulted {
                debug!(
                    status = %parsed.status_recommendation,
                    "Model omitted status recommendation; default applied"
                );
            }
            ctx.parsed = Some(parsed);
        }

        // Persist
        {
            let _step = info_span!("persist").entered();
            ctx.advance(DocumentState::Persisting);
            progress.report(ProgressEvent::State {
                state: DocumentState::Persisting,
                message: "Writing classification...".to_string(),
            });

            let parsed = ctx.parsed.clone().expect("parse step completed");
            let model = ctx
                .response
                .as_ref()
                .map(|r| r.model.clone())
                .expect("classify step completed");
            let result =
                ClassificationResult::new(&ctx.job.document_id, parsed, &prompt.name, model);
            let ack = writer.upsert(&result)?;
            info!(
                version = ack.assessment_version,
                document_type = result.classification.name.as_deref().unwrap_or("UNCLASSIFIED"),
                confidence = result.classification.classification_confidence,
                "Classification stored"
            );
            ctx.ack = Some(ack);
        }

        ctx.advance(DocumentState::Succeeded);
        Ok(())
    }

    fn flag_deleted(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        match &self.mode {
            PipelineMode::Live { writer, .. } => {
                writer.mark_deleted(&ctx.job.document_id)?;
                info!("Source missing; document flagged deleted");
            }
            PipelineMode::DryRun => info!("Dry run: source missing, would flag deleted"),
        }
        ctx.advance(DocumentState::Deleted);
        Ok(())
    }
}

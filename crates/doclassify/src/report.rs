//! Batch reports: a JSON document for machines and a Markdown summary for
//! people, written side by side.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::{format_duration, BatchItemError, BatchSummary, RoundStats};
use crate::error::{BatchError, ErrorKind};
use crate::pipeline::DocumentState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    pub document_id: String,
    pub file_name: String,
    pub state: DocumentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_version: Option<u32>,
    pub llm_attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub total_files: u64,
    pub successful: u64,
    pub failed: u64,
    pub deleted: u64,
    pub batch_size: usize,
    pub retry_budget: u32,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub rounds: Vec<RoundStats>,
    pub items: Vec<ReportItem>,
    pub errors: Vec<BatchItemError>,
}

impl BatchReport {
    pub fn from_summary(summary: &BatchSummary) -> Self {
        let batch = &summary.batch;
        let duration_secs = batch
            .completed_at()
            .map(|end| (end - batch.started_at).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or_default();

        let items = summary
            .outcomes
            .iter()
            .map(|o| ReportItem {
                document_id: o.document_id.clone(),
                file_name: o.file_name.clone(),
                state: o.state,
                prompt_name: o.prompt_name.clone(),
                document_type: o.document_type.clone(),
                assessment_version: o.assessment_version,
                llm_attempts: o.llm_attempts,
                elapsed_ms: o.elapsed.as_millis() as u64,
                error_kind: o.error_kind(),
            })
            .collect();

        Self {
            batch_id: batch.id.clone(),
            started_at: batch.started_at,
            completed_at: batch.completed_at(),
            duration_secs,
            total_files: batch.total_requested,
            successful: batch.successful(),
            failed: batch.failed(),
            deleted: batch.deleted(),
            batch_size: batch.batch_size,
            retry_budget: batch.retry_budget,
            dry_run: summary.dry_run,
            aborted: summary.abort_reason.clone(),
            rounds: summary.rounds.clone(),
            items,
            errors: batch.errors().to_vec(),
        }
    }

    /// `batch-<UTC timestamp>-<first 8 chars of the batch id>`
    pub fn file_stem(&self) -> String {
        let short_id: String = self.batch_id.chars().take(8).collect();
        format!(
            "batch-{}-{}",
            self.started_at.format("%Y%m%dT%H%M%SZ"),
            short_id
        )
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Classification batch {}", self.batch_id);
        md.push('\n');
        if self.dry_run {
            md.push_str("_Dry run: no model calls, nothing written._\n\n");
        }
        if let Some(reason) = &self.aborted {
            let _ = writeln!(md, "**Aborted:** {}\n", reason);
        }

        md.push_str("| | |\n|---|---|\n");
        let _ = writeln!(md, "| Started | {} |", self.started_at.to_rfc3339());
        if let Some(done) = self.completed_at {
            let _ = writeln!(md, "| Completed | {} |", done.to_rfc3339());
        }
        let _ = writeln!(
            md,
            "| Duration | {} |",
            format_duration(std::time::Duration::from_secs_f64(self.duration_secs))
        );
        let _ = writeln!(md, "| Total files | {} |", self.total_files);
        let _ = writeln!(md, "| Successful | {} |", self.successful);
        let _ = writeln!(md, "| Failed | {} |", self.failed);
        if self.deleted > 0 {
            let _ = writeln!(md, "| Flagged deleted | {} |", self.deleted);
        }
        let _ = writeln!(md, "| Batch size | {} |", self.batch_size);
        let _ = writeln!(md, "| Retries per document | {} |", self.retry_budget);

        if !self.rounds.is_empty() {
            md.push_str("\n## Rounds\n\n| Round | Documents | OK | Failed | Docs/s | ETA |\n|---|---|---|---|---|---|\n");
            for r in &self.rounds {
                let eta = r
                    .eta
                    .map(format_duration)
                    .unwrap_or_else(|| "unknown".to_string());
                let _ = writeln!(
                    md,
                    "| {} | {} | {} | {} | {:.2} | {} |",
                    r.round, r.dispatched, r.succeeded, r.failed, r.throughput, eta
                );
            }
        }

        if !self.errors.is_empty() {
            md.push_str("\n## Errors\n\n| Document | File | Kind | Message |\n|---|---|---|---|\n");
            for e in &self.errors {
                let _ = writeln!(
                    md,
                    "| {} | {} | {} | {} |",
                    e.document_id,
                    escape_cell(&e.file_name),
                    e.kind,
                    escape_cell(&e.message)
                );
            }
        }

        md
    }

    /// Writes `<stem>.json` and `<stem>.md` into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<(PathBuf, PathBuf), BatchError> {
        std::fs::create_dir_all(dir).map_err(|source| BatchError::WriteReport {
            path: dir.to_path_buf(),
            source,
        })?;

        let stem = self.file_stem();
        let json_path = dir.join(format!("{}.json", stem));
        let md_path = dir.join(format!("{}.md", stem));

        let json = serde_json::to_string_pretty(self).map_err(|e| BatchError::WriteReport {
            path: json_path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        std::fs::write(&json_path, json).map_err(|source| BatchError::WriteReport {
            path: json_path.clone(),
            source,
        })?;
        std::fs::write(&md_path, self.to_markdown()).map_err(|source| BatchError::WriteReport {
            path: md_path.clone(),
            source,
        })?;

        Ok((json_path, md_path))
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

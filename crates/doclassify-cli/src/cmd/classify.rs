use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use doclassify::db::document_repo::{self, DocumentRow};
use doclassify::extractor::{detect_mime_type, DocumentSource};
use doclassify::{BatchReport, BatchRunner, Config, DocumentJob, Pipeline};

use super::{open_database, GlobalOptions};

pub fn file(
    options: &GlobalOptions,
    path: &Path,
    mime_type: Option<&str>,
    dry_run: bool,
) -> Result<bool> {
    let config = options.load_config()?;
    let path = std::fs::canonicalize(path)
        .with_context(|| format!("file not found: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("path has no file name")?;
    let mime_type = mime_type
        .map(str::to_string)
        .unwrap_or_else(|| detect_mime_type(&path));

    let job = if dry_run {
        DocumentJob {
            document_id: adhoc_id(&path),
            file_name,
            mime_type,
            source: DocumentSource::Local { path },
        }
    } else {
        let db = open_database(&config)?;
        let row = DocumentRow::new_pending(path.to_string_lossy(), file_name, mime_type);
        let (row, inserted) = document_repo::register(&db, &row)?;
        if !inserted {
            tracing::info!("{} is already tracked as {}", row.file_name, row.id);
        }
        DocumentJob::from_row(&row)
    };

    run_batch(&config, vec![job], dry_run)
}

pub fn by_id(options: &GlobalOptions, document_id: &str, dry_run: bool) -> Result<bool> {
    let config = options.load_config()?;
    let db = open_database(&config)?;
    let Some(row) = document_repo::find_by_id(&db, document_id)? else {
        bail!("no document with id {}", document_id);
    };
    if row.is_deleted {
        bail!("document {} is flagged deleted", document_id);
    }
    run_batch(&config, vec![DocumentJob::from_row(&row)], dry_run)
}

pub fn pending(options: &GlobalOptions, limit: Option<u64>, dry_run: bool) -> Result<bool> {
    let config = options.load_config()?;
    let db = open_database(&config)?;
    let jobs: Vec<DocumentJob> = document_repo::find_pending(&db, limit)?
        .iter()
        .map(DocumentJob::from_row)
        .collect();
    if jobs.is_empty() {
        println!("No pending documents.");
        return Ok(true);
    }
    run_batch(&config, jobs, dry_run)
}

/// Runs the jobs, writes the reports, and prints a summary. Returns
/// whether every document succeeded.
fn run_batch(config: &Config, jobs: Vec<DocumentJob>, dry_run: bool) -> Result<bool> {
    let db = if dry_run {
        None
    } else {
        Some(open_database(config)?)
    };

    let pipeline = Pipeline::from_config(config, db.clone(), dry_run)
        .context("failed to set up the pipeline")?;
    let mut runner = BatchRunner::new(
        Arc::new(pipeline),
        config.batch.batch_size,
        config.batch.retry_count,
    )?;
    if let Some(db) = db {
        runner = runner.with_database(db);
    }

    let abort = runner.abort_handle();
    ctrlc::set_handler(move || {
        eprintln!("Interrupt received: finishing in-flight documents, dispatching no more");
        abort.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    let summary = runner.run(jobs)?;
    let report = BatchReport::from_summary(&summary);
    let (json_path, md_path) = report.write_to(&config.reports_directory())?;

    for outcome in &summary.outcomes {
        let detail = match (&outcome.error, &outcome.document_type) {
            (Some(e), _) => format!("{}: {}", e.kind, e.message),
            (None, Some(doc_type)) => doc_type.clone(),
            (None, None) => outcome.prompt_name.clone().unwrap_or_default(),
        };
        println!("{:<10} {}  {}", outcome.state, outcome.file_name, detail);
    }
    println!();
    println!(
        "Batch {}: {} of {} succeeded, {} failed{}",
        report.batch_id,
        report.successful,
        report.total_files,
        report.failed,
        if dry_run { " (dry run)" } else { "" }
    );
    if let Some(reason) = &report.aborted {
        println!("Aborted: {}", reason);
    }
    println!("Reports: {} and {}", json_path.display(), md_path.display());

    Ok(summary.all_succeeded())
}

/// Stable id for a file that is not in the tracking store.
fn adhoc_id(path: &Path) -> String {
    format!("adhoc-{}", doclassify::sanitize::hash_path(path))
}

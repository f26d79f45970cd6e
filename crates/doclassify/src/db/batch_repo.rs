//! Batch run records: the `processing_batches` table.

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{now_rfc3339, Database, DatabaseError};

pub const BATCH_RUNNING: &str = "running";
pub const BATCH_COMPLETED: &str = "completed";
pub const BATCH_ABORTED: &str = "aborted";

/// One failed document as recorded on a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchErrorEntry {
    pub document_id: String,
    pub file_name: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub id: String,
    pub total_requested: u64,
    pub batch_size: u32,
    pub retry_budget: u32,
    pub successful_count: u64,
    pub failed_count: u64,
    pub status: String,
    pub errors: Vec<BatchErrorEntry>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl BatchRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let raw_errors: String = row.get("errors")?;
        let errors = serde_json::from_str(&raw_errors).map_err(|e| {
            let index = row.as_ref().column_index("errors").unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
        })?;

        Ok(Self {
            id: row.get("id")?,
            total_requested: row.get("total_requested")?,
            batch_size: row.get("batch_size")?,
            retry_budget: row.get("retry_budget")?,
            successful_count: row.get("successful_count")?,
            failed_count: row.get("failed_count")?,
            status: row.get("status")?,
            errors,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Records the start of a batch run.
pub fn insert(
    db: &Database,
    id: &str,
    total_requested: u64,
    batch_size: u32,
    retry_budget: u32,
    started_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO processing_batches (id, total_requested, batch_size, retry_budget,
             status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, total_requested, batch_size, retry_budget, BATCH_RUNNING, started_at],
        )?;
        Ok(())
    })
}

/// Writes the final tallies. Only a running batch can be completed; a
/// second call reports `NotFound`.
pub fn complete(
    db: &Database,
    id: &str,
    successful: u64,
    failed: u64,
    status: &str,
    errors: &[BatchErrorEntry],
) -> Result<(), DatabaseError> {
    let errors_json = serde_json::to_string(errors)
        .map_err(|source| DatabaseError::Json { column: "errors", source })?;

    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processing_batches
             SET successful_count = ?2, failed_count = ?3, status = ?4, errors = ?5,
                 completed_at = ?6
             WHERE id = ?1 AND status = ?7",
            params![id, successful, failed, status, errors_json, now_rfc3339(), BATCH_RUNNING],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "processing_batches",
                id: id.to_string(),
            });
        }
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<BatchRow>, DatabaseError> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT * FROM processing_batches WHERE id = ?1",
            params![id],
            BatchRow::from_row,
        )
        .optional()
        .map_err(DatabaseError::from)
    })
}

/// Most recent batches first.
pub fn list_recent(db: &Database, limit: u32) -> Result<Vec<BatchRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM processing_batches ORDER BY started_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], BatchRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

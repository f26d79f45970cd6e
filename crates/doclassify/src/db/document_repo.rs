//! Document repository: the `documents` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{now_rfc3339, Database, DatabaseError};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_CLASSIFIED: &str = "classified";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_DELETED: &str = "deleted";

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRow {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub mime_type: String,
    pub drive_id: Option<String>,
    pub pipeline_status: String,
    pub is_deleted: bool,
    pub document_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentRow {
    /// A new pending document with a fresh id.
    pub fn new_pending(
        file_path: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            drive_id: None,
            pipeline_status: STATUS_PENDING.to_string(),
            is_deleted: false,
            document_type: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_path: row.get("file_path")?,
            file_name: row.get("file_name")?,
            mime_type: row.get("mime_type")?,
            drive_id: row.get("drive_id")?,
            pipeline_status: row.get("pipeline_status")?,
            is_deleted: row.get("is_deleted")?,
            document_type: row.get("document_type")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn insert(db: &Database, doc: &DocumentRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (id, file_path, file_name, mime_type, drive_id,
             pipeline_status, is_deleted, document_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                doc.id,
                doc.file_path,
                doc.file_name,
                doc.mime_type,
                doc.drive_id,
                doc.pipeline_status,
                doc.is_deleted,
                doc.document_type,
                doc.created_at,
                doc.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Registers `doc` unless a document with the same path exists. Returns the
/// stored row and whether it was newly inserted. A row flagged deleted whose
/// path is registered again goes back to pending.
pub fn register(db: &Database, doc: &DocumentRow) -> Result<(DocumentRow, bool), DatabaseError> {
    let inserted = db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO documents (id, file_path, file_name, mime_type, drive_id,
             pipeline_status, is_deleted, document_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(file_path) DO NOTHING",
            params![
                doc.id,
                doc.file_path,
                doc.file_name,
                doc.mime_type,
                doc.drive_id,
                doc.pipeline_status,
                doc.is_deleted,
                doc.document_type,
                doc.created_at,
                doc.updated_at,
            ],
        )?;
        if changed > 0 {
            return Ok(true);
        }
        conn.execute(
            "UPDATE documents SET is_deleted = 0, pipeline_status = ?2, updated_at = ?3
             WHERE file_path = ?1 AND is_deleted = 1",
            params![doc.file_path, STATUS_PENDING, now_rfc3339()],
        )?;
        Ok(false)
    })?;

    let stored = find_by_path(db, &doc.file_path)?.ok_or_else(|| DatabaseError::NotFound {
        table: "documents",
        id: doc.file_path.clone(),
    })?;
    Ok((stored, inserted))
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT * FROM documents WHERE id = ?1",
            params![id],
            DocumentRow::from_row,
        )
        .optional()
        .map_err(DatabaseError::from)
    })
}

pub fn find_by_path(db: &Database, file_path: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT * FROM documents WHERE file_path = ?1",
            params![file_path],
            DocumentRow::from_row,
        )
        .optional()
        .map_err(DatabaseError::from)
    })
}

/// Pending, non-deleted documents, oldest first.
pub fn find_pending(db: &Database, limit: Option<u64>) -> Result<Vec<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT * FROM documents
             WHERE pipeline_status = ?1 AND is_deleted = 0
             ORDER BY created_at ASC, id ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![STATUS_PENDING, limit], DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn set_status(db: &Database, id: &str, status: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET pipeline_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, now_rfc3339()],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "documents",
                id: id.to_string(),
            });
        }
        Ok(())
    })
}

/// Flips the deleted flag. Idempotent.
pub fn mark_deleted(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET is_deleted = 1, pipeline_status = ?2, updated_at = ?3
             WHERE id = ?1",
            params![id, STATUS_DELETED, now_rfc3339()],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "documents",
                id: id.to_string(),
            });
        }
        Ok(())
    })
}

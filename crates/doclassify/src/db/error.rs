//! Database error types.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A JSON column could not be encoded or decoded.
    #[error("Invalid JSON in column '{column}': {source}")]
    Json {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{table} row '{id}' not found")]
    NotFound { table: &'static str, id: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// Busy and locked databases clear up on their own; everything else
    /// (constraints, schema, I/O) will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::db::document_repo::{self, DocumentRow};
use crate::db::{Database, DatabaseError};
use crate::error::BatchError;
use crate::extractor::{detect_mime_type, FormatFamily};
use crate::sanitize;

/// A file the pipeline knows how to classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub discovered: usize,
    pub registered: usize,
    pub already_tracked: usize,
}

/// Finds classifiable files under a directory.
pub struct DirectoryScanner {
    root: PathBuf,
    recursive: bool,
}

impl DirectoryScanner {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files with a known format family, sorted by path. Hidden files and
    /// directories are skipped.
    pub fn scan(&self) -> Result<Vec<ScannedFile>, BatchError> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_str()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(BatchError::ScanFailed {
                        path: self.root.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let mime_type = detect_mime_type(path);
            if FormatFamily::from_mime(&mime_type).is_none() {
                debug!("Skipping unsupported file {} ({})", sanitize::redact_path(path), mime_type);
                continue;
            }

            files.push(ScannedFile {
                path: path.to_path_buf(),
                file_name: sanitize::redact_path(path),
                mime_type,
            });
        }

        info!(
            "Scanned {} documents in {} (id {})",
            files.len(),
            sanitize::redact_path(&self.root),
            sanitize::hash_path(&self.root)
        );
        Ok(files)
    }

    /// Scans and registers every file as a pending document. Files already
    /// tracked under the same path are left untouched.
    pub fn register(&self, db: &Database) -> Result<ScanSummary, ScanError> {
        let files = self.scan()?;
        let mut summary = ScanSummary {
            discovered: files.len(),
            ..ScanSummary::default()
        };

        for file in files {
            let path = std::fs::canonicalize(&file.path).unwrap_or(file.path);
            let row = DocumentRow::new_pending(path.to_string_lossy(), file.file_name, file.mime_type);
            let (_, inserted) = document_repo::register(db, &row)?;
            if inserted {
                summary.registered += 1;
            } else {
                summary.already_tracked += 1;
            }
        }

        info!(
            "Registered {} new documents ({} already tracked)",
            summary.registered, summary.already_tracked
        );
        Ok(summary)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Scan(#[from] BatchError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn is_hidden(name: Option<&str>) -> bool {
    name.map(|n| n.starts_with('.') && n.len() > 1 && n != "..")
        .unwrap_or(false)
}

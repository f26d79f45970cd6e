//! Helpers for sanitizing data before it enters logs and span attributes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Short deterministic hash of a path, for correlating log lines without
/// exposing the path.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/Documents/protocol.docx")),
            "protocol.docx"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_hash_path_deterministic() {
        let path = PathBuf::from("/data/scans/notes.md");
        assert_eq!(hash_path(&path), hash_path(&path));
        assert_ne!(hash_path(&path), hash_path(Path::new("/data/scans/other.md")));
        assert_eq!(hash_path(&path).len(), 16);
    }
}

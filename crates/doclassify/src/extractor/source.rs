//! Where document bytes come from: the local filesystem or Google Drive.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ExtractionConfig;
use crate::error::{ConfigError, ExtractionError};
use crate::sanitize::redact_path;
use crate::secrets::SecretError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentSource {
    Local { path: PathBuf },
    Drive { file_id: String },
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Local { path } => write!(f, "{}", path.display()),
            DocumentSource::Drive { file_id } => write!(f, "drive:{}", file_id),
        }
    }
}

/// Blocking HTTP GET. A trait so tests can serve Drive content from memory.
pub trait RemoteFetcher: Send + Sync {
    fn get(&self, url: &str, bearer: Option<&str>) -> Result<Vec<u8>, ExtractionError>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }
}

impl RemoteFetcher for HttpFetcher {
    fn get(&self, url: &str, bearer: Option<&str>) -> Result<Vec<u8>, ExtractionError> {
        let mut request = self.client.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| ExtractionError::DownloadFailed {
            location: url.to_string(),
            reason: if e.is_timeout() {
                "download timed out".to_string()
            } else {
                e.to_string()
            },
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ExtractionError::SourceMissing(url.to_string()));
        }
        if !status.is_success() {
            return Err(ExtractionError::DownloadFailed {
                location: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ExtractionError::DownloadFailed {
                location: url.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Reads local files and downloads or exports Drive files.
#[derive(Clone)]
pub struct SourceLoader {
    fetcher: Option<Arc<dyn RemoteFetcher>>,
    drive_api_url: String,
    drive_token: Option<Arc<SecretString>>,
}

impl SourceLoader {
    pub fn new(
        fetcher: Arc<dyn RemoteFetcher>,
        drive_api_url: impl Into<String>,
        drive_token: Option<SecretString>,
    ) -> Self {
        Self {
            fetcher: Some(fetcher),
            drive_api_url: drive_api_url.into().trim_end_matches('/').to_string(),
            drive_token: drive_token.map(Arc::new),
        }
    }

    /// Local files only; any Drive source fails with `DownloadFailed`.
    pub fn offline() -> Self {
        Self {
            fetcher: None,
            drive_api_url: String::new(),
            drive_token: None,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ConfigError> {
        // A missing token only matters once a Drive document shows up.
        let drive_token = match config.drive_token.resolve() {
            Ok(token) => Some(token),
            Err(SecretError::NoSourceProvided) | Err(SecretError::EnvVarNotSet { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        let fetcher = HttpFetcher::new(config.download_timeout())?;
        Ok(Self::new(
            Arc::new(fetcher),
            config.drive_api_url.clone(),
            drive_token,
        ))
    }

    /// Raw bytes of the source. Missing local files and Drive 404s are
    /// reported as `SourceMissing`.
    pub fn read(&self, source: &DocumentSource) -> Result<Vec<u8>, ExtractionError> {
        match source {
            DocumentSource::Local { path } => std::fs::read(path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractionError::SourceMissing(redact_path(path))
                } else {
                    ExtractionError::corrupt(path.display().to_string(), e)
                }
            }),
            DocumentSource::Drive { file_id } => {
                self.fetch(&[file_id.as_str()], &[("alt", "media")])
            }
        }
    }

    /// Exports a native Google Workspace file in `export_mime`.
    pub fn export(&self, file_id: &str, export_mime: &str) -> Result<Vec<u8>, ExtractionError> {
        self.fetch(&[file_id, "export"], &[("mimeType", export_mime)])
    }

    /// Drive API URL with `segments` appended to the base path. Segments and
    /// query values are percent-encoded.
    fn drive_url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, ExtractionError> {
        let invalid = |reason: String| ExtractionError::DownloadFailed {
            location: self.drive_api_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.drive_api_url)
            .map_err(|e| invalid(format!("invalid Drive API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| invalid("Drive API URL cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    fn fetch(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Vec<u8>, ExtractionError> {
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| ExtractionError::DownloadFailed {
                location: format!("drive:{}", segments.first().copied().unwrap_or_default()),
                reason: "remote sources are disabled".to_string(),
            })?;

        let url = self.drive_url(segments, query)?;
        let bearer = self.drive_token.as_ref().map(|t| t.expose_secret());
        fetcher.get(url.as_str(), bearer)
    }
}

impl fmt::Debug for SourceLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceLoader")
            .field("remote", &self.fetcher.is_some())
            .field("drive_api_url", &self.drive_api_url)
            .field("drive_token", &self.drive_token.as_ref().map(|_| "****"))
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies by URL and records requested URLs.
    #[derive(Default)]
    pub(crate) struct StaticFetcher {
        pub bodies: HashMap<String, Vec<u8>>,
        pub requested: Mutex<Vec<String>>,
    }

    impl RemoteFetcher for StaticFetcher {
        fn get(&self, url: &str, _bearer: Option<&str>) -> Result<Vec<u8>, ExtractionError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| ExtractionError::SourceMissing(url.to_string()))
        }
    }

    #[test]
    fn test_read_local_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), b"hello").unwrap();

        let loader = SourceLoader::offline();
        let bytes = loader
            .read(&DocumentSource::Local {
                path: temp.path().to_path_buf(),
            })
            .unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_missing_local_file_is_source_missing() {
        let loader = SourceLoader::offline();
        let result = loader.read(&DocumentSource::Local {
            path: PathBuf::from("/nonexistent/report.pdf"),
        });
        assert!(matches!(result, Err(ExtractionError::SourceMissing(_))));
    }

    #[test]
    fn test_offline_loader_rejects_drive() {
        let loader = SourceLoader::offline();
        let result = loader.read(&DocumentSource::Drive {
            file_id: "abc".to_string(),
        });
        assert!(matches!(result, Err(ExtractionError::DownloadFailed { .. })));
    }

    #[test]
    fn test_drive_urls() {
        let mut fetcher = StaticFetcher::default();
        fetcher
            .bodies
            .insert("https://drive.test/files/f1?alt=media".to_string(), b"raw".to_vec());
        fetcher.bodies.insert(
            "https://drive.test/files/f2/export?mimeType=text%2Fplain".to_string(),
            b"exported".to_vec(),
        );
        let loader = SourceLoader::new(Arc::new(fetcher), "https://drive.test/files/", None);

        let raw = loader
            .read(&DocumentSource::Drive {
                file_id: "f1".to_string(),
            })
            .unwrap();
        assert_eq!(raw, b"raw");
        assert_eq!(loader.export("f2", "text/plain").unwrap(), b"exported");
    }

    #[test]
    fn test_drive_urls_are_percent_encoded() {
        let mut fetcher = StaticFetcher::default();
        fetcher.bodies.insert(
            "https://drive.test/files/a%20b/export?mimeType=application%2Fvnd.x%2Bjson%26v%3D2"
                .to_string(),
            b"ok".to_vec(),
        );
        let loader = SourceLoader::new(Arc::new(fetcher), "https://drive.test/files", None);

        assert_eq!(loader.export("a b", "application/vnd.x+json&v=2").unwrap(), b"ok");
    }

    #[test]
    fn test_invalid_drive_api_url() {
        let loader = SourceLoader::new(Arc::new(StaticFetcher::default()), "not a url", None);
        let result = loader.read(&DocumentSource::Drive {
            file_id: "f1".to_string(),
        });
        assert!(matches!(result, Err(ExtractionError::DownloadFailed { .. })));
    }

    #[test]
    fn test_source_display() {
        let drive = DocumentSource::Drive {
            file_id: "1AbC".to_string(),
        };
        assert_eq!(drive.to_string(), "drive:1AbC");
    }
}

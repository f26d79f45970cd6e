pub mod image;
pub mod media;
pub mod office;
pub mod presentation;
pub mod source;
pub mod spreadsheet;
pub mod text;
pub mod workspace;
mod xml;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::normalize_mime;
use crate::error::ExtractionError;

pub use source::{DocumentSource, HttpFetcher, RemoteFetcher, SourceLoader};

pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_GOOGLE_DOC: &str = "application/vnd.google-apps.document";
pub const MIME_GOOGLE_SHEET: &str = "application/vnd.google-apps.spreadsheet";
pub const MIME_GOOGLE_SLIDES: &str = "application/vnd.google-apps.presentation";

const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps.";

/// Non-`text/*` MIME types whose content is read directly as text.
const TEXT_LIKE_MIMES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/x-sh",
    "application/x-shellscript",
    "application/javascript",
    "application/typescript",
    "application/x-yaml",
    "application/toml",
    "application/sql",
];

/// Extensions `mime_guess` gets wrong or does not know, for the script and
/// markup files this pipeline sees most.
const EXTENSION_OVERRIDES: &[(&str, &str)] = &[
    ("md", "text/markdown"),
    ("markdown", "text/markdown"),
    ("ts", "application/typescript"),
    ("tsx", "application/typescript"),
    ("py", "text/x-python"),
    ("sh", "application/x-sh"),
    ("bash", "application/x-sh"),
    ("zsh", "application/x-sh"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("csv", MIME_CSV),
];

/// Closed set of extraction strategies. Every supported MIME type maps to
/// exactly one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFamily {
    Text,
    Office,
    Presentation,
    Spreadsheet,
    GoogleWorkspace,
    Media,
    Image,
}

impl FormatFamily {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let mime = normalize_mime(mime_type);
        if mime.is_empty() {
            return None;
        }

        if mime.starts_with(GOOGLE_APPS_PREFIX) {
            return Some(FormatFamily::GoogleWorkspace);
        }

        match mime.as_str() {
            MIME_PDF | MIME_DOCX | "application/msword" => return Some(FormatFamily::Office),
            MIME_PPTX | "application/vnd.ms-powerpoint" => {
                return Some(FormatFamily::Presentation)
            }
            MIME_XLSX | MIME_CSV | "application/vnd.ms-excel" => {
                return Some(FormatFamily::Spreadsheet)
            }
            m if TEXT_LIKE_MIMES.contains(&m) => return Some(FormatFamily::Text),
            _ => {}
        }

        match mime.split('/').next() {
            Some("text") => Some(FormatFamily::Text),
            Some("audio") | Some("video") => Some(FormatFamily::Media),
            Some("image") => Some(FormatFamily::Image),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatFamily::Text => "text",
            FormatFamily::Office => "office",
            FormatFamily::Presentation => "presentation",
            FormatFamily::Spreadsheet => "spreadsheet",
            FormatFamily::GoogleWorkspace => "google_workspace",
            FormatFamily::Media => "media",
            FormatFamily::Image => "image",
        }
    }
}

impl fmt::Display for FormatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guesses a MIME type from a file name's extension.
pub fn detect_mime_type(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if let Some((_, mime)) = EXTENSION_OVERRIDES
        .iter()
        .find(|(ext, _)| *ext == extension.as_str())
    {
        return (*mime).to_string();
    }

    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// What to extract and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub source: DocumentSource,
    pub file_name: String,
    pub mime_type: String,
}

impl ExtractionRequest {
    pub fn local(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Self {
            source: DocumentSource::Local { path },
            file_name,
            mime_type: mime_type.into(),
        }
    }

    /// The MIME type to dispatch on: the declared one when it maps to a
    /// family, otherwise a guess from the file name.
    pub fn effective_mime(&self) -> String {
        if FormatFamily::from_mime(&self.mime_type).is_some() {
            return normalize_mime(&self.mime_type);
        }
        detect_mime_type(Path::new(&self.file_name))
    }

    pub fn family(&self) -> Option<FormatFamily> {
        FormatFamily::from_mime(&self.effective_mime())
    }

    pub(crate) fn location(&self) -> String {
        self.source.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContent {
    pub text: String,
    pub family: FormatFamily,
    /// Size of the raw source payload, when it was read.
    pub source_bytes: Option<usize>,
}

impl ExtractedContent {
    pub fn new(text: String, family: FormatFamily, source_bytes: Option<usize>) -> Self {
        Self {
            text,
            family,
            source_bytes,
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

pub trait ContentExtractor: Send + Sync {
    fn can_handle(&self, family: FormatFamily) -> bool;

    fn extract(
        &self,
        request: &ExtractionRequest,
        loader: &SourceLoader,
    ) -> Result<ExtractedContent, ExtractionError>;
}

pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn ContentExtractor>>,
    loader: SourceLoader,
}

impl ExtractorRegistry {
    pub fn new(loader: SourceLoader) -> Self {
        let extractors: Vec<Box<dyn ContentExtractor>> = vec![
            Box::new(text::TextExtractor),
            Box::new(office::OfficeExtractor),
            Box::new(presentation::PresentationExtractor),
            Box::new(spreadsheet::SpreadsheetExtractor::default()),
            Box::new(workspace::WorkspaceExtractor::new()),
            Box::new(media::MediaExtractor),
            Box::new(image::ImageExtractor),
        ];

        Self { extractors, loader }
    }

    pub fn extract(&self, request: &ExtractionRequest) -> Result<ExtractedContent, ExtractionError> {
        let family = request.family().ok_or_else(|| {
            let shown = if request.mime_type.is_empty() {
                request.file_name.clone()
            } else {
                request.mime_type.clone()
            };
            ExtractionError::UnsupportedFormat(shown)
        })?;

        let extractor = self
            .extractors
            .iter()
            .find(|e| e.can_handle(family))
            .ok_or_else(|| ExtractionError::UnsupportedFormat(family.to_string()))?;

        let content = extractor.extract(request, &self.loader)?;
        log::debug!(
            "Extracted {} chars from {} ({})",
            content.char_count(),
            crate::sanitize::redact_path(Path::new(&request.file_name)),
            family
        );
        Ok(content)
    }

    pub fn loader(&self) -> &SourceLoader {
        &self.loader
    }
}

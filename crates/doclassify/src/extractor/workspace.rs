use crate::error::ExtractionError;
use crate::extractor::text::decode_text;
use crate::extractor::{
    ContentExtractor, DocumentSource, ExtractedContent, ExtractionRequest, FormatFamily,
    SourceLoader, MIME_GOOGLE_DOC, MIME_GOOGLE_SHEET, MIME_GOOGLE_SLIDES,
};

/// Native Google Docs, Sheets and Slides. These have no binary content of
/// their own, so they are exported through the Drive API and read as text.
pub struct WorkspaceExtractor {
    exports: Vec<(&'static str, &'static str)>,
}

impl WorkspaceExtractor {
    pub fn new() -> Self {
        Self {
            exports: vec![
                (MIME_GOOGLE_DOC, "text/plain"),
                (MIME_GOOGLE_SHEET, "text/csv"),
                (MIME_GOOGLE_SLIDES, "text/plain"),
            ],
        }
    }

    pub fn export_mime(&self, mime_type: &str) -> Option<&'static str> {
        self.exports
            .iter()
            .find(|(native, _)| *native == mime_type)
            .map(|(_, export)| *export)
    }
}

impl Default for WorkspaceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for WorkspaceExtractor {
    fn can_handle(&self, family: FormatFamily) -> bool {
        matches!(family, FormatFamily::GoogleWorkspace)
    }

    fn extract(
        &self,
        request: &ExtractionRequest,
        loader: &SourceLoader,
    ) -> Result<ExtractedContent, ExtractionError> {
        let mime = request.effective_mime();
        let export_mime = self
            .export_mime(&mime)
            .ok_or_else(|| ExtractionError::UnsupportedFormat(mime.clone()))?;

        let file_id = match &request.source {
            DocumentSource::Drive { file_id } => file_id,
            DocumentSource::Local { .. } => {
                return Err(ExtractionError::UnsupportedFormat(format!(
                    "{} (only exportable from Drive)",
                    mime
                )))
            }
        };

        let bytes = loader.export(file_id, export_mime)?;
        Ok(ExtractedContent::new(
            decode_text(&bytes),
            FormatFamily::GoogleWorkspace,
            Some(bytes.len()),
        ))
    }
}

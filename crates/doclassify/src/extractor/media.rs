use crate::error::ExtractionError;
use crate::extractor::{
    ContentExtractor, DocumentSource, ExtractedContent, ExtractionRequest, FormatFamily,
    SourceLoader,
};

/// Audio and video. Only metadata is produced; transcripts come from a
/// separate transcription step and are classified as their own documents.
pub struct MediaExtractor;

impl ContentExtractor for MediaExtractor {
    fn can_handle(&self, family: FormatFamily) -> bool {
        matches!(family, FormatFamily::Media)
    }

    fn extract(
        &self,
        request: &ExtractionRequest,
        _loader: &SourceLoader,
    ) -> Result<ExtractedContent, ExtractionError> {
        let mime = request.effective_mime();
        let kind = if mime.starts_with("video/") {
            "video"
        } else {
            "audio"
        };

        let mut lines = vec![
            format!("Media file ({})", kind),
            format!("File name: {}", request.file_name),
            format!("MIME type: {}", mime),
        ];

        // Never download the media payload; a stat is enough.
        let size = match &request.source {
            DocumentSource::Local { path } => {
                let metadata = std::fs::metadata(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ExtractionError::SourceMissing(crate::sanitize::redact_path(path))
                    } else {
                        ExtractionError::corrupt(request.location(), e)
                    }
                })?;
                lines.push(format!("Size: {} bytes", metadata.len()));
                Some(metadata.len() as usize)
            }
            DocumentSource::Drive { file_id } => {
                lines.push(format!("Drive file id: {}", file_id));
                None
            }
        };
        lines.push("Transcript: not available".to_string());

        Ok(ExtractedContent::new(
            lines.join("\n"),
            FormatFamily::Media,
            size,
        ))
    }
}

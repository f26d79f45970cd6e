use crate::error::ExtractionError;
use crate::extractor::{
    ContentExtractor, ExtractedContent, ExtractionRequest, FormatFamily, SourceLoader,
};

/// Plain text, markdown, scripts and other text-like formats: read as-is.
pub struct TextExtractor;

impl ContentExtractor for TextExtractor {
    fn can_handle(&self, family: FormatFamily) -> bool {
        matches!(family, FormatFamily::Text)
    }

    fn extract(
        &self,
        request: &ExtractionRequest,
        loader: &SourceLoader,
    ) -> Result<ExtractedContent, ExtractionError> {
        let bytes = loader.read(&request.source)?;
        if looks_binary(&bytes) {
            return Err(ExtractionError::corrupt(
                request.location(),
                "declared as text but contains binary data",
            ));
        }

        let text = decode_text(&bytes);
        Ok(ExtractedContent::new(text, FormatFamily::Text, Some(bytes.len())))
    }
}

/// UTF-8 with an optional BOM; invalid sequences are replaced.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// NUL bytes in the first 8 KiB mean the file is not text.
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn extract(bytes: &[u8], suffix: &str, mime: &str) -> Result<ExtractedContent, ExtractionError> {
        let mut temp_file = NamedTempFile::with_suffix(suffix).unwrap();
        temp_file.write_all(bytes).unwrap();
        let request = ExtractionRequest::local(temp_file.path(), mime);
        TextExtractor.extract(&request, &SourceLoader::offline())
    }

    #[test]
    fn test_supports_text_family() {
        assert!(TextExtractor.can_handle(FormatFamily::Text));
        assert!(!TextExtractor.can_handle(FormatFamily::Office));
        assert!(!TextExtractor.can_handle(FormatFamily::Media));
    }

    #[test]
    fn test_extract_script() {
        let content = extract(b"#!/bin/sh\necho hello\n", ".sh", "application/x-sh").unwrap();
        assert_eq!(content.text, "#!/bin/sh\necho hello\n");
        assert_eq!(content.source_bytes, Some(21));
    }

    #[test]
    fn test_strips_bom() {
        let content = extract(b"\xEF\xBB\xBF# Title", ".md", "text/markdown").unwrap();
        assert_eq!(content.text, "# Title");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let content = extract(b"caf\xE9", ".txt", "text/plain").unwrap();
        assert!(content.text.starts_with("caf"));
    }

    #[test]
    fn test_binary_content_is_corrupt() {
        let result = extract(b"\x7fELF\x00\x00\x01", ".txt", "text/plain");
        assert!(matches!(result, Err(ExtractionError::CorruptFile { .. })));
    }

    #[test]
    fn test_empty_file() {
        let content = extract(b"", ".txt", "text/plain").unwrap();
        assert!(content.text.is_empty());
    }
}

use std::io::Cursor;

use crate::error::ExtractionError;
use crate::extractor::xml::{collect_text, read_entry};
use crate::extractor::{
    ContentExtractor, ExtractedContent, ExtractionRequest, FormatFamily, SourceLoader, MIME_DOCX,
    MIME_PDF,
};

/// Marker lopdf emits for CID fonts it cannot decode.
const IDENTITY_H_MARKER: &str = "?Identity-H Unimplemented?";

/// Word documents and PDFs.
pub struct OfficeExtractor;

impl ContentExtractor for OfficeExtractor {
    fn can_handle(&self, family: FormatFamily) -> bool {
        matches!(family, FormatFamily::Office)
    }

    fn extract(
        &self,
        request: &ExtractionRequest,
        loader: &SourceLoader,
    ) -> Result<ExtractedContent, ExtractionError> {
        let mime = request.effective_mime();
        let location = request.location();

        // Reject legacy binary formats before paying for a download.
        if mime != MIME_DOCX && mime != MIME_PDF {
            return Err(ExtractionError::UnsupportedFormat(mime));
        }

        let bytes = loader.read(&request.source)?;
        let text = if mime == MIME_PDF {
            extract_pdf_text(&bytes, &location)?
        } else {
            extract_docx_text(&bytes, &location)?
        };

        Ok(ExtractedContent::new(
            text,
            FormatFamily::Office,
            Some(bytes.len()),
        ))
    }
}

pub(crate) fn extract_docx_text(bytes: &[u8], location: &str) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::corrupt(location, format!("not a DOCX archive: {}", e)))?;

    let xml = read_entry(&mut archive, "word/document.xml")
        .ok_or_else(|| ExtractionError::corrupt(location, "missing word/document.xml"))?
        .map_err(|e| ExtractionError::corrupt(location, e))?;

    collect_text(&xml, b"t", b"p")
        .map_err(|e| ExtractionError::corrupt(location, format!("XML parsing error: {}", e)))
}

pub(crate) fn extract_pdf_text(bytes: &[u8], location: &str) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ExtractionError::corrupt(location, format!("unreadable PDF: {}", e)))?;

    if doc.is_encrypted() {
        return Err(ExtractionError::corrupt(location, "PDF is encrypted"));
    }

    let pages = doc.get_pages();
    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text.replace(IDENTITY_H_MARKER, ""));
                text.push('\n');
            }
            Err(e) => log::debug!("Skipping PDF page {} of {}: {}", page_num, location, e),
        }
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        // Scanned PDFs still get classified on their file name.
        return Ok(format!(
            "[PDF with {} page(s) and no extractable text layer]",
            pages.len()
        ));
    }

    Ok(text)
}

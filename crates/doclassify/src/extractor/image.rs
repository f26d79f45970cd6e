use std::io::Cursor;

use image::ImageReader;

use crate::error::ExtractionError;
use crate::extractor::{
    ContentExtractor, ExtractedContent, ExtractionRequest, FormatFamily, SourceLoader,
};

/// Images: format and pixel dimensions only. No OCR.
pub struct ImageExtractor;

impl ContentExtractor for ImageExtractor {
    fn can_handle(&self, family: FormatFamily) -> bool {
        matches!(family, FormatFamily::Image)
    }

    fn extract(
        &self,
        request: &ExtractionRequest,
        loader: &SourceLoader,
    ) -> Result<ExtractedContent, ExtractionError> {
        let _span = tracing::info_span!("extractor.image").entered();

        let bytes = loader.read(&request.source)?;
        let mut lines = vec![
            "Image file".to_string(),
            format!("File name: {}", request.file_name),
            format!("MIME type: {}", request.effective_mime()),
        ];

        let reader = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| ExtractionError::corrupt(request.location(), e))?;

        // Formats the decoder does not know (SVG, HEIC) still get basic metadata.
        if let Some(format) = reader.format() {
            let (width, height) = reader
                .into_dimensions()
                .map_err(|e| ExtractionError::corrupt(request.location(), e))?;
            lines.push(format!("Format: {:?}", format));
            lines.push(format!("Dimensions: {}x{} px", width, height));
        }
        lines.push(format!("Size: {} bytes", bytes.len()));

        Ok(ExtractedContent::new(
            lines.join("\n"),
            FormatFamily::Image,
            Some(bytes.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn extract(bytes: &[u8], suffix: &str, mime: &str) -> Result<ExtractedContent, ExtractionError> {
        let mut temp_file = NamedTempFile::with_suffix(suffix).unwrap();
        temp_file.write_all(bytes).unwrap();
        let request = ExtractionRequest::local(temp_file.path(), mime);
        ImageExtractor.extract(&request, &SourceLoader::offline())
    }

    #[test]
    fn test_png_dimensions() {
        let content = extract(&png_bytes(40, 30), ".png", "image/png").unwrap();
        assert!(content.text.contains("Dimensions: 40x30 px"));
        assert!(content.text.contains("Format: Png"));
        assert_eq!(content.family, FormatFamily::Image);
    }

    #[test]
    fn test_unknown_image_format_still_described() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"/>"#;
        let content = extract(svg, ".svg", "image/svg+xml").unwrap();
        assert!(content.text.contains("MIME type: image/svg+xml"));
        assert!(!content.text.contains("Dimensions"));
    }

    #[test]
    fn test_truncated_png_is_corrupt() {
        let bytes = png_bytes(8, 8);
        let result = extract(&bytes[..12], ".png", "image/png");
        assert!(matches!(result, Err(ExtractionError::CorruptFile { .. })));
    }
}

use std::io::{Cursor, Read, Seek};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ExtractionError;
use crate::extractor::xml::{collect_text, numbered_entries, read_entry};
use crate::extractor::{
    ContentExtractor, ExtractedContent, ExtractionRequest, FormatFamily, SourceLoader, MIME_PPTX,
};

const SLIDES_PREFIX: &str = "ppt/slides/slide";

/// PPTX decks: slide text followed by the speaker notes of each slide.
pub struct PresentationExtractor;

impl ContentExtractor for PresentationExtractor {
    fn can_handle(&self, family: FormatFamily) -> bool {
        matches!(family, FormatFamily::Presentation)
    }

    fn extract(
        &self,
        request: &ExtractionRequest,
        loader: &SourceLoader,
    ) -> Result<ExtractedContent, ExtractionError> {
        let mime = request.effective_mime();
        if mime != MIME_PPTX {
            return Err(ExtractionError::UnsupportedFormat(mime));
        }

        let bytes = loader.read(&request.source)?;
        let text = extract_pptx_text(&bytes, &request.location())?;
        Ok(ExtractedContent::new(
            text,
            FormatFamily::Presentation,
            Some(bytes.len()),
        ))
    }
}

pub(crate) fn extract_pptx_text(bytes: &[u8], location: &str) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::corrupt(location, format!("not a PPTX archive: {}", e)))?;

    let slides = numbered_entries(&archive, SLIDES_PREFIX);
    if slides.is_empty() {
        return Err(ExtractionError::corrupt(location, "presentation has no slides"));
    }

    let mut sections = Vec::with_capacity(slides.len());
    for (index, slide_name) in slides.iter().enumerate() {
        let slide_text = read_xml_text(&mut archive, slide_name, location)?;

        let notes_text = match notes_target(&mut archive, slide_name) {
            Some(notes_name) => read_xml_text(&mut archive, &notes_name, location)?,
            None => String::new(),
        };

        let mut section = format!("Slide {}:\n{}", index + 1, slide_text);
        if !notes_text.is_empty() {
            section.push_str("\nSpeaker notes:\n");
            section.push_str(&notes_text);
        }
        sections.push(section);
    }

    Ok(sections.join("\n\n"))
}

fn read_xml_text<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
    location: &str,
) -> Result<String, ExtractionError> {
    let xml = read_entry(archive, name)
        .ok_or_else(|| ExtractionError::corrupt(location, format!("missing {}", name)))?
        .map_err(|e| ExtractionError::corrupt(location, e))?;

    collect_text(&xml, b"t", b"p")
        .map_err(|e| ExtractionError::corrupt(location, format!("{}: {}", name, e)))
}

/// Follows `ppt/slides/_rels/slideN.xml.rels` to the slide's notes part.
fn notes_target<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, slide_name: &str) -> Option<String> {
    let file_name = slide_name.rsplit('/').next()?;
    let rels_name = format!("ppt/slides/_rels/{}.rels", file_name);
    let rels = read_entry(archive, &rels_name)?.ok()?;

    let mut reader = Reader::from_str(&rels);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut is_notes = false;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    match attr.key.local_name().as_ref() {
                        b"Type" => is_notes = value.ends_with("/notesSlide"),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if let (true, Some(target)) = (is_notes, target) {
                    return Some(resolve_relative(&target));
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// `../notesSlides/notesSlide1.xml` relative to `ppt/slides/`.
fn resolve_relative(target: &str) -> String {
    match target.strip_prefix("../") {
        Some(rest) => format!("ppt/{}", rest),
        None if target.starts_with('/') => target.trim_start_matches('/').to_string(),
        None => format!("ppt/slides/{}", target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn slide_xml(lines: &[&str]) -> String {
        let paragraphs: String = lines
            .iter()
            .map(|l| format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", l))
            .collect();
        format!(
            r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody>{}</p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
            paragraphs
        )
    }

    fn build_pptx(slides: &[(&[&str], Option<&str>)]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            for (i, (lines, notes)) in slides.iter().enumerate() {
                let n = i + 1;
                zip.start_file(format!("ppt/slides/slide{}.xml", n), options)
                    .unwrap();
                zip.write_all(slide_xml(lines).as_bytes()).unwrap();

                if let Some(notes) = notes {
                    zip.start_file(format!("ppt/slides/_rels/slide{}.xml.rels", n), options)
                        .unwrap();
                    let rels = format!(
                        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesSlide" Target="../notesSlides/notesSlide{}.xml"/></Relationships>"#,
                        n
                    );
                    zip.write_all(rels.as_bytes()).unwrap();

                    zip.start_file(format!("ppt/notesSlides/notesSlide{}.xml", n), options)
                        .unwrap();
                    zip.write_all(slide_xml(&[notes]).as_bytes()).unwrap();
                }
            }
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_slides_and_notes_in_order() {
        let mut slides: Vec<(&[&str], Option<&str>)> = Vec::new();
        for _ in 0..9 {
            slides.push((&["Filler"], None));
        }
        slides.insert(0, (&["Grand Rounds", "Cardiology"], Some("Welcome everyone")));
        slides.push((&["Questions?"], None));

        let text = extract_pptx_text(&build_pptx(&slides), "deck.pptx").unwrap();
        assert!(text.starts_with("Slide 1:\nGrand Rounds\nCardiology\nSpeaker notes:\nWelcome everyone"));
        // slide10 must sort after slide2
        assert!(text.ends_with("Slide 11:\nQuestions?"));
    }

    #[test]
    fn test_no_slides_is_corrupt() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            zip.start_file("ppt/presentation.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<p:presentation/>").unwrap();
            zip.finish().unwrap();
        }
        let result = extract_pptx_text(&buffer.into_inner(), "empty.pptx");
        assert!(matches!(result, Err(ExtractionError::CorruptFile { .. })));
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative("../notesSlides/notesSlide3.xml"),
            "ppt/notesSlides/notesSlide3.xml"
        );
        assert_eq!(resolve_relative("/ppt/notesSlides/n.xml"), "ppt/notesSlides/n.xml");
    }

    #[test]
    fn test_legacy_powerpoint_unsupported() {
        let request = ExtractionRequest::local("/tmp/old.ppt", "application/vnd.ms-powerpoint");
        let result = PresentationExtractor.extract(&request, &SourceLoader::offline());
        assert!(matches!(result, Err(ExtractionError::UnsupportedFormat(_))));
    }
}

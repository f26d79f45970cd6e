//! OOXML helpers shared by the DOCX, PPTX and XLSX extractors.

use std::io::{Read, Seek};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Collects the text of every `text_tag` element, ending a line at the close
/// of each `block_tag` element. Namespace prefixes are ignored, so `b"t"`
/// matches both `<w:t>` and `<a:t>`.
pub(crate) fn collect_text(
    xml: &str,
    text_tag: &[u8],
    block_tag: &[u8],
) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut text = String::new();
    let mut in_text_element = false;
    let mut block_has_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if e.local_name().as_ref() == text_tag => {
                in_text_element = true;
            }
            Event::End(ref e) => {
                let local_name = e.local_name();
                if local_name.as_ref() == text_tag {
                    in_text_element = false;
                } else if local_name.as_ref() == block_tag && block_has_text {
                    text.push('\n');
                    block_has_text = false;
                }
            }
            Event::Text(e) if in_text_element => {
                let decoded = e.decode().unwrap_or_default();
                if !decoded.is_empty() {
                    text.push_str(&decoded);
                    block_has_text = true;
                }
            }
            Event::GeneralRef(e) if in_text_element => {
                if let Some(resolved) = resolve_reference(&e) {
                    text.push_str(&resolved);
                    block_has_text = true;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text.trim_end().to_string())
}

pub(crate) fn resolve_reference(e: &quick_xml::events::BytesRef<'_>) -> Option<String> {
    if let Ok(Some(ch)) = e.resolve_char_ref() {
        return Some(ch.to_string());
    }
    let name = e.decode().ok()?;
    resolve_predefined_entity(&name).map(str::to_string)
}

/// Reads a zip entry as UTF-8. `None` when the entry does not exist.
pub(crate) fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Option<Result<String, std::io::Error>> {
    let mut entry = archive.by_name(name).ok()?;
    let mut content = String::new();
    Some(entry.read_to_string(&mut content).map(|_| content))
}

/// Zip entries under `prefix` ending in `.xml` whose stem ends in a number,
/// ordered by that number (`slide2.xml` before `slide10.xml`).
pub(crate) fn numbered_entries<R: Read + Seek>(
    archive: &zip::ZipArchive<R>,
    prefix: &str,
) -> Vec<String> {
    let mut entries: Vec<(u32, String)> = archive
        .file_names()
        .filter(|name| name.starts_with(prefix) && name.ends_with(".xml"))
        .filter_map(|name| {
            let stem = name[prefix.len()..].trim_end_matches(".xml");
            stem.parse::<u32>().ok().map(|n| (n, name.to_string()))
        })
        .collect();
    entries.sort_by_key(|(n, _)| *n);
    entries.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_docx_paragraphs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> World</w:t></w:r></w:p>
    <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
    <w:p></w:p>
  </w:body>
</w:document>"#;

        let text = collect_text(xml, b"t", b"p").unwrap();
        assert_eq!(text, "Hello World\nSecond paragraph");
    }

    #[test]
    fn test_collect_resolves_entities() {
        let xml = r#"<a:p xmlns:a="x"><a:r><a:t>Q&amp;A &lt;draft&gt;</a:t></a:r></a:p>"#;
        let text = collect_text(xml, b"t", b"p").unwrap();
        assert_eq!(text, "Q&A <draft>");
    }

    #[test]
    fn test_collect_ignores_text_outside_runs() {
        let xml = r#"<w:p xmlns:w="x"><w:instrText>PAGE</w:instrText><w:t>kept</w:t></w:p>"#;
        assert_eq!(collect_text(xml, b"t", b"p").unwrap(), "kept");
    }

    #[test]
    fn test_collect_malformed_xml() {
        assert!(collect_text("<w:p><w:t>oops</w:p>", b"t", b"p").is_err());
    }
}

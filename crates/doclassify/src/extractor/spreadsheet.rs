use std::io::Cursor;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ExtractionError;
use crate::extractor::xml::{numbered_entries, read_entry, resolve_reference};
use crate::extractor::{
    ContentExtractor, ExtractedContent, ExtractionRequest, FormatFamily, SourceLoader, MIME_CSV,
    MIME_XLSX,
};

const WORKSHEETS_PREFIX: &str = "xl/worksheets/sheet";
const DEFAULT_MAX_ROWS: usize = 500;

/// XLSX workbooks and CSV files, rendered as tab-separated rows per sheet.
pub struct SpreadsheetExtractor {
    /// Rows kept per sheet; the rest are summarized as a count.
    max_rows: usize,
}

impl SpreadsheetExtractor {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }
}

impl Default for SpreadsheetExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS)
    }
}

impl ContentExtractor for SpreadsheetExtractor {
    fn can_handle(&self, family: FormatFamily) -> bool {
        matches!(family, FormatFamily::Spreadsheet)
    }

    fn extract(
        &self,
        request: &ExtractionRequest,
        loader: &SourceLoader,
    ) -> Result<ExtractedContent, ExtractionError> {
        let mime = request.effective_mime();
        if mime != MIME_XLSX && mime != MIME_CSV {
            return Err(ExtractionError::UnsupportedFormat(mime));
        }

        let bytes = loader.read(&request.source)?;
        let text = if mime == MIME_XLSX {
            extract_xlsx_text(&bytes, &request.location(), self.max_rows)?
        } else {
            csv_to_rows(&String::from_utf8_lossy(&bytes), self.max_rows)
        };

        Ok(ExtractedContent::new(
            text,
            FormatFamily::Spreadsheet,
            Some(bytes.len()),
        ))
    }
}

pub(crate) fn extract_xlsx_text(
    bytes: &[u8],
    location: &str,
    max_rows: usize,
) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::corrupt(location, format!("not an XLSX archive: {}", e)))?;

    let shared_strings = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Some(xml) => {
            let xml = xml.map_err(|e| ExtractionError::corrupt(location, e))?;
            parse_shared_strings(&xml)
                .map_err(|e| ExtractionError::corrupt(location, format!("sharedStrings: {}", e)))?
        }
        None => Vec::new(),
    };

    let sheet_names = match read_entry(&mut archive, "xl/workbook.xml") {
        Some(Ok(xml)) => parse_sheet_names(&xml),
        _ => Vec::new(),
    };

    let sheets = numbered_entries(&archive, WORKSHEETS_PREFIX);
    if sheets.is_empty() {
        return Err(ExtractionError::corrupt(location, "workbook has no worksheets"));
    }

    let mut sections = Vec::with_capacity(sheets.len());
    for (index, sheet) in sheets.iter().enumerate() {
        let xml = read_entry(&mut archive, sheet)
            .ok_or_else(|| ExtractionError::corrupt(location, format!("missing {}", sheet)))?
            .map_err(|e| ExtractionError::corrupt(location, e))?;

        let rows = parse_sheet_rows(&xml, &shared_strings)
            .map_err(|e| ExtractionError::corrupt(location, format!("{}: {}", sheet, e)))?;

        let name = sheet_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", index + 1));
        sections.push(format!("Sheet: {}\n{}", name, render_rows(&rows, max_rows)));
    }

    Ok(sections.join("\n\n"))
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(e) if in_text => current.push_str(&e.decode().unwrap_or_default()),
            Event::GeneralRef(e) if in_text => {
                if let Some(resolved) = resolve_reference(&e) {
                    current.push_str(&resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

fn parse_sheet_names(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut names = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                if let Some(attr) = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == b"name")
                {
                    names.push(String::from_utf8_lossy(&attr.value).to_string());
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    names
}

/// Cell types that matter for text: shared string, inline string, or a
/// literal value (numbers, booleans, formula results).
#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Literal,
}

fn parse_sheet_rows(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut kind = CellKind::Literal;
    let mut capture = false;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell.clear();
                    kind = CellKind::Literal;
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"t" {
                            kind = match attr.value.as_ref() {
                                b"s" => CellKind::Shared,
                                b"inlineStr" => CellKind::Inline,
                                _ => CellKind::Literal,
                            };
                        }
                    }
                }
                b"v" => capture = kind != CellKind::Inline,
                b"t" => capture = kind == CellKind::Inline,
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    let value = match kind {
                        CellKind::Shared => cell
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                            .unwrap_or_default(),
                        _ => cell.clone(),
                    };
                    row.push(value);
                }
                b"row" => {
                    if row.iter().any(|v| !v.is_empty()) {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                _ => {}
            },
            Event::Text(e) if capture => cell.push_str(&e.decode().unwrap_or_default()),
            Event::GeneralRef(e) if capture => {
                if let Some(resolved) = resolve_reference(&e) {
                    cell.push_str(&resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rows)
}

fn render_rows(rows: &[Vec<String>], max_rows: usize) -> String {
    let mut lines: Vec<String> = rows
        .iter()
        .take(max_rows)
        .map(|r| r.join("\t"))
        .collect();
    if rows.len() > max_rows {
        lines.push(format!("[{} more rows omitted]", rows.len() - max_rows));
    }
    lines.join("\n")
}

/// Quoted fields may span lines; their line breaks become spaces so each
/// record stays on one output row. Unreadable records are skipped.
fn csv_to_rows(content: &str, max_rows: usize) -> String {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let rows: Vec<Vec<String>> = reader
        .records()
        .filter_map(|record| match record {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("Skipping unreadable CSV record: {}", e);
                None
            }
        })
        .map(|record| {
            record
                .iter()
                .map(|field| field.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect::<Vec<String>>()
        })
        .filter(|row| row.iter().any(|v| !v.is_empty()))
        .collect();
    render_rows(&rows, max_rows)
}

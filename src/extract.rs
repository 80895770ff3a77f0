//! Text extraction for uploaded documents (PDF, DOCX, CSV).
//!
//! Callers supply raw bytes plus a [`SourceKind`]; this module returns a
//! [`Document`] holding plain UTF-8 text, or a classified
//! [`PipelineError`]:
//!
//! - zero bytes, or a parse that yields only whitespace → `EmptyContent`
//! - corrupt or undecodable input → `Unreadable`
//! - a kind that is not an upload format → `UnsupportedFormat`
//!
//! Web pages are handled by [`crate::web`].

use std::io::Read;

use quick_xml::events::Event;
use tracing::debug;

use llm_suite_core::models::{Document, SourceKind};
use llm_suite_core::PipelineError;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const UTF8_BOM: &str = "\u{feff}";

/// Extract an uploaded document.
///
/// `origin` is the file name shown to the user; its stem becomes the
/// document title.
pub fn extract_document(
    bytes: &[u8],
    kind: SourceKind,
    origin: &str,
) -> Result<Document, PipelineError> {
    let text = extract_text(bytes, kind)?;
    let title = std::path::Path::new(origin)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    debug!(
        kind = %kind,
        bytes = bytes.len(),
        chars = text.chars().count(),
        "extracted document"
    );

    Ok(Document::new(
        uuid::Uuid::new_v4().to_string(),
        kind,
        origin,
        text,
        title,
    ))
}

/// Extract plain text from document bytes.
pub fn extract_text(bytes: &[u8], kind: SourceKind) -> Result<String, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyContent(format!(
            "the uploaded {} file is empty (0 bytes)",
            kind
        )));
    }

    let text = match kind {
        SourceKind::Pdf => extract_pdf(bytes)?,
        SourceKind::Docx => extract_docx(bytes)?,
        SourceKind::Csv => extract_csv(bytes)?,
        SourceKind::WebPage => {
            return Err(PipelineError::UnsupportedFormat(
                "web pages are fetched by URL, not uploaded".to_string(),
            ))
        }
    };

    if text.trim().is_empty() {
        return Err(PipelineError::EmptyContent(format!(
            "no text could be extracted from the {} file",
            kind
        )));
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, PipelineError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PipelineError::Unreadable(format!("PDF extraction failed: {}", e)))
}

fn extract_docx(bytes: &[u8]) -> Result<String, PipelineError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ooxml_error(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ooxml_error("word/document.xml not found"))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ooxml_error(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml_error("word/document.xml exceeds size limit"));
    }
    extract_word_text(&doc_xml)
}

fn ooxml_error(detail: impl std::fmt::Display) -> PipelineError {
    PipelineError::Unreadable(format!("DOCX extraction failed: {}", detail))
}

/// Collect `w:t` runs, breaking paragraphs at `</w:p>`.
fn extract_word_text(xml: &[u8]) -> Result<String, PipelineError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ooxml_error(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_error(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn extract_csv(bytes: &[u8]) -> Result<String, PipelineError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PipelineError::Unreadable(format!("CSV is not valid UTF-8: {}", e)))?;
    Ok(text
        .strip_prefix(UTF8_BOM)
        .unwrap_or(text)
        .replace("\r\n", "\n"))
}

/// A CSV file split into its header and data records.
///
/// Records are kept as raw lines (quoted newlines included) so they can
/// be passed to the model verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub columns: Vec<String>,
    pub rows: Vec<String>,
}

impl CsvTable {
    /// Split CSV text into header columns and data records.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let mut records = split_records(text).into_iter();
        let header = records
            .next()
            .ok_or_else(|| PipelineError::EmptyContent("CSV has no header row".to_string()))?;
        let columns: Vec<String> = split_fields(&header)
            .into_iter()
            .map(|c| c.trim().to_string())
            .collect();
        if columns.iter().all(|c| c.is_empty()) {
            return Err(PipelineError::Unreadable(
                "CSV header row has no column names".to_string(),
            ));
        }
        let rows: Vec<String> = records.collect();
        if rows.is_empty() {
            return Err(PipelineError::EmptyContent(
                "CSV has a header but no data rows".to_string(),
            ));
        }
        Ok(Self { columns, rows })
    }

    /// Data records grouped into blocks of at most `rows_per_block`.
    pub fn row_blocks(&self, rows_per_block: usize) -> Vec<String> {
        self.rows
            .chunks(rows_per_block.max(1))
            .map(|block| block.join("\n"))
            .collect()
    }
}

/// Split on newlines that are outside double quotes, skipping blank lines.
fn split_records(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '\n' if !in_quotes => {
                if !current.trim().is_empty() {
                    records.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        records.push(current);
    }
    records
}

/// Split one record on commas outside quotes, unquoting fields.
fn split_fields(record: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = record.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

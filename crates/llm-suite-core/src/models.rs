//! Core data models used throughout LLM Suite.
//!
//! These types represent the documents, chunks, and conversation turns
//! that flow through the extraction, retrieval, and generation pipeline.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Where a document's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Docx,
    Csv,
    #[serde(rename = "webpage")]
    WebPage,
}

impl SourceKind {
    /// Parse an upload format tag such as `"pdf"`, `".docx"` or `"CSV"`.
    ///
    /// Web pages are never uploaded, so `"webpage"` is not accepted here.
    pub fn from_tag(tag: &str) -> Result<Self, PipelineError> {
        let normalized = tag.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "pdf" => Ok(SourceKind::Pdf),
            "docx" => Ok(SourceKind::Docx),
            "csv" => Ok(SourceKind::Csv),
            _ => Err(PipelineError::UnsupportedFormat(format!(
                "'{}' (expected pdf, docx, or csv)",
                tag
            ))),
        }
    }

    /// Infer the format from a file path's extension.
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                PipelineError::UnsupportedFormat(format!(
                    "{} has no file extension",
                    path.display()
                ))
            })?;
        Self::from_tag(ext)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Docx => "docx",
            SourceKind::Csv => "csv",
            SourceKind::WebPage => "webpage",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extracted document. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    kind: SourceKind,
    origin: String,
    text: String,
    title: Option<String>,
}

impl Document {
    /// Build a document from already-extracted text.
    ///
    /// `origin` is the uploaded file name or the fetched URL.
    pub fn new(
        id: impl Into<String>,
        kind: SourceKind,
        origin: impl Into<String>,
        text: impl Into<String>,
        title: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            origin: origin.into(),
            text: text.into(),
            title,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}

/// A bounded slice of a document's normalized text.
///
/// `start` and `end` are byte offsets into the normalized text produced
/// by [`crate::chunk::normalize_text`]; consecutive chunks may overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: String,
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    /// Bytes this chunk shares with the chunk before it.
    pub fn overlap_with(&self, previous: &Chunk) -> usize {
        previous.end.saturating_sub(self.start)
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message in a tool's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn format_tags_are_case_insensitive() {
        assert_eq!(SourceKind::from_tag("PDF").unwrap(), SourceKind::Pdf);
        assert_eq!(SourceKind::from_tag(".docx").unwrap(), SourceKind::Docx);
        assert_eq!(SourceKind::from_tag(" csv ").unwrap(), SourceKind::Csv);
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let err = SourceKind::from_tag("pptx").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        let err = SourceKind::from_tag("webpage").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn kind_from_path() {
        assert_eq!(
            SourceKind::from_path(Path::new("reports/q3.Docx")).unwrap(),
            SourceKind::Docx
        );
        assert!(SourceKind::from_path(Path::new("README")).is_err());
    }
}

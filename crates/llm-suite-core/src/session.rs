//! Per-tool session state.
//!
//! A [`ToolSession`] is owned by exactly one caller and passed by `&mut`
//! to every pipeline operation. Nothing is shared between sessions.

use crate::conversation::ConversationLog;
use crate::index::EmbeddingIndex;
use crate::models::Document;

/// A document together with the index built from it.
///
/// The pair is stored and replaced as one value, so an index can never
/// outlive or mismatch its document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub index: Option<EmbeddingIndex>,
}

impl LoadedDocument {
    /// A document that is queried through its embedding index.
    pub fn indexed(document: Document, index: EmbeddingIndex) -> Self {
        Self {
            document,
            index: Some(index),
        }
    }

    /// A document that is sampled directly (e.g. CSV rows) without an index.
    pub fn raw(document: Document) -> Self {
        Self {
            document,
            index: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolSession {
    loaded: Option<LoadedDocument>,
    pub conversation: ConversationLog,
    last_output: Option<String>,
}

impl ToolSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new document, discarding the previous document, its
    /// index, and the conversation about it.
    pub fn replace_document(&mut self, loaded: LoadedDocument) {
        self.loaded = Some(loaded);
        self.conversation.clear();
        self.last_output = None;
    }

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.loaded.as_ref()
    }

    /// Remember the last generated text so it can be exported.
    pub fn set_last_output(&mut self, text: impl Into<String>) {
        self.last_output = Some(text.into());
    }

    pub fn last_output(&self) -> Option<&str> {
        self.last_output.as_deref()
    }

    /// Reset the session to its initial state.
    pub fn reset(&mut self) {
        self.loaded = None;
        self.conversation.clear();
        self.last_output = None;
    }
}

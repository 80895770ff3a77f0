//! Paragraph-boundary text chunker with fixed overlap.
//!
//! Splits document text into [`Chunk`]s that respect a configurable
//! `max_chars` limit. Splitting prefers paragraph boundaries (`\n\n`) to
//! preserve semantic coherence within each chunk, and consecutive chunks
//! share `overlap_chars` bytes so no sentence is lost at a cut.
//!
//! The chunker is a pure function of its input text and
//! [`ChunkingParams`]: the same input always yields the same chunks.
//!
//! # Algorithm
//!
//! 1. Normalize the text: split on blank lines, trim each paragraph,
//!    drop empty ones, and re-join with `\n\n` ([`normalize_text`]).
//! 2. From the current start, look at the window of `max_chars` bytes.
//! 3. Cut at the furthest paragraph separator inside the window. If there
//!    is none, cut after the last newline, then after the last space,
//!    then hard-cut at the window end (snapped to a UTF-8 boundary).
//!    A cut must land past the end of the previous chunk.
//! 4. Start the next chunk `overlap_chars` before the cut, clamped to
//!    half the length of the chunk just emitted.
//!
//! # Example
//!
//! ```rust
//! use llm_suite_core::chunk::{chunk_text, ChunkingParams};
//!
//! let params = ChunkingParams { max_chars: 1000, overlap_chars: 200 };
//! let chunks = chunk_text("doc-123", "Hello world.\n\nSecond paragraph.", &params);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].index, 0);
//! ```

use serde::Deserialize;

use crate::error::PipelineError;
use crate::models::Chunk;

/// Separator placed between paragraphs of normalized text.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Chunk size and overlap, both in bytes of UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkingParams {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

fn default_max_chars() -> usize {
    1000
}

fn default_overlap_chars() -> usize {
    200
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

/// Smallest accepted `max_chars`. A window this wide always reaches past
/// the previous chunk by at least one character, even a 4-byte one.
pub const MIN_MAX_CHARS: usize = 8;

impl ChunkingParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_chars < MIN_MAX_CHARS {
            return Err(PipelineError::Config(format!(
                "chunking.max_chars must be at least {}",
                MIN_MAX_CHARS
            )));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(PipelineError::Config(format!(
                "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Collapse text into trimmed, non-empty paragraphs joined by `\n\n`.
///
/// Lines inside a paragraph keep their leading whitespace; trailing
/// whitespace and `\r` are removed. Idempotent.
pub fn normalize_text(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
        } else {
            current.push(line.trim_end());
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);

    paragraphs.join(PARAGRAPH_SEPARATOR)
}

fn flush_paragraph(current: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let joined = current.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        paragraphs.push(trimmed.to_string());
    }
    current.clear();
}

/// Split text into overlapping chunks.
///
/// Returns chunks with contiguous indices starting at 0. Whitespace-only
/// text yields no chunks.
///
/// # Guarantees
///
/// - Deterministic for a given `(text, params)`.
/// - Each chunk is at most `max_chars` bytes when `params` passes
///   [`ChunkingParams::validate`]. Narrower limits still terminate, but a
///   chunk may then exceed the limit.
/// - [`reassemble`] of the result equals [`normalize_text`] of the input.
pub fn chunk_text(document_id: &str, text: &str, params: &ChunkingParams) -> Vec<Chunk> {
    let normalized = normalize_text(text);
    let len = normalized.len();
    let max = params.max_chars.max(1);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut start = 0usize;
    let mut prev_end = 0usize;

    while start < len {
        let floor = start.max(prev_end);
        let mut window_end = snap_back(&normalized, (start + max).min(len));
        if window_end <= floor {
            window_end = next_boundary(&normalized, floor);
        }

        let (end, resume) = if window_end == len {
            (len, len)
        } else {
            find_cut(&normalized, floor, window_end)
        };

        chunks.push(Chunk {
            document_id: document_id.to_string(),
            index: chunks.len(),
            text: normalized[start..end].to_string(),
            start,
            end,
        });

        if resume >= len {
            break;
        }

        let overlap = params.overlap_chars.min((end - start) / 2);
        let mut next = snap_forward(&normalized, resume - overlap);
        // Starting inside a paragraph separator only repeats whitespace.
        if next >= end && next < resume {
            next = resume;
        }
        prev_end = end;
        start = next;
    }

    chunks
}

/// Rebuild normalized text from chunks, dropping the overlapping prefix
/// of each chunk and restoring separators skipped between chunks.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut prev_end: Option<usize> = None;

    for chunk in chunks {
        match prev_end {
            Some(pe) if chunk.start < pe => out.push_str(&chunk.text[pe - chunk.start..]),
            Some(pe) => {
                if chunk.start > pe {
                    out.push_str(PARAGRAPH_SEPARATOR);
                }
                out.push_str(&chunk.text);
            }
            None => out.push_str(&chunk.text),
        }
        prev_end = Some(chunk.end);
    }

    out
}

/// Pick `(end, resume)` for a chunk whose cut must fall in `(floor, window_end]`.
///
/// `resume` differs from `end` only for paragraph cuts, where the
/// separator belongs to neither chunk.
fn find_cut(s: &str, floor: usize, window_end: usize) -> (usize, usize) {
    let bytes = s.as_bytes();

    for p in (floor + 1..=window_end).rev() {
        if p + 1 < bytes.len() && bytes[p] == b'\n' && bytes[p + 1] == b'\n' {
            return (p, p + PARAGRAPH_SEPARATOR.len());
        }
    }

    for q in (floor..window_end).rev() {
        if bytes[q] == b'\n' && !is_separator_byte(bytes, q) {
            return (q + 1, q + 1);
        }
    }

    for q in (floor..window_end).rev() {
        if bytes[q] == b' ' {
            return (q + 1, q + 1);
        }
    }

    (window_end, window_end)
}

fn is_separator_byte(bytes: &[u8], q: usize) -> bool {
    (q > 0 && bytes[q - 1] == b'\n') || (q + 1 < bytes.len() && bytes[q + 1] == b'\n')
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_back(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Snap a byte index forward to the nearest valid UTF-8 char boundary.
fn snap_forward(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// The first char boundary strictly after `index`.
fn next_boundary(s: &str, index: usize) -> usize {
    s[index..]
        .char_indices()
        .nth(1)
        .map(|(i, _)| index + i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_chars: usize, overlap_chars: usize) -> ChunkingParams {
        ChunkingParams {
            max_chars,
            overlap_chars,
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", &params(700, 100));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].document_id, "doc1");
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(chunk_text("doc1", "", &params(700, 100)).is_empty());
        assert!(chunk_text("doc1", "  \n\n \t\n", &params(700, 100)).is_empty());
    }

    #[test]
    fn test_normalize_collapses_blank_lines() {
        let text = "  First line\r\nstill first  \n\n\n   \nSecond\n\n";
        assert_eq!(normalize_text(text), "First line\nstill first\n\nSecond");
        assert_eq!(normalize_text(&normalize_text(text)), normalize_text(text));
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text("doc1", text, &params(700, 100));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "Alpha alpha alpha.\n\nBeta beta beta.\n\nGamma gamma gamma.";
        let chunks = chunk_text("doc1", text, &params(40, 0));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Alpha alpha alpha.\n\nBeta beta beta.");
        assert_eq!(chunks[1].text, "Gamma gamma gamma.");
    }

    #[test]
    fn test_respects_max_chars() {
        let text = (0..80)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i % 7))
            .collect::<Vec<_>>()
            .join(" ");
        let text = format!("{}\n\n{}", text, text);
        let chunks = chunk_text("doc1", &text, &params(300, 60));
        assert!(chunks.len() > 2);
        for c in &chunks {
            assert!(c.text.len() <= 300, "chunk {} has {} bytes", c.index, c.text.len());
        }
    }

    #[test]
    fn test_fixed_overlap_between_wrapped_chunks() {
        let text = "word ".repeat(100);
        let chunks = chunk_text("doc1", &text, &params(100, 20));
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].overlap_with(&pair[0]), 20);
            let shared = &pair[0].text[pair[0].text.len() - 20..];
            assert!(pair[1].text.starts_with(shared));
        }
    }

    #[test]
    fn test_overlap_carries_tail_of_previous_paragraph() {
        let first = "a".repeat(30);
        let second = "b ".repeat(40);
        let text = format!("{}\n\n{}", first, second.trim_end());
        let chunks = chunk_text("doc1", &text, &params(50, 10));
        assert_eq!(chunks[0].text, first);
        assert!(chunks[1].text.starts_with(&"a".repeat(10)));
        assert!(chunks[1].text.contains("\n\nb b"));
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, &params(40, 10));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_reassemble_is_lossless() {
        let samples = [
            "One.\n\nTwo.\n\nThree.".to_string(),
            "word ".repeat(257),
            (0..40)
                .map(|i| format!("Paragraph {} has a few words in it.\nAnd a second line.", i))
                .collect::<Vec<_>>()
                .join("\n\n\n"),
            format!("{}\n\n{}", "x".repeat(333), "y".repeat(10)),
            "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘".to_string(),
        ];
        for text in &samples {
            for (max, overlap) in [(30, 0), (30, 10), (64, 16), (1000, 200), (7, 3)] {
                let chunks = chunk_text("doc1", text, &params(max, overlap));
                assert_eq!(
                    reassemble(&chunks),
                    normalize_text(text),
                    "max={} overlap={}",
                    max,
                    overlap
                );
            }
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_text("doc1", text, &params(3, 1));
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.text.is_empty());
        }
        assert_eq!(reassemble(&chunks), normalize_text(text));
    }

    #[test]
    fn test_smallest_valid_limit_holds_for_wide_chars() {
        let text = "│ 日本語のテキスト │\n\n😀😀😀 emoji 😀😀\n\n┌──┐ └──┘";
        for overlap in 0..MIN_MAX_CHARS {
            let p = params(MIN_MAX_CHARS, overlap);
            assert!(p.validate().is_ok());
            let chunks = chunk_text("doc1", text, &p);
            for c in &chunks {
                assert!(c.text.len() <= MIN_MAX_CHARS, "{:?} with overlap {}", c.text, overlap);
            }
            assert_eq!(reassemble(&chunks), normalize_text(text));
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc1", text, &params(12, 4));
        let c2 = chunk_text("doc1", text, &params(12, 4));
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_params_validation() {
        assert!(params(1000, 200).validate().is_ok());
        assert!(params(0, 0).validate().is_err());
        assert!(params(4, 1).validate().is_err());
        assert!(params(100, 100).validate().is_err());
    }
}

//! Export generated text to a file.
//!
//! The one-shot CLI commands accept `--output <path>` and write the
//! generated text there as Markdown or plain text. A bare directory gets
//! a file name derived from the title via [`default_file_name`].

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Stem used when a title yields no usable file name.
pub const FALLBACK_STEM: &str = "llmsuite_output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Text => "txt",
        }
    }

    /// Format implied by a path's extension, if it names one.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(ExportFormat::Markdown),
            "txt" | "text" => Some(ExportFormat::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Markdown => f.write_str("markdown"),
            ExportFormat::Text => f.write_str("text"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "txt" | "text" => Ok(ExportFormat::Text),
            other => Err(format!("unknown export format '{}' (expected md or txt)", other)),
        }
    }
}

/// File name for exporting output titled `title`.
///
/// Spaces become underscores and path separators are removed; an empty
/// result falls back to [`FALLBACK_STEM`].
pub fn default_file_name(title: &str, format: ExportFormat) -> String {
    let stem: String = title
        .trim()
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '\0'))
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let stem = stem.trim_matches(|c| c == '_' || c == '.');
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };
    format!("{}.{}", stem, format.extension())
}

/// Write `text` to `path` and return the path written.
///
/// When `path` is an existing directory the file is created inside it
/// as `<title-derived name>.<ext>`. Parent directories are created as
/// needed. Empty text is refused.
pub fn export_text(path: &Path, title: &str, text: &str, format: ExportFormat) -> Result<PathBuf> {
    if text.trim().is_empty() {
        bail!("Nothing to export: the generated text is empty");
    }

    let target = if path.is_dir() {
        path.join(default_file_name(title, format))
    } else {
        path.to_path_buf()
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut body = text.trim_end().to_string();
    body.push('\n');
    std::fs::write(&target, body)
        .with_context(|| format!("Failed to write export file: {}", target.display()))?;
    Ok(target)
}

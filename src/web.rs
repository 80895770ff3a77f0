//! Web page fetching and main-content extraction.
//!
//! [`WebFetcher::fetch`] downloads a page with a browser-like user agent
//! and a bounded timeout, then [`extract_html`] reduces the HTML to
//! readable text:
//!
//! 1. Noise elements (scripts, styles, navigation, headers, footers,
//!    forms, media embeds) are skipped entirely.
//! 2. Recognized main-content containers (`main`, `article`,
//!    `[role=main]`, common content classes) are preferred over `<body>`.
//!    Nested matches are counted once.
//! 3. Whitespace is collapsed per paragraph and the result is truncated
//!    to `max_chars` characters. Truncation never fails the fetch.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info};

use llm_suite_core::models::{Document, SourceKind};
use llm_suite_core::{PipelineError, RejectionReason};

use crate::config::FetchConfig;
use crate::http::{build_client, classify_reqwest_error, parse_http_url};

/// Elements whose subtree never contributes text.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "form",
    "input", "button", "select", "textarea", "img", "svg", "canvas", "video", "audio",
    "iframe", "object", "embed", "link", "meta", "head",
];

/// Elements that start a new paragraph in the extracted text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5",
    "h6", "blockquote", "pre", "table", "tr", "dd", "dt", "figcaption", "br", "hr",
];

const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    ".content",
    ".main-content",
    ".article-body",
    ".post-content",
    ".entry-content",
    ".text-body",
    "#content",
];

/// Main-content text shorter than this falls back to the whole body.
const MIN_MAIN_CONTENT_CHARS: usize = 200;

/// Text and metadata extracted from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebPage {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub truncated: bool,
}

impl WebPage {
    pub fn into_document(self) -> Document {
        Document::new(
            uuid::Uuid::new_v4().to_string(),
            SourceKind::WebPage,
            self.url,
            self.text,
            self.title,
        )
    }
}

/// HTTP client for page downloads.
#[derive(Debug, Clone)]
pub struct WebFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl WebFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(config.timeout_secs, Some(&config.user_agent))?,
            max_chars: config.max_chars,
        })
    }

    /// Fetch `url` and extract its readable text.
    ///
    /// Fails with a malformed-URL transport error before any request when
    /// `url` is not an absolute `http`/`https` URL. Non-2xx responses are
    /// remote rejections carrying the status; pages with no text are
    /// `EmptyContent`.
    pub async fn fetch(&self, url: &str) -> Result<WebPage, PipelineError> {
        let parsed = parse_http_url(url)?;

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::rejection(
                RejectionReason::HttpStatus,
                Some(status.as_u16()),
                format!("{} returned {}", parsed, status),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let (title, text, truncated) = if content_type.contains("html") {
            let extracted = extract_html(&body, self.max_chars);
            (extracted.title, extracted.text, extracted.truncated)
        } else if content_type.starts_with("text/") {
            let cleaned = clean_paragraphs(&body);
            let (text, truncated) = truncate_chars(&cleaned, self.max_chars);
            (None, text, truncated)
        } else {
            return Err(PipelineError::UnsupportedFormat(format!(
                "{} served '{}', expected an HTML or text page",
                parsed, content_type
            )));
        };

        if text.trim().is_empty() {
            return Err(PipelineError::EmptyContent(format!(
                "no readable text found at {}",
                parsed
            )));
        }

        info!(
            url = %parsed,
            chars = text.chars().count(),
            truncated,
            "fetched web page"
        );

        Ok(WebPage {
            url: parsed.to_string(),
            title,
            text,
            truncated,
        })
    }
}

/// Result of [`extract_html`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedHtml {
    pub title: Option<String>,
    pub text: String,
    pub truncated: bool,
}

/// Reduce an HTML document to its title and readable text.
pub fn extract_html(html: &str, max_chars: usize) -> ExtractedHtml {
    let document = Html::parse_document(html);
    let title = page_title(&document);

    let main_text = main_content_text(&document);
    let text = if main_text.chars().count() >= MIN_MAIN_CONTENT_CHARS {
        main_text
    } else {
        let body = body_text(&document);
        if body.trim().is_empty() {
            main_text
        } else {
            body
        }
    };

    let (text, truncated) = truncate_chars(&text, max_chars);
    debug!(chars = text.chars().count(), truncated, "extracted html");
    ExtractedHtml {
        title,
        text,
        truncated,
    }
}

fn page_title(document: &Html) -> Option<String> {
    for selector in ["title", "h1"] {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        if let Some(el) = document.select(&sel).next() {
            let title = el.text().collect::<Vec<_>>().join(" ");
            let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
            if !title.is_empty() {
                return Some(title);
            }
        }
    }
    None
}

/// Text of the outermost main-content containers, in document order.
fn main_content_text(document: &Html) -> String {
    let mut selected = HashSet::new();
    for selector in MAIN_CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        for el in document.select(&sel) {
            let inside_noise = el
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| is_noise(&a));
            if !is_noise(&el) && !inside_noise {
                selected.insert(el.id());
            }
        }
    }
    if selected.is_empty() {
        return String::new();
    }

    let mut raw = String::new();
    for el in document.root_element().descendants().filter_map(ElementRef::wrap) {
        if !selected.contains(&el.id()) {
            continue;
        }
        if el.ancestors().any(|a| selected.contains(&a.id())) {
            continue;
        }
        collect_text(el, &mut raw);
        raw.push_str("\n\n");
    }
    clean_paragraphs(&raw)
}

fn body_text(document: &Html) -> String {
    let mut raw = String::new();
    match Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
    {
        Some(body) => collect_text(body, &mut raw),
        None => collect_text(document.root_element(), &mut raw),
    }
    clean_paragraphs(&raw)
}

fn is_noise(el: &ElementRef<'_>) -> bool {
    NOISE_TAGS.contains(&el.value().name())
}

/// Append the visible text under `el`, marking block boundaries with
/// blank lines.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_noise(&child_el) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&child_el.value().name());
                if block {
                    out.push_str("\n\n");
                }
                collect_text(child_el, out);
                if block {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
}

/// Collapse whitespace inside paragraphs and drop empty ones.
fn clean_paragraphs(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Truncate to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => (text[..cut].trim_end().to_string(), true),
        None => (text.to_string(), false),
    }
}

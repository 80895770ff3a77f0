//! Per-session orchestration of extraction, retrieval, composition and
//! generation.
//!
//! A [`Pipeline`] holds the long-lived services (embedding provider,
//! generation client, page fetcher, prompt composer). It keeps no
//! per-user state: every call takes the caller's [`ToolSession`], so one
//! pipeline can serve many sessions as long as each session has a single
//! owner.
//!
//! # Flows
//!
//! ```text
//! load_document:   bytes → extract → chunk → embed → session
//! ask_document:    question → embed → top-k chunks → compose → generate
//! summarize_website: url → fetch → extract → chunk (document order) → compose → generate
//! chat_stream:     message → compose(turns) → stream increments → append turns
//! ```
//!
//! Blank required inputs fail with `InvalidInput` before any network
//! call. Turns are appended to the conversation only after a reply has
//! been produced in full.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use tracing::{debug, info};

use llm_suite_core::chunk::{chunk_text, ChunkingParams};
use llm_suite_core::embedding::Embedder;
use llm_suite_core::generation::{Generator, TextStream};
use llm_suite_core::index::EmbeddingIndex;
use llm_suite_core::models::{Document, SourceKind};
use llm_suite_core::prompt::{ContextFragment, PromptComposer, PromptRequest, TaskType};
use llm_suite_core::session::{LoadedDocument, ToolSession};
use llm_suite_core::PipelineError;

use crate::config::Config;
use crate::embedding::{create_embedder, DisabledEmbedder, UnavailableEmbedder};
use crate::extract::extract_document;
use crate::generation::create_generator;
use crate::web::WebFetcher;

/// Outcome of loading a document into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub title: Option<String>,
    pub chars: usize,
    pub chunks: usize,
}

/// A generated website summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSummary {
    pub url: String,
    pub title: Option<String>,
    pub summary: String,
    /// The page text was cut at `fetch.max_chars` before summarizing.
    pub truncated: bool,
}

/// Long-lived services shared by every tool.
pub struct Pipeline {
    pub(crate) config: Config,
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) fetcher: WebFetcher,
    pub(crate) composer: PromptComposer,
}

impl Pipeline {
    /// Build the configured providers.
    ///
    /// A missing generation credential fails here, before any request.
    /// Only document Q&A embeds, so an embedding provider that cannot be
    /// configured is kept as an [`UnavailableEmbedder`]: the other tools
    /// work without it and `load_document` reports the configuration
    /// error before any request.
    pub fn from_config(config: Config) -> Result<Self, PipelineError> {
        let generator = create_generator(&config.generation)?;
        let embedder: Arc<dyn Embedder> = if config.embedding.is_enabled() {
            match create_embedder(&config.embedding) {
                Ok(embedder) => embedder,
                Err(PipelineError::Config(reason)) => {
                    debug!(%reason, "embedding provider unavailable");
                    Arc::new(UnavailableEmbedder::new(reason))
                }
                Err(err) => return Err(err),
            }
        } else {
            Arc::new(DisabledEmbedder)
        };
        Self::with_services(config, embedder, generator)
    }

    /// Build a pipeline around existing providers.
    pub fn with_services(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, PipelineError> {
        config.chunking.validate()?;
        let fetcher = WebFetcher::new(&config.fetch)?;
        let composer = PromptComposer::new(config.prompt.budget_chars);
        Ok(Self {
            config,
            embedder,
            generator,
            fetcher,
            composer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    // ============ Document summarizer ============

    /// Extract, chunk and index an uploaded document, then make it the
    /// session's loaded document.
    ///
    /// The previous document and the conversation are replaced only when
    /// every step succeeds.
    pub async fn load_document(
        &self,
        session: &mut ToolSession,
        bytes: &[u8],
        kind: SourceKind,
        origin: &str,
    ) -> Result<LoadReport, PipelineError> {
        let document = extract_document(bytes, kind, origin)?;
        let chunks = chunk_text(document.id(), document.text(), &self.config.chunking);
        if chunks.is_empty() {
            return Err(PipelineError::EmptyContent(format!(
                "{} contains no text to index",
                origin
            )));
        }

        let chunk_count = chunks.len();
        let index = EmbeddingIndex::build(
            chunks,
            self.embedder.as_ref(),
            self.config.embedding.batch_size,
        )
        .await?;

        let report = LoadReport {
            title: document.title().map(str::to_string),
            chars: document.text().chars().count(),
            chunks: chunk_count,
        };
        info!(
            origin,
            kind = %kind,
            chars = report.chars,
            chunks = chunk_count,
            dims = index.dims(),
            "document indexed"
        );
        session.replace_document(LoadedDocument::indexed(document, index));
        Ok(report)
    }

    /// Summarize the loaded document from its best-matching chunks.
    pub async fn summarize_document(
        &self,
        session: &mut ToolSession,
    ) -> Result<String, PipelineError> {
        let prompt = {
            let (document, index) = indexed_document(session)?;
            let fragments = self
                .retrieve(index, &self.config.retrieval.summary_query)
                .await?;
            let instruction = format!("Summarize the document \"{}\".", display_name(document));
            let request = PromptRequest::new(TaskType::Summarize, &instruction)
                .with_fragments(&fragments);
            self.composer.compose(&request)?.text
        };

        let summary = self.generator.generate(&prompt).await?;
        session.set_last_output(summary.clone());
        Ok(summary)
    }

    /// Answer a question about the loaded document.
    ///
    /// Recent turns are included for follow-ups; the question and answer
    /// are appended to the conversation on success.
    pub async fn ask_document(
        &self,
        session: &mut ToolSession,
        question: &str,
    ) -> Result<String, PipelineError> {
        let question = require_text(question, "question")?;
        let prompt = {
            let (_, index) = indexed_document(session)?;
            let fragments = self.retrieve(index, question).await?;
            let request = PromptRequest::new(TaskType::AnswerQuestion, question)
                .with_fragments(&fragments)
                .with_turns(session.conversation.recent(self.config.conversation.max_turns));
            self.composer.compose(&request)?.text
        };

        let answer = self.generator.generate(&prompt).await?;
        session.conversation.append_exchange(question, answer.clone());
        session.set_last_output(answer.clone());
        Ok(answer)
    }

    async fn retrieve(
        &self,
        index: &EmbeddingIndex,
        query: &str,
    ) -> Result<Vec<ContextFragment>, PipelineError> {
        let hits = index
            .query(query, self.config.retrieval.top_k, self.embedder.as_ref())
            .await?;
        debug!(
            hits = hits.len(),
            best = hits.first().map(|h| h.score).unwrap_or(0.0),
            "retrieved chunks"
        );
        Ok(hits
            .into_iter()
            .map(|hit| {
                ContextFragment::labelled(
                    format!("excerpt {}", hit.chunk.index + 1),
                    hit.chunk.text.clone(),
                )
            })
            .collect())
    }

    // ============ Website summarizer ============

    /// Fetch a page and summarize its main content.
    ///
    /// The page becomes the session's loaded document (without an index).
    pub async fn summarize_website(
        &self,
        session: &mut ToolSession,
        url: &str,
    ) -> Result<WebSummary, PipelineError> {
        let url = require_text(url, "URL")?;
        let page = self.fetcher.fetch(url).await?;
        let document = page.clone().into_document();

        // Fragments go into the prompt in document order, so overlap would
        // only repeat text.
        let params = ChunkingParams {
            overlap_chars: 0,
            ..self.config.chunking
        };
        let fragments: Vec<ContextFragment> = chunk_text(document.id(), document.text(), &params)
            .into_iter()
            .map(|chunk| ContextFragment::new(chunk.text))
            .collect();
        let instruction = match &page.title {
            Some(title) => format!("Summarize the web page \"{}\" ({}).", title, page.url),
            None => format!("Summarize the web page at {}.", page.url),
        };
        let composed = self.composer.compose(
            &PromptRequest::new(TaskType::Summarize, &instruction).with_fragments(&fragments),
        )?;
        info!(
            url = %page.url,
            fragments = fragments.len(),
            included = composed.included,
            truncated = page.truncated,
            "composed website summary prompt"
        );

        let summary = self.generator.generate(&composed.text).await?;
        session.replace_document(LoadedDocument::raw(document));
        session.set_last_output(summary.clone());
        Ok(WebSummary {
            url: page.url,
            title: page.title,
            summary,
            truncated: page.truncated,
        })
    }

    // ============ Chat assistant ============

    /// Reply to `message` in the context of the session's conversation.
    pub async fn chat(
        &self,
        session: &mut ToolSession,
        message: &str,
    ) -> Result<String, PipelineError> {
        let message = require_text(message, "message")?;
        let prompt = self.chat_prompt(session, message)?;
        let reply = self.generator.generate(&prompt).await?;
        session.conversation.append_exchange(message, reply.clone());
        session.set_last_output(reply.clone());
        Ok(reply)
    }

    /// Stream a reply to `message`.
    ///
    /// The returned stream yields text increments in order. The exchange
    /// is recorded in the session only when the stream ends normally.
    pub async fn chat_stream<'a>(
        &self,
        session: &'a mut ToolSession,
        message: &str,
    ) -> Result<ReplyStream<'a>, PipelineError> {
        let message = require_text(message, "message")?;
        let prompt = self.chat_prompt(session, message)?;
        let inner = self.generator.generate_stream(&prompt).await?;
        Ok(ReplyStream::new(inner, session, message.to_string()))
    }

    fn chat_prompt(&self, session: &ToolSession, message: &str) -> Result<String, PipelineError> {
        let request = PromptRequest::new(TaskType::Chat, message)
            .with_turns(session.conversation.recent(self.config.conversation.max_turns));
        Ok(self.composer.compose(&request)?.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyState {
    Streaming,
    Committed,
    Failed,
}

/// A streaming reply bound to the session it will be recorded in.
///
/// Dropping it before the end cancels the underlying request and leaves
/// the conversation unchanged.
pub struct ReplyStream<'a> {
    inner: TextStream,
    session: &'a mut ToolSession,
    message: String,
    reply: String,
    state: ReplyState,
}

impl<'a> ReplyStream<'a> {
    fn new(inner: TextStream, session: &'a mut ToolSession, message: String) -> Self {
        Self {
            inner,
            session,
            message,
            reply: String::new(),
            state: ReplyState::Streaming,
        }
    }

    /// Text received so far.
    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Drain the stream and return the full reply.
    pub async fn finish(mut self) -> Result<String, PipelineError> {
        while let Some(item) = self.next().await {
            item?;
        }
        Ok(std::mem::take(&mut self.reply))
    }

    fn commit(&mut self) -> Result<(), PipelineError> {
        if self.reply.trim().is_empty() {
            self.state = ReplyState::Failed;
            return Err(PipelineError::invalid_response(
                "stream ended without any text",
            ));
        }
        self.session
            .conversation
            .append_exchange(self.message.clone(), self.reply.clone());
        self.session.set_last_output(self.reply.clone());
        self.state = ReplyState::Committed;
        debug!(chars = self.reply.chars().count(), "streamed reply recorded");
        Ok(())
    }
}

impl Stream for ReplyStream<'_> {
    type Item = Result<String, PipelineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != ReplyState::Streaming {
            return Poll::Ready(None);
        }
        match this.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(text))) => {
                this.reply.push_str(&text);
                Poll::Ready(Some(Ok(text)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.state = ReplyState::Failed;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => match this.commit() {
                Ok(()) => Poll::Ready(None),
                Err(e) => Poll::Ready(Some(Err(e))),
            },
        }
    }
}

/// Trimmed `value`, or `InvalidInput` naming `what` when it is blank.
pub(crate) fn require_text<'v>(value: &'v str, what: &str) -> Result<&'v str, PipelineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(trimmed)
}

fn indexed_document(
    session: &ToolSession,
) -> Result<(&Document, &EmbeddingIndex), PipelineError> {
    match session.document() {
        Some(LoadedDocument {
            document,
            index: Some(index),
        }) => Ok((document, index)),
        Some(_) => Err(PipelineError::InvalidInput(
            "the loaded content has no document index; load a PDF or DOCX file".to_string(),
        )),
        None => Err(PipelineError::InvalidInput(
            "no document loaded".to_string(),
        )),
    }
}

fn display_name(document: &Document) -> &str {
    document.title().unwrap_or(document.origin())
}

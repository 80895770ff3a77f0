//! Text generation capability.
//!
//! A [`Generator`] turns a composed prompt into text, either in one shot
//! or as a [`TextStream`] of increments. Concrete clients live in the
//! app crate; this module only fixes the contract.
//!
//! # Streaming semantics
//!
//! A [`TextStream`] is lazy, finite, and non-restartable. Increments
//! arrive in generation order. The stream ends with `None` on normal
//! termination; an `Err` item ends it early and no further items follow.
//! Dropping the stream before it ends cancels the request and releases
//! the underlying connection. Text delivered before the end is not
//! authoritative.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};

use crate::error::PipelineError;

/// Incremental generated text.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, PipelineError>> + Send>>;

/// A hosted model that completes prompts.
///
/// Implementations never retry; every failure is returned to the caller.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier used for requests.
    fn model_name(&self) -> &str;

    /// Generate the complete response for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError>;

    /// Start a streaming generation for `prompt`.
    ///
    /// Errors detected before the first increment (credentials, HTTP
    /// status) are returned here rather than as the first stream item.
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, PipelineError>;
}

/// Drain a stream into one string, stopping at the first error.
pub async fn collect_stream(mut stream: TextStream) -> Result<String, PipelineError> {
    let mut out = String::new();
    while let Some(piece) = stream.next().await {
        out.push_str(&piece?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportKind};
    use futures::stream;

    #[tokio::test]
    async fn collect_concatenates_in_order() {
        let s: TextStream = Box::pin(stream::iter(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
            Ok(", world".to_string()),
        ]));
        assert_eq!(collect_stream(s).await.unwrap(), "Hello, world");
    }

    #[tokio::test]
    async fn collect_stops_at_error() {
        let s: TextStream = Box::pin(stream::iter(vec![
            Ok("partial".to_string()),
            Err(PipelineError::transport(TransportKind::Body, "reset")),
            Ok("never".to_string()),
        ]));
        let err = collect_stream(s).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}

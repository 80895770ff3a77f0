//! OpenAI-compatible `/chat/completions` client.
//!
//! Works against OpenAI itself or any server exposing the same API
//! (set `generation.base_url`).

use async_trait::async_trait;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use llm_suite_core::generation::{Generator, TextStream};
use llm_suite_core::{PipelineError, RejectionReason};

use super::sse::sse_events;
use crate::config::GenerationConfig;
use crate::http::{build_streaming_client, classify_reqwest_error, error_from_response};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

impl OpenAiClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, PipelineError> {
        let api_key = config.resolve_api_key()?;
        Ok(Self {
            client: build_streaming_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, PipelineError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stream: stream.then_some(true),
        };
        debug!(model = %self.model, stream, prompt_chars = prompt.chars().count(), "chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "OpenAI").await);
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let response = self.send(prompt, false).await?;
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::invalid_response(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::invalid_response("empty choices"))?;
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(content_filtered());
        }
        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(PipelineError::invalid_response("empty completion")),
        }
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, PipelineError> {
        let response = self.send(prompt, true).await?;
        let increments = sse_events(response.bytes_stream())
            .take_while(|event| {
                futures::future::ready(!matches!(event, Ok(data) if data.trim() == DONE_SENTINEL))
            })
            .map(|event| event.and_then(|data| parse_chunk(&data)))
            .filter(|item| futures::future::ready(!matches!(item, Ok(text) if text.is_empty())));
        Ok(Box::pin(increments))
    }
}

fn parse_chunk(data: &str) -> Result<String, PipelineError> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| PipelineError::invalid_response(format!("stream chunk: {}", e)))?;
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(String::new());
    };
    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(content_filtered());
    }
    Ok(choice.delta.content.unwrap_or_default())
}

fn content_filtered() -> PipelineError {
    PipelineError::rejection(
        RejectionReason::Blocked,
        None,
        "response stopped by the content filter",
    )
}

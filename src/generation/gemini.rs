//! Gemini `generateContent` client.

use async_trait::async_trait;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use llm_suite_core::generation::{Generator, TextStream};
use llm_suite_core::{PipelineError, RejectionReason};

use super::sse::sse_events;
use crate::config::GenerationConfig;
use crate::http::{build_streaming_client, classify_reqwest_error, error_from_response};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Harm categories relaxed to `BLOCK_NONE` on every request.
const RELAXED_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Finish reasons that mean the model refused to answer.
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: RequestGenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, or a block error.
    fn into_text(self) -> Result<String, PipelineError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(PipelineError::rejection(
                RejectionReason::Blocked,
                None,
                format!("prompt blocked ({})", reason),
            ));
        }
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Ok(String::new());
        };
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if BLOCKING_FINISH_REASONS.contains(&reason) {
                return Err(PipelineError::rejection(
                    RejectionReason::Blocked,
                    None,
                    format!("response blocked ({})", reason),
                ));
            }
        }
        Ok(candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

/// Client for Gemini text generation.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    generation: RequestGenerationConfig,
}

impl GeminiClient {
    /// Build a client. Fails with a configuration error when no credential
    /// is available; no request is made.
    pub fn new(config: &GenerationConfig) -> Result<Self, PipelineError> {
        let api_key = config.resolve_api_key()?;
        Ok(Self {
            client: build_streaming_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.trim_start_matches("models/").to_string(),
            generation: RequestGenerationConfig {
                temperature: config.temperature,
                top_p: config.top_p,
                top_k: config.top_k,
                max_output_tokens: config.max_output_tokens,
            },
        })
    }

    fn request_body<'a>(&self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: self.generation,
            safety_settings: RELAXED_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }

    async fn post(&self, method: &str, prompt: &str) -> Result<reqwest::Response, PipelineError> {
        let url = format!("{}/models/{}:{}", self.base_url, self.model, method);
        debug!(model = %self.model, method, prompt_chars = prompt.chars().count(), "gemini request");

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Gemini").await);
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let response = self.post("generateContent", prompt).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::invalid_response(format!("Gemini response: {}", e)))?;
        let text = parsed.into_text()?;
        if text.trim().is_empty() {
            return Err(PipelineError::invalid_response(
                "Gemini returned an empty response",
            ));
        }
        Ok(text)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, PipelineError> {
        let response = self.post("streamGenerateContent?alt=sse", prompt).await?;
        let increments = sse_events(response.bytes_stream())
            .map(|event| event.and_then(|data| parse_stream_event(&data)))
            .filter(|item| futures::future::ready(!matches!(item, Ok(text) if text.is_empty())));
        Ok(Box::pin(increments))
    }
}

fn parse_stream_event(data: &str) -> Result<String, PipelineError> {
    let parsed: GenerateResponse = serde_json::from_str(data)
        .map_err(|e| PipelineError::invalid_response(format!("Gemini stream event: {}", e)))?;
    parsed.into_text()
}

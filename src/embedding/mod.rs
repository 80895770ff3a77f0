//! Embedding provider implementations.
//!
//! Each provider implements the core [`Embedder`] trait:
//! - **[`DisabledEmbedder`]**: returns a configuration error; used when embeddings are off.
//! - **[`UnavailableEmbedder`]**: returns the error that kept a provider from being built.
//! - **[`GeminiEmbedder`]**: calls the Gemini `batchEmbedContents` endpoint.
//! - **[`OpenAiEmbedder`]**: calls the OpenAI `POST /v1/embeddings` endpoint.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: runs models locally via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named in the
//! configuration. Credentials are resolved there, so a missing key fails
//! before any request is sent.
//!
//! ```rust,no_run
//! # use llm_suite::config::EmbeddingConfig;
//! # use llm_suite::embedding::create_embedder;
//! # use llm_suite_core::embedding::Embedder;
//! let config = EmbeddingConfig { provider: "disabled".into(), ..Default::default() };
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```
//!
//! # Failures
//!
//! Providers never retry. HTTP failures are classified by
//! [`crate::http`]: 401/403 become configuration errors, 429 a rate-limit
//! rejection, other statuses remote rejections, and network failures
//! transport errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use llm_suite_core::embedding::Embedder;
use llm_suite_core::PipelineError;

use crate::config::EmbeddingConfig;
use crate::http::{build_client, classify_reqwest_error, error_from_response};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

// ============ Disabled ============

/// An embedder that always fails with a configuration error.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Err(PipelineError::Config(
            "embedding provider is disabled; document Q&A needs [embedding] provider set"
                .to_string(),
        ))
    }
}

// ============ Unavailable ============

/// Stands in for a provider that could not be configured, typically for
/// lack of a credential. Every call fails with that configuration error
/// and sends nothing.
pub struct UnavailableEmbedder {
    reason: String,
}

impl UnavailableEmbedder {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Embedder for UnavailableEmbedder {
    fn model_name(&self) -> &str {
        "unavailable"
    }

    fn dims(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Err(PipelineError::Config(self.reason.clone()))
    }
}

// ============ Gemini ============

/// Embeddings from the Gemini API.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: Option<usize>,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, PipelineError> {
        let api_key = config.resolve_api_key()?;
        let model = config.model_or_default();
        let dims = config.dims.or(match model.as_str() {
            "text-embedding-004" | "embedding-001" => Some(768),
            _ => None,
        });
        Ok(Self {
            client: build_client(config.timeout_secs, None)?,
            base_url: trim_base(config.url.as_deref().unwrap_or(GEMINI_BASE_URL)),
            api_key,
            model,
            dims,
        })
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let model_path = self.model_path();
        let requests: Vec<Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": model_path,
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });

        let response = self
            .client
            .post(format!("{}/{}:batchEmbedContents", self.base_url, model_path))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Gemini embedding service").await);
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::invalid_response(e.to_string()))?;
        let vectors = parse_gemini_response(&json)?;
        debug!(inputs = texts.len(), model = %self.model, "gemini embeddings");
        Ok(vectors)
    }
}

/// Parse `{"embeddings": [{"values": [...]}, ...]}`.
fn parse_gemini_response(json: &Value) -> Result<Vec<Vec<f32>>, PipelineError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            PipelineError::invalid_response("Gemini embedding response: missing embeddings array")
        })?;

    embeddings
        .iter()
        .map(|item| {
            let values = item.get("values").ok_or_else(|| {
                PipelineError::invalid_response("Gemini embedding response: missing values")
            })?;
            number_array(values)
        })
        .collect()
}

// ============ OpenAI ============

/// Embeddings from the OpenAI API (or a compatible server via `url`).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, PipelineError> {
        let api_key = config.resolve_api_key()?;
        let model = config.model_or_default();
        let dims = config.dims.or(match model.as_str() {
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        });
        Ok(Self {
            client: build_client(config.timeout_secs, None)?,
            base_url: trim_base(config.url.as_deref().unwrap_or(OPENAI_BASE_URL)),
            api_key,
            model,
            dims,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "OpenAI embedding service").await);
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::invalid_response(e.to_string()))?;
        parse_openai_response(&json)
    }
}

/// Parse `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>, PipelineError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| PipelineError::invalid_response("OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| PipelineError::invalid_response("OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, number_array(embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embeddings from a local Ollama instance.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: Option<usize>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(config.timeout_secs, None)?,
            url: trim_base(config.url.as_deref().unwrap_or(OLLAMA_BASE_URL)),
            model: config.model_or_default(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Ollama").await);
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::invalid_response(e.to_string()))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>, PipelineError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            PipelineError::invalid_response("Ollama response: missing embeddings array")
        })?;
    embeddings.iter().map(number_array).collect()
}

// ============ Local (fastembed) ============

/// Local inference via fastembed. The model is loaded on first use and
/// kept for the life of the embedder.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, PipelineError> {
        let model_name = config.model_or_default();
        // Validate the name up-front.
        config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            _ => 384,
        });
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel, PipelineError> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => Err(PipelineError::Config(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let fastembed_model = config_to_fastembed_model(&self.model_name)?;
        let batch_size = self.batch_size;
        let texts = texts.to_vec();
        let slot = Arc::clone(&self.model);

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| PipelineError::Config("local embedding model lock poisoned".into()))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| {
                    PipelineError::Config(format!(
                        "Failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| PipelineError::Config("local embedding model missing".into()))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| PipelineError::invalid_response(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| PipelineError::Config(format!("local embedding task failed: {}", e)))?
    }
}

// ============ Helpers ============

fn number_array(value: &Value) -> Result<Vec<f32>, PipelineError> {
    let items = value
        .as_array()
        .ok_or_else(|| PipelineError::invalid_response("embedding is not an array"))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| PipelineError::invalid_response("embedding contains a non-number"))
        })
        .collect()
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"gemini"` | [`GeminiEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, PipelineError> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "gemini" => Ok(Arc::new(GeminiEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(PipelineError::Config(
            "Local embedding provider requires --features local-embeddings-fastembed".to_string(),
        )),
        other => Err(PipelineError::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

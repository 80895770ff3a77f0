//! Configuration parsing and validation.
//!
//! LLM Suite is configured via a TOML file (default: `config/llmsuite.toml`).
//! Every section and field is optional; omitted values take the defaults
//! listed below.
//!
//! # Example Configuration
//!
//! ```toml
//! [generation]
//! provider = "gemini"            # "gemini" or "openai"
//! model = "gemini-2.0-flash"
//! api_key_env = "GEMINI_API_KEY"
//! temperature = 0.9
//! max_output_tokens = 2048
//!
//! [embedding]
//! provider = "gemini"            # "gemini", "openai", "ollama", "local", or "disabled"
//! model = "text-embedding-004"
//! batch_size = 64
//!
//! [chunking]
//! max_chars = 1000
//! overlap_chars = 200
//!
//! [retrieval]
//! top_k = 4
//!
//! [prompt]
//! budget_chars = 24000
//!
//! [conversation]
//! max_turns = 20
//!
//! [fetch]
//! timeout_secs = 15
//! max_chars = 15000
//!
//! [csv]
//! rows_per_fragment = 50
//!
//! [logging]
//! format = "pretty"              # "pretty" or "json"
//! ```
//!
//! # Validation
//!
//! [`load_config`] rejects zero sizes, an overlap that is not smaller than
//! the chunk size, sampling parameters out of range, and unknown provider
//! names.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use llm_suite_core::chunk::ChunkingParams;
use llm_suite_core::PipelineError;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "./config/llmsuite.toml";

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingParams,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub csv: CsvConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Text generation service settings.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Override the service base URL (proxies, compatible servers, tests).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,
    /// Inline credential. Takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            base_url: None,
            api_key_env: default_gemini_key_env(),
            api_key: None,
            timeout_secs: default_generation_timeout(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl GenerationConfig {
    /// Resolve the credential without touching the network.
    pub fn resolve_api_key(&self) -> Result<String, PipelineError> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env, "generation")
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.9
}
fn default_top_p() -> f32 {
    1.0
}
fn default_top_k() -> u32 {
    1
}
fn default_max_output_tokens() -> u32 {
    2048
}

/// Embedding service settings.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama` or an OpenAI/Gemini-compatible endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: None,
            api_key: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Model name, falling back to each provider's usual default.
    pub fn model_or_default(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider.as_str() {
            "openai" => "text-embedding-3-small",
            "ollama" => "nomic-embed-text",
            "local" => "all-minilm-l6-v2",
            _ => "text-embedding-004",
        }
        .to_string()
    }

    /// Environment variable holding the credential for this provider.
    pub fn key_env(&self) -> String {
        match &self.api_key_env {
            Some(name) => name.clone(),
            None if self.provider == "openai" => "OPENAI_API_KEY".to_string(),
            None => default_gemini_key_env(),
        }
    }

    pub fn resolve_api_key(&self) -> Result<String, PipelineError> {
        resolve_key(self.api_key.as_deref(), &self.key_env(), "embedding")
    }
}

fn default_embedding_provider() -> String {
    "gemini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_k")]
    pub top_k: usize,
    /// Query used to retrieve chunks when summarizing a whole document.
    #[serde(default = "default_summary_query")]
    pub summary_query: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_retrieval_k(),
            summary_query: default_summary_query(),
        }
    }
}

fn default_retrieval_k() -> usize {
    4
}
fn default_summary_query() -> String {
    "summarize the content of the uploaded document in approximately 3-5 sentences".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_budget_chars")]
    pub budget_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            budget_chars: default_budget_chars(),
        }
    }
}

fn default_budget_chars() -> usize {
    24_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Most recent turns included in a prompt; older turns are left out.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    20
}

/// Web page fetching.
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Extracted page text is truncated to this many characters.
    #[serde(default = "default_fetch_max_chars")]
    pub max_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
            max_chars: default_fetch_max_chars(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    15
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
        .to_string()
}
fn default_fetch_max_chars() -> usize {
    15_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CsvConfig {
    #[serde(default = "default_rows_per_fragment")]
    pub rows_per_fragment: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            rows_per_fragment: default_rows_per_fragment(),
        }
    }
}

fn default_rows_per_fragment() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `"pretty"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            filter: None,
        }
    }
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn resolve_key(inline: Option<&str>, env_name: &str, what: &str) -> Result<String, PipelineError> {
    if let Some(key) = inline.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    match std::env::var(env_name) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(PipelineError::Config(format!(
            "{} credential missing: set {} or the api_key field",
            what, env_name
        ))),
    }
}

/// Load and validate a configuration file.
///
/// When `path` is the default location and the file does not exist, the
/// built-in defaults are used instead.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    config
        .chunking
        .validate()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    // Generation
    match config.generation.provider.as_str() {
        "gemini" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be gemini or openai.",
            other
        ),
    }
    if config.generation.model.trim().is_empty() {
        bail!("generation.model must not be empty");
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if !(0.0..=1.0).contains(&config.generation.top_p) {
        bail!("generation.top_p must be in [0.0, 1.0]");
    }
    if config.generation.max_output_tokens == 0 {
        bail!("generation.max_output_tokens must be > 0");
    }
    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "gemini" | "openai" | "ollama" | "local" | "disabled" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be gemini, openai, ollama, local, or disabled.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    // Retrieval and prompt
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.summary_query.trim().is_empty() {
        bail!("retrieval.summary_query must not be empty");
    }
    if config.prompt.budget_chars < 256 {
        bail!("prompt.budget_chars must be >= 256");
    }

    // Fetch and CSV
    if config.fetch.timeout_secs == 0 {
        bail!("fetch.timeout_secs must be > 0");
    }
    if config.fetch.max_chars == 0 {
        bail!("fetch.max_chars must be > 0");
    }
    if config.csv.rows_per_fragment == 0 {
        bail!("csv.rows_per_fragment must be > 0");
    }

    match config.logging.format.as_str() {
        "pretty" | "json" => {}
        other => bail!("Unknown logging format: '{}'. Must be pretty or json.", other),
    }

    Ok(())
}

/// Resolve the config path, falling back to the default location.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_suite_core::ErrorKind;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.generation.model, "gemini-2.0-flash");
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.prompt.budget_chars, 24_000);
        assert_eq!(config.fetch.timeout_secs, 15);
        assert_eq!(config.fetch.max_chars, 15_000);
        assert_eq!(config.embedding.model_or_default(), "text-embedding-004");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_config(
            r#"
            [chunking]
            max_chars = 500

            [generation]
            provider = "openai"
            model = "gpt-4o-mini"
            api_key_env = "OPENAI_API_KEY"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.max_chars, 500);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.generation.provider, "openai");
        assert_eq!(config.generation.max_output_tokens, 2048);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = parse_config("[chunking]\nmax_chars = 100\noverlap_chars = 100\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn unknown_providers_are_rejected() {
        assert!(parse_config("[generation]\nprovider = \"bard\"\n").is_err());
        assert!(parse_config("[embedding]\nprovider = \"word2vec\"\n").is_err());
        assert!(parse_config("[logging]\nformat = \"xml\"\n").is_err());
    }

    #[test]
    fn inline_key_wins_over_env() {
        let config = GenerationConfig {
            api_key: Some("inline-key".to_string()),
            api_key_env: "LLMSUITE_TEST_UNSET_VARIABLE".to_string(),
            ..GenerationConfig::default()
        };
        assert_eq!(config.resolve_api_key().unwrap(), "inline-key");
    }

    #[test]
    fn missing_or_blank_key_is_config_error() {
        let config = GenerationConfig {
            api_key: Some("   ".to_string()),
            api_key_env: "LLMSUITE_TEST_UNSET_VARIABLE".to_string(),
            ..GenerationConfig::default()
        };
        let err = config.resolve_api_key().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("LLMSUITE_TEST_UNSET_VARIABLE"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(&missing).is_err());
    }
}

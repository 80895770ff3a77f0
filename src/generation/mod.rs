//! Text generation clients.
//!
//! - **[`GeminiClient`]**: Gemini `generateContent` / `streamGenerateContent`.
//! - **[`OpenAiClient`]**: OpenAI-compatible `/chat/completions`.
//!
//! Both implement the core [`Generator`] trait and share the SSE decoder
//! in [`sse`]. Neither retries; retry is left to the user.

pub mod gemini;
pub mod openai;
pub mod sse;

use std::sync::Arc;

use llm_suite_core::generation::Generator;
use llm_suite_core::PipelineError;

use crate::config::GenerationConfig;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

/// Create the [`Generator`] named by `config.provider`.
///
/// The credential is resolved first: when it is missing this returns a
/// configuration error and no client is built.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>, PipelineError> {
    config.resolve_api_key()?;
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiClient::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiClient::new(config)?)),
        other => Err(PipelineError::Config(format!(
            "Unknown generation provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_suite_core::ErrorKind;

    #[test]
    fn missing_credential_is_config_error() {
        let config = GenerationConfig {
            api_key_env: "LLMSUITE_TEST_MISSING_GEN_KEY".to_string(),
            ..GenerationConfig::default()
        };
        match create_generator(&config) {
            Err(err) => assert_eq!(err.kind(), ErrorKind::Config),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let config = GenerationConfig {
            provider: "palm".to_string(),
            api_key: Some("k".to_string()),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn builds_named_provider() {
        let config = GenerationConfig {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: Some("k".to_string()),
            ..GenerationConfig::default()
        };
        let generator = create_generator(&config).unwrap();
        assert_eq!(generator.model_name(), "gpt-4o-mini");
    }
}

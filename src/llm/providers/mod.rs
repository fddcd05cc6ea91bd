//! Provider construction from config.

pub mod dummy;
pub mod gemini;

use crate::config::LlmConfig;

use super::{LlmProvider, ProviderError};

/// Build the configured provider.
///
/// `api_key` comes from the `GEMINI_API_KEY` env var — never TOML. The
/// gemini provider refuses to start without it; the dummy provider is
/// keyless.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "gemini" => {
            let key = api_key.ok_or_else(|| {
                ProviderError::MissingApiKey(
                    "set GEMINI_API_KEY to use the gemini provider".to_string(),
                )
            })?;
            let provider = gemini::GeminiProvider::new(
                config.gemini.api_base_url.clone(),
                config.gemini.model.clone(),
                config.gemini.temperature,
                config.gemini.top_p,
                config.gemini.response_mime_type.clone(),
                config.gemini.timeout_seconds,
                key,
            )?;
            Ok(LlmProvider::Gemini(provider))
        }
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider::new())),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeminiConfig;

    fn llm_config(provider: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            gemini: GeminiConfig {
                api_base_url: "https://example.invalid/v1beta".to_string(),
                model: "gemini-2.0-flash-001".to_string(),
                temperature: 0.4,
                top_p: 0.9,
                response_mime_type: None,
                timeout_seconds: 5,
            },
        }
    }

    #[test]
    fn builds_dummy_without_key() {
        assert!(matches!(
            build(&llm_config("dummy"), None),
            Ok(LlmProvider::Dummy(_))
        ));
    }

    #[test]
    fn gemini_requires_api_key() {
        assert!(matches!(
            build(&llm_config("gemini"), None),
            Err(ProviderError::MissingApiKey(_))
        ));
        assert!(matches!(
            build(&llm_config("gemini"), Some("k".into())),
            Ok(LlmProvider::Gemini(_))
        ));
    }

    #[test]
    fn unknown_provider_rejected() {
        assert!(matches!(
            build(&llm_config("openai"), None),
            Err(ProviderError::UnknownProvider(_))
        ));
    }
}

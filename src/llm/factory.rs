//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients. This is the
//! only place that reads API keys from the environment.

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{Result, WardenError};
use crate::llm::anthropic::DEFAULT_ANTHROPIC_MODEL;
use crate::llm::gemini::DEFAULT_GEMINI_MODEL;
use crate::llm::ollama::{DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
use crate::llm::openai::DEFAULT_OPENAI_MODEL;
use crate::llm::{
    AnthropicClient, AnthropicConfig, GeminiClient, GeminiConfig, LlmClient, LlmProvider,
    MockLlmClient, OllamaClient, OllamaConfig, OpenAiClient, OpenAiConfig,
};

/// Creates an LLM client from the `[llm]` configuration.
///
/// If `api_key` is provided, it takes precedence over environment variables.
/// Otherwise the key is read from `OPENAI_API_KEY`, `ANTHROPIC_API_KEY` or
/// `GOOGLE_API_KEY` (`GEMINI_API_KEY` is also accepted). When no model is
/// configured the provider's default is used.
pub fn create_client(config: &LlmConfig, api_key: Option<String>) -> Result<Arc<dyn LlmClient>> {
    let provider: LlmProvider = config.provider.parse().map_err(WardenError::config)?;
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| default_model(provider).to_string());

    match provider {
        LlmProvider::OpenAi => {
            let key = resolve_key(api_key, &["OPENAI_API_KEY"])?;
            let mut openai = OpenAiConfig::new(key, model).with_timeout(config.timeout_secs);
            if let Some(base_url) = &config.base_url {
                openai = openai.with_base_url(base_url.clone());
            }
            Ok(Arc::new(OpenAiClient::new(openai)?))
        }
        LlmProvider::Anthropic => {
            let key = resolve_key(api_key, &["ANTHROPIC_API_KEY"])?;
            Ok(Arc::new(AnthropicClient::new(
                AnthropicConfig::new(key, model).with_timeout(config.timeout_secs),
            )?))
        }
        LlmProvider::Gemini => {
            let key = resolve_key(api_key, &["GOOGLE_API_KEY", "GEMINI_API_KEY"])?;
            Ok(Arc::new(GeminiClient::new(
                GeminiConfig::new(key, model).with_timeout(config.timeout_secs),
            )?))
        }
        LlmProvider::Ollama => {
            let base_url = config
                .base_url
                .clone()
                .or_else(|| std::env::var("OLLAMA_URL").ok())
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Ok(Arc::new(OllamaClient::new(
                OllamaConfig::new(model)
                    .with_url(base_url)
                    .with_timeout(config.timeout_secs),
            )?))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}

/// Returns the model used when the configuration does not name one.
pub fn default_model(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => DEFAULT_OPENAI_MODEL,
        LlmProvider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
        LlmProvider::Gemini => DEFAULT_GEMINI_MODEL,
        LlmProvider::Ollama => DEFAULT_OLLAMA_MODEL,
        LlmProvider::Mock => "mock",
    }
}

fn resolve_key(api_key: Option<String>, env_vars: &[&str]) -> Result<String> {
    api_key
        .filter(|key| !key.trim().is_empty())
        .or_else(|| env_vars.iter().find_map(|var| std::env::var(var).ok()))
        .ok_or_else(|| {
            WardenError::llm(format!(
                "No API key configured. Set {}.",
                env_vars.join(" or ")
            ))
        })
}

//! LLM provider implementations for adpilot.
//!
//! The reasoner behind the agent loop is any OpenAI-compatible
//! chat-completions endpoint. Building from config picks the endpoint,
//! model, and credentials.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;

use adpilot_core::Provider;
use adpilot_core::error::ProviderError;

/// Build the configured provider.
pub fn build_from_config(
    config: &adpilot_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config
        .provider
        .api_key
        .clone()
        .ok_or_else(|| ProviderError::NotConfigured("provider.api_key is not set".into()))?;

    Ok(Arc::new(OpenAiCompatProvider::new(
        "openai",
        config.provider.base_url.clone(),
        api_key,
    )))
}

//! LLM provider factory.
//!
//! This module provides a factory for creating LLM clients based on
//! application configuration. It handles provider resolution and basic
//! argument validation.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use std::sync::Arc;
use tome_core::{AppError, AppResult};

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (for providers that require it)
///
/// # Errors
/// Returns error if the provider is unknown or required secrets are missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            let client = OllamaClient::with_base_url(base_url);
            Ok(Arc::new(client))
        }
        "openai" => {
            if api_key.is_none() {
                return Err(AppError::Llm(
                    "OpenAI provider requires API key".to_string(),
                ));
            }
            // TODO: OpenAI chat client once a hosted deployment needs it
            Err(AppError::Llm(
                "OpenAI provider not yet implemented".to_string(),
            ))
        }
        _ => Err(AppError::Llm(format!("Unknown provider: {}", provider))),
    }
}

//! LLM integration crate for Tome.
//!
//! This crate provides a provider-agnostic abstraction for interacting with
//! Large Language Models (LLMs). Requests carry ordered role-tagged messages
//! and may be streamed; the planner uses temperature 0, generation uses a
//! warmer temperature.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//!
//! # Example
//! ```no_run
//! use tome_llm::{ChatMessage, LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new(vec![ChatMessage::user("Hello!")], "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

// Re-export main types
pub use client::{
    ChatMessage, LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage, Role,
};
pub use factory::create_client;
pub use providers::OllamaClient;

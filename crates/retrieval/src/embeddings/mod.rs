//! Embedding providers.
//!
//! Provider-agnostic embedding generation behind [`EmbeddingProvider`].
//! The trigram provider is deterministic and offline-capable; the Ollama
//! provider calls a local model server.

pub mod ollama;
pub mod trigram;

use std::sync::Arc;
use tome_core::{AppError, AppResult};

pub use ollama::OllamaEmbedder;
pub use trigram::TrigramProvider;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "trigram", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create an embedding provider by name.
pub fn create_provider(
    provider: &str,
    model: &str,
    dimensions: usize,
    endpoint: Option<&str>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match provider {
        "trigram" => Ok(Arc::new(TrigramProvider::new(dimensions))),

        "ollama" => Ok(Arc::new(OllamaEmbedder::new(
            endpoint.unwrap_or("http://localhost:11434"),
            model,
            dimensions,
        ))),

        _ => Err(AppError::Embedding(format!(
            "Unknown embedding provider: '{}'. Supported providers: trigram, ollama",
            provider
        ))),
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

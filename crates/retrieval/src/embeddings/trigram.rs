//! Deterministic hash-based embeddings for offline operation.

use std::collections::HashMap;

use crate::embeddings::EmbeddingProvider;
use tome_core::AppResult;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them",
];

/// Embeds text by hashing character trigrams and whole words into a
/// fixed number of dimensions.
///
/// Not a semantic model: two texts score similar when they share
/// vocabulary, nothing more. Deterministic and dependency-free, which
/// is what development, tests, and air-gapped setups need.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
}

impl TrigramProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lower = text.to_lowercase();
        let mut term_counts: HashMap<&str, usize> = HashMap::new();
        for word in lower
            .split_whitespace()
            .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        {
            *term_counts.entry(word).or_insert(0) += 1;
        }

        for (word, count) in &term_counts {
            // Each trigram contributes sqrt-scaled weight to one
            // dimension, so partial word overlap still aligns vectors.
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let slot = hash_chars(window, 37) % self.dimensions as u64;
                vector[slot as usize] += (*count as f32).sqrt();
            }

            // The whole word gets one dimension at full weight
            let slot = hash_chars(&chars, 31) % self.dimensions as u64;
            vector[slot as usize] += *count as f32;
        }

        normalize(&mut vector);
        vector
    }
}

fn hash_chars(chars: &[char], multiplier: u64) -> u64 {
    let mut acc = 0u64;
    for c in chars {
        let mut buf = [0u8; 4];
        for b in c.encode_utf8(&mut buf).bytes() {
            acc = acc.wrapping_mul(multiplier).wrapping_add(b as u64);
        }
    }
    acc
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

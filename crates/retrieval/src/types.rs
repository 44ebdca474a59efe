//! Retrieval type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A chunk of document text returned by retrieval.
///
/// Produced by the vector store or the hybrid retriever; immutable once
/// produced and consumed read-only downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Identifier, unique within the chunk's document store
    pub id: String,

    /// The chunk text
    pub text: String,

    /// Human-readable source name (e.g., filename)
    pub source: String,

    /// Page number, when the source format has pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Normalized semantic similarity in [0, 1], derived as 1/(1+distance)
    pub confidence: f32,

    /// Blended semantic+lexical score, set in multi-document mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f32>,

    /// Score assigned by an explicit rerank pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,

    /// Owning document id
    pub document_id: String,
}

impl RetrievedChunk {
    /// The score used for ranking: `final_score` when present, otherwise
    /// `confidence`.
    pub fn ranking_score(&self) -> f32 {
        self.final_score.unwrap_or(self.confidence)
    }
}

/// Chunks grouped per document, keyed by document id.
///
/// A BTreeMap keeps group iteration order deterministic.
pub type GroupedChunks = BTreeMap<String, Vec<RetrievedChunk>>;

/// A pairing of one chunk from document A with its best-matching chunk
/// from document B.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedSection {
    /// 1-based position in the aligned output
    pub section_id: usize,

    /// Chunk from the first document group
    pub left: RetrievedChunk,

    /// Best-matching chunk from the second document group
    pub right: RetrievedChunk,

    /// Cosine similarity between the paired chunks
    pub similarity: f32,
}

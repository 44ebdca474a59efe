//! Typed events emitted by the conversation engine.
//!
//! The wire shape is `{"type": ..., "value": ...}`, the frame format the
//! streaming endpoint forwards verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tome_retrieval::RetrievedChunk;

/// A deduplicated reference to a source chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub confidence: f32,
    pub text: String,
    pub document_id: String,
}

impl From<&RetrievedChunk> for SourceRef {
    fn from(chunk: &RetrievedChunk) -> Self {
        Self {
            id: chunk.id.clone(),
            source: chunk.source.clone(),
            page: chunk.page,
            confidence: chunk.confidence,
            text: chunk.text.clone(),
            document_id: chunk.document_id.clone(),
        }
    }
}

/// One sentence of the answer tied to its supporting chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceCitation {
    pub sentence: String,
    pub chunk_id: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Token-overlap score between sentence and chunk, in [0, 1]
    pub score: f32,
}

/// Source payload: flat for single answers, grouped per document for
/// comparisons. A comparison always lists every requested document id,
/// with an empty list when its retrieval found nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourcesPayload {
    Flat(Vec<SourceRef>),
    Grouped(BTreeMap<String, Vec<SourceRef>>),
}

/// An item of the per-turn event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum StreamEvent {
    Token(String),
    Citations(Vec<SentenceCitation>),
    Sources(SourcesPayload),
    Error(String),
    Done,
}

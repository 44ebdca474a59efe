//! Aligns retrieved chunks from two documents into comparable sections.
//!
//! Used by comparison answers: each section pairs the most similar chunks
//! from the two sides so the generator can contrast them point by point.

use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::types::{AlignedSection, GroupedChunks, RetrievedChunk};
use std::sync::Arc;

/// Pairs chunks from the first two document groups by embedding similarity.
pub struct SectionAligner {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SectionAligner {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// Align the first two groups of `grouped` into sections.
    ///
    /// Every left chunk gets a section with its most similar right chunk;
    /// a right chunk may partner multiple left chunks. Returns an empty
    /// alignment when either of the first two groups is empty, fewer than
    /// two groups exist, or embedding fails.
    pub async fn align(&self, grouped: &GroupedChunks) -> Vec<AlignedSection> {
        let mut sides = grouped.values();
        let (Some(left), Some(right)) = (sides.next(), sides.next()) else {
            return Vec::new();
        };
        if left.is_empty() || right.is_empty() {
            return Vec::new();
        }

        let left_embeddings = match self.embed_side(left).await {
            Some(embeddings) => embeddings,
            None => return Vec::new(),
        };
        let right_embeddings = match self.embed_side(right).await {
            Some(embeddings) => embeddings,
            None => return Vec::new(),
        };

        let mut sections = Vec::new();

        for (left_idx, left_chunk) in left.iter().enumerate() {
            let mut best: Option<(usize, f32)> = None;
            for (right_idx, right_embedding) in right_embeddings.iter().enumerate() {
                let similarity =
                    cosine_similarity(&left_embeddings[left_idx], right_embedding);
                if best.map_or(true, |(_, s)| similarity > s) {
                    best = Some((right_idx, similarity));
                }
            }

            if let Some((right_idx, similarity)) = best {
                sections.push(AlignedSection {
                    section_id: sections.len() + 1,
                    left: left_chunk.clone(),
                    right: right[right_idx].clone(),
                    similarity,
                });
            }
        }

        sections
    }

    async fn embed_side(&self, chunks: &[RetrievedChunk]) -> Option<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        match self.embedder.embed_batch(&texts).await {
            Ok(embeddings) => Some(embeddings),
            Err(e) => {
                tracing::warn!("Alignment embedding failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::create_provider;

    fn chunk(id: &str, doc: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            text: text.to_string(),
            source: format!("{}.md", doc),
            page: None,
            confidence: 0.8,
            final_score: None,
            rerank_score: None,
            document_id: doc.to_string(),
        }
    }

    fn aligner() -> SectionAligner {
        SectionAligner::new(create_provider("trigram", "trigram", 256, None).unwrap())
    }

    #[tokio::test]
    async fn test_align_pairs_similar_chunks() {
        let mut grouped = GroupedChunks::new();
        grouped.insert(
            "doc-a".to_string(),
            vec![
                chunk("a1", "doc-a", "The model architecture uses attention layers"),
                chunk("a2", "doc-a", "Training ran for twelve epochs on eight GPUs"),
            ],
        );
        grouped.insert(
            "doc-b".to_string(),
            vec![
                chunk("b1", "doc-b", "Training took nine epochs on four GPUs"),
                chunk("b2", "doc-b", "This architecture relies on attention layers too"),
            ],
        );

        let sections = aligner().align(&grouped).await;

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section_id, 1);
        // Architecture chunk pairs with architecture chunk
        assert_eq!(sections[0].left.id, "a1");
        assert_eq!(sections[0].right.id, "b2");
        assert_eq!(sections[1].left.id, "a2");
        assert_eq!(sections[1].right.id, "b1");
    }

    #[tokio::test]
    async fn test_align_empty_when_one_side_missing() {
        let mut grouped = GroupedChunks::new();
        grouped.insert(
            "doc-a".to_string(),
            vec![chunk("a1", "doc-a", "only one side has content")],
        );
        grouped.insert("doc-b".to_string(), Vec::new());

        assert!(aligner().align(&grouped).await.is_empty());
    }

    #[tokio::test]
    async fn test_align_pairs_every_left_chunk() {
        // One right chunk partners both left chunks
        let mut grouped = GroupedChunks::new();
        grouped.insert(
            "doc-a".to_string(),
            vec![
                chunk("a1", "doc-a", "first point about throughput"),
                chunk("a2", "doc-a", "second point about latency"),
            ],
        );
        grouped.insert(
            "doc-b".to_string(),
            vec![chunk("b1", "doc-b", "a single point about throughput")],
        );

        let sections = aligner().align(&grouped).await;
        assert_eq!(sections.len(), 2);
        assert!(sections.iter().all(|s| s.right.id == "b1"));
        assert_eq!(sections[0].left.id, "a1");
        assert_eq!(sections[1].left.id, "a2");
    }

    #[tokio::test]
    async fn test_align_uses_first_two_groups_only() {
        // The first group is empty; a later non-empty group must not be
        // promoted into the pair
        let mut grouped = GroupedChunks::new();
        grouped.insert("doc-a".to_string(), Vec::new());
        grouped.insert(
            "doc-b".to_string(),
            vec![chunk("b1", "doc-b", "some content here")],
        );
        grouped.insert(
            "doc-c".to_string(),
            vec![chunk("c1", "doc-c", "more content here")],
        );

        assert!(aligner().align(&grouped).await.is_empty());
    }
}

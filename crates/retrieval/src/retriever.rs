//! Hybrid retrieval: semantic similarity blended with BM25.
//!
//! Queries are classified as factual or conceptual, which picks the blend
//! weights. Factual queries lean on the semantic score; conceptual queries
//! lean on the lexical one. Multi-document retrieval ranks documents by the
//! mean of their best chunk scores, then caps how many chunks each
//! contributing document may place in the final result.

use crate::embeddings::EmbeddingProvider;
use crate::lexical::tokenize;
use crate::manager::StoreManager;
use crate::types::{GroupedChunks, RetrievedChunk};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tome_core::{AppResult, EngineConfig};

/// Phrases that mark a query as conceptual rather than factual.
const CONCEPTUAL_CUES: &[&str] = &[
    "explain",
    "what is",
    "overview",
    "theory",
    "concept",
    "how does",
    "describe",
    "introduction",
];

/// Result of one retrieval pass.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
    /// Set when the mean ranking score falls below the rerank threshold,
    /// hinting that a rerank pass would help.
    pub suggest_rerank: bool,
}

/// Retriever over the document stores managed by a [`StoreManager`].
pub struct HybridRetriever {
    manager: Arc<StoreManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: EngineConfig,
}

impl HybridRetriever {
    pub fn new(
        manager: Arc<StoreManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            manager,
            embedder,
            config,
        }
    }

    /// Classify a query as conceptual (broad, explanatory) or factual.
    pub fn is_conceptual(query: &str) -> bool {
        let lowered = query.to_lowercase();
        CONCEPTUAL_CUES.iter().any(|cue| lowered.contains(cue))
    }

    fn semantic_weight(&self, query: &str) -> f32 {
        if Self::is_conceptual(query) {
            self.config.semantic_weight_conceptual
        } else {
            self.config.semantic_weight_factual
        }
    }

    /// Retrieve up to `k` chunks for a query across the given documents.
    ///
    /// Never fails: any error along the way is logged and degrades to an
    /// empty result, so a broken store cannot take a conversation down.
    pub async fn retrieve(&self, query: &str, document_ids: &[String], k: usize) -> RetrievalResult {
        match self.try_retrieve(query, document_ids, k).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Retrieval failed for query '{}': {}", query, e);
                RetrievalResult::default()
            }
        }
    }

    async fn try_retrieve(
        &self,
        query: &str,
        document_ids: &[String],
        k: usize,
    ) -> AppResult<RetrievalResult> {
        if document_ids.is_empty() {
            return Ok(RetrievalResult::default());
        }

        let semantic_weight = self.semantic_weight(query);
        let query_embedding = self.embedder.embed(query).await?;
        let query_tokens = tokenize(query);

        let chunks = if document_ids.len() == 1 {
            // Document-scoped search is purely semantic; the lexical blend
            // only applies when ranking across documents
            self.semantic_chunks(&document_ids[0], &query_embedding, k)?
        } else {
            self.retrieve_multi(document_ids, &query_embedding, &query_tokens, k, semantic_weight)?
        };

        let suggest_rerank = Self::needs_rerank(&chunks, self.config.rerank_threshold);

        tracing::debug!(
            "Retrieved {} chunks across {} documents (semantic weight {:.1}, rerank suggested: {})",
            chunks.len(),
            document_ids.len(),
            semantic_weight,
            suggest_rerank
        );

        Ok(RetrievalResult {
            chunks,
            suggest_rerank,
        })
    }

    /// Multi-document retrieval: score every candidate document, keep the
    /// strongest few, then cap each one's share of the final result.
    fn retrieve_multi(
        &self,
        document_ids: &[String],
        query_embedding: &[f32],
        query_tokens: &[String],
        k: usize,
        semantic_weight: f32,
    ) -> AppResult<Vec<RetrievedChunk>> {
        let per_doc_cap = self.config.max_chunks_per_doc;
        let mut scored_docs: Vec<(f32, Vec<RetrievedChunk>)> = Vec::new();

        for document_id in document_ids {
            let chunks = match self.scored_chunks(
                document_id,
                query_embedding,
                query_tokens,
                k,
                semantic_weight,
            ) {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!("Skipping document '{}': {}", document_id, e);
                    continue;
                }
            };
            if chunks.is_empty() {
                continue;
            }

            // Document relevance is the mean of its best chunk scores
            let top: Vec<f32> = chunks
                .iter()
                .take(per_doc_cap)
                .map(|c| c.ranking_score())
                .collect();
            let doc_score = top.iter().sum::<f32>() / top.len() as f32;
            scored_docs.push((doc_score, chunks));
        }

        scored_docs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored_docs.truncate(self.config.top_docs);

        let mut merged: Vec<RetrievedChunk> = scored_docs
            .into_iter()
            .flat_map(|(_, chunks)| chunks.into_iter().take(per_doc_cap))
            .collect();

        merged.sort_by(|a, b| {
            b.ranking_score()
                .partial_cmp(&a.ranking_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(k);
        Ok(merged)
    }

    /// Semantic-only search against one store; hits keep their bare
    /// confidence and `final_score` stays unset.
    fn semantic_chunks(
        &self,
        document_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> AppResult<Vec<RetrievedChunk>> {
        let store = self.manager.open_store(document_id)?;
        let hits = store.search(query_embedding, k)?;
        Ok(hits.into_iter().map(|hit| hit.chunk).collect())
    }

    /// Search one document and blend semantic confidence with the
    /// max-normalized BM25 score of each hit. Results come back sorted by
    /// blended score, best first.
    fn scored_chunks(
        &self,
        document_id: &str,
        query_embedding: &[f32],
        query_tokens: &[String],
        k: usize,
        semantic_weight: f32,
    ) -> AppResult<Vec<RetrievedChunk>> {
        let store = self.manager.open_store(document_id)?;
        let hits = store.search(query_embedding, k)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let bm25 = self.manager.bm25_for(&store)?;
        let lexical_scores = bm25.scores(query_tokens);
        let max_lexical = lexical_scores.iter().cloned().fold(0.0_f32, f32::max);
        let lexical_weight = 1.0 - semantic_weight;

        let mut chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|hit| {
                let lexical = if max_lexical > 0.0 {
                    lexical_scores.get(hit.position).copied().unwrap_or(0.0) / max_lexical
                } else {
                    0.0
                };
                let mut chunk = hit.chunk;
                chunk.final_score =
                    Some(semantic_weight * chunk.confidence + lexical_weight * lexical);
                chunk
            })
            .collect();

        chunks.sort_by(|a, b| {
            b.ranking_score()
                .partial_cmp(&a.ranking_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(chunks)
    }

    fn needs_rerank(chunks: &[RetrievedChunk], threshold: f32) -> bool {
        if chunks.is_empty() {
            return false;
        }
        let mean =
            chunks.iter().map(|c| c.ranking_score()).sum::<f32>() / chunks.len() as f32;
        mean < threshold
    }

    /// Retrieve per-document chunk groups for a comparison query.
    ///
    /// Documents are searched concurrently, a handful at a time. Every
    /// requested document id appears in the output, with an empty group when
    /// its retrieval found nothing or failed.
    pub async fn retrieve_for_comparison(
        &self,
        query: &str,
        document_ids: &[String],
    ) -> GroupedChunks {
        let mut grouped = GroupedChunks::new();
        if document_ids.is_empty() {
            return grouped;
        }
        for document_id in document_ids {
            grouped.insert(document_id.clone(), Vec::new());
        }

        let semantic_weight = self.semantic_weight(query);
        let query_embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!("Comparison embedding failed: {}", e);
                return grouped;
            }
        };
        let query_tokens = tokenize(query);
        let k = self.config.top_k;

        let parallelism = document_ids.len().min(self.config.max_parallel_retrievals);
        let results: Vec<(String, Vec<RetrievedChunk>)> = stream::iter(document_ids.iter().cloned())
            .map(|document_id| {
                let embedding = query_embedding.clone();
                let tokens = query_tokens.clone();
                async move {
                    let chunks = match self.scored_chunks(
                        &document_id,
                        &embedding,
                        &tokens,
                        k,
                        semantic_weight,
                    ) {
                        Ok(mut chunks) => {
                            chunks.truncate(k);
                            chunks
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Comparison retrieval failed for '{}': {}",
                                document_id,
                                e
                            );
                            Vec::new()
                        }
                    };
                    (document_id, chunks)
                }
            })
            .buffer_unordered(parallelism.max(1))
            .collect()
            .await;

        for (document_id, chunks) in results {
            grouped.insert(document_id, chunks);
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::create_provider;
    use crate::store::StoredChunk;
    use tempfile::TempDir;

    async fn ingest(
        manager: &StoreManager,
        embedder: &Arc<dyn EmbeddingProvider>,
        document_id: &str,
        texts: &[&str],
    ) {
        let store = manager.open_store(document_id).unwrap();
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let embeddings = embedder.embed_batch(&owned).await.unwrap();
        let chunks: Vec<StoredChunk> = owned
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(position, (text, embedding))| StoredChunk {
                id: format!("{}-{}", document_id, position),
                text,
                source: format!("{}.md", document_id),
                page: None,
                position,
                embedding,
            })
            .collect();
        store.add(&chunks).unwrap();
    }

    fn retriever(dir: &TempDir) -> (HybridRetriever, Arc<StoreManager>, Arc<dyn EmbeddingProvider>) {
        let manager = Arc::new(StoreManager::new(dir.path()));
        let embedder = create_provider("trigram", "trigram", 256, None).unwrap();
        let config = EngineConfig::default();
        (
            HybridRetriever::new(Arc::clone(&manager), Arc::clone(&embedder), config),
            manager,
            embedder,
        )
    }

    #[test]
    fn test_conceptual_classification() {
        assert!(HybridRetriever::is_conceptual("Explain the attention mechanism"));
        assert!(HybridRetriever::is_conceptual("what is a transformer?"));
        assert!(HybridRetriever::is_conceptual("How does backprop work"));
        assert!(!HybridRetriever::is_conceptual("page count of the report"));
        assert!(!HybridRetriever::is_conceptual("revenue in 2024"));
    }

    #[tokio::test]
    async fn test_retrieve_single_document() {
        let dir = TempDir::new().unwrap();
        let (retriever, manager, embedder) = retriever(&dir);
        ingest(
            &manager,
            &embedder,
            "ml-paper",
            &[
                "Transformers use self attention to relate tokens in a sequence",
                "The training corpus was tokenized into subword units",
                "Cooking pasta requires salted boiling water",
            ],
        )
        .await;

        let result = retriever
            .retrieve("self attention tokens", &["ml-paper".to_string()], 2)
            .await;

        assert_eq!(result.chunks.len(), 2);
        assert!(result.chunks[0].text.contains("attention"));
        // Document-scoped search ranks on bare confidence, no blend
        assert!(result.chunks.iter().all(|c| c.final_score.is_none()));
        // Best first
        assert!(result.chunks[0].ranking_score() >= result.chunks[1].ranking_score());
    }

    #[tokio::test]
    async fn test_retrieve_missing_document_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let (retriever, _manager, _embedder) = retriever(&dir);

        let result = retriever
            .retrieve("anything", &["no-such-doc".to_string()], 3)
            .await;
        assert!(result.chunks.is_empty());
        assert!(!result.suggest_rerank);
    }

    #[tokio::test]
    async fn test_blend_formula_with_known_components() {
        let dir = TempDir::new().unwrap();
        let (retriever, manager, _embedder) = retriever(&dir);

        // Hand-built embeddings so both score components are exact: the
        // query embedding matches chunk 0 perfectly and chunk 1 not at all,
        // and the query tokens appear only in chunk 0.
        let store = manager.open_store("doc").unwrap();
        store
            .add(&[
                StoredChunk {
                    id: "c0".to_string(),
                    text: "alpha beta gamma".to_string(),
                    source: "doc.md".to_string(),
                    page: None,
                    position: 0,
                    embedding: vec![1.0, 0.0],
                },
                StoredChunk {
                    id: "c1".to_string(),
                    text: "delta epsilon zeta".to_string(),
                    source: "doc.md".to_string(),
                    page: None,
                    position: 1,
                    embedding: vec![0.0, 1.0],
                },
            ])
            .unwrap();

        let semantic_weight = 0.8;
        let chunks = retriever
            .scored_chunks("doc", &[1.0, 0.0], &tokenize("alpha beta"), 5, semantic_weight)
            .unwrap();
        assert_eq!(chunks.len(), 2);

        // c0: confidence = 1/(1+0) = 1.0, normalized lexical = 1.0
        //   final = 0.8*1.0 + 0.2*1.0 = 1.0
        // c1: confidence = 1/(1+1) = 0.5, lexical = 0.0
        //   final = 0.8*0.5 + 0.2*0.0 = 0.4
        assert_eq!(chunks[0].id, "c0");
        assert!((chunks[0].confidence - 1.0).abs() < 1e-5);
        assert!((chunks[0].final_score.unwrap() - 1.0).abs() < 1e-5);
        assert_eq!(chunks[1].id, "c1");
        assert!((chunks[1].confidence - 0.5).abs() < 1e-5);
        assert!((chunks[1].final_score.unwrap() - 0.4).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_multi_document_respects_per_doc_cap() {
        let dir = TempDir::new().unwrap();
        let (retriever, manager, embedder) = retriever(&dir);

        ingest(
            &manager,
            &embedder,
            "doc-a",
            &[
                "Gradient descent updates weights along the loss gradient",
                "Gradient descent converges with a small learning rate",
                "Gradient descent can oscillate near sharp minima",
            ],
        )
        .await;
        ingest(
            &manager,
            &embedder,
            "doc-b",
            &["A recipe for sourdough bread with a long fermentation"],
        )
        .await;

        let result = retriever
            .retrieve(
                "gradient descent learning rate",
                &["doc-a".to_string(), "doc-b".to_string()],
                5,
            )
            .await;

        let from_a = result
            .chunks
            .iter()
            .filter(|c| c.document_id == "doc-a")
            .count();
        assert!(from_a <= EngineConfig::default().max_chunks_per_doc);
        assert!(!result.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_comparison_lists_every_requested_document() {
        let dir = TempDir::new().unwrap();
        let (retriever, manager, embedder) = retriever(&dir);

        ingest(
            &manager,
            &embedder,
            "doc-a",
            &["Convolutional networks excel at image recognition"],
        )
        .await;
        // doc-b never ingested

        let grouped = retriever
            .retrieve_for_comparison(
                "compare the approaches",
                &["doc-a".to_string(), "doc-b".to_string()],
            )
            .await;

        assert_eq!(grouped.len(), 2);
        assert!(!grouped["doc-a"].is_empty());
        assert!(grouped["doc-b"].is_empty());
    }

    #[test]
    fn test_needs_rerank_thresholds() {
        let strong = RetrievedChunk {
            id: "c1".to_string(),
            text: "text".to_string(),
            source: "s.md".to_string(),
            page: None,
            confidence: 0.9,
            final_score: Some(0.9),
            rerank_score: None,
            document_id: "d".to_string(),
        };
        let weak = RetrievedChunk {
            final_score: Some(0.2),
            ..strong.clone()
        };

        assert!(!HybridRetriever::needs_rerank(&[strong.clone()], 0.75));
        assert!(HybridRetriever::needs_rerank(&[weak], 0.75));
        assert!(!HybridRetriever::needs_rerank(&[], 0.75));
    }
}

//! Tool registry and built-in tools.
//!
//! The registry is a closed dispatch table built once per process and
//! injected into the conversation engine — no global mutable state. Action
//! kinds map to handlers; names the registry has never seen resolve to
//! `Unknown` and are skipped by the loop.
//!
//! Tools signal expected failures through `Result`; the loop records them
//! as error observations and keeps going.

use crate::plan::{builtin_kind, ActionKind};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tome_core::AppResult;
use tome_retrieval::{
    cosine_similarity, tokenize, EmbeddingProvider, HybridRetriever, RetrievedChunk, StoreManager,
};

/// Everything a tool may need for one call.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub query: String,
    pub document_ids: Vec<String>,
    pub k: usize,
    /// Free-form parameters from the plan action.
    pub params: Value,
    /// Chunk observations accumulated so far this turn (rerank input).
    pub chunks: Vec<RetrievedChunk>,
    /// Whether the last retrieval suggested a rerank pass.
    pub suggest_rerank: bool,
}

/// Result of one tool call.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// New evidence chunks, extending the observation set.
    Chunks {
        chunks: Vec<RetrievedChunk>,
        suggest_rerank: bool,
    },
    /// Rescored chunks replacing the accumulated chunk observations.
    Replace(Vec<RetrievedChunk>),
    /// A list of non-chunk records.
    Records(Vec<Value>),
    /// A single record.
    Record(Value),
}

/// A callable exposed to the plan/act loop.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, invocation: &ToolInvocation) -> AppResult<ToolOutput>;
}

/// Hybrid retrieval as a tool.
pub struct RetrieveTool {
    retriever: Arc<HybridRetriever>,
}

impl RetrieveTool {
    pub fn new(retriever: Arc<HybridRetriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait::async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &str {
        "retrieve"
    }

    async fn call(&self, invocation: &ToolInvocation) -> AppResult<ToolOutput> {
        // A plan may narrow retrieval to one document
        let document_ids = match invocation.params.get("document_id").and_then(Value::as_str) {
            Some(id) => vec![id.to_string()],
            None => invocation.document_ids.clone(),
        };

        let result = self
            .retriever
            .retrieve(&invocation.query, &document_ids, invocation.k)
            .await;

        Ok(ToolOutput::Chunks {
            chunks: result.chunks,
            suggest_rerank: result.suggest_rerank,
        })
    }
}

/// Embedding-cosine rescoring of the chunks accumulated so far.
///
/// Cheap and score-preserving: when the retriever already reported strong
/// scores (`suggest_rerank == false`) the pass is skipped and the chunks
/// come back untouched.
pub struct RerankTool {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl RerankTool {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

#[async_trait::async_trait]
impl Tool for RerankTool {
    fn name(&self) -> &str {
        "rerank"
    }

    async fn call(&self, invocation: &ToolInvocation) -> AppResult<ToolOutput> {
        if invocation.chunks.is_empty() {
            return Ok(ToolOutput::Replace(Vec::new()));
        }
        if !invocation.suggest_rerank {
            tracing::debug!("Rerank skipped: retrieval scores already strong");
            return Ok(ToolOutput::Replace(invocation.chunks.clone()));
        }

        let query_embedding = self.embedder.embed(&invocation.query).await?;
        let texts: Vec<String> = invocation.chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_embeddings = self.embedder.embed_batch(&texts).await?;

        let mut reranked: Vec<RetrievedChunk> = invocation
            .chunks
            .iter()
            .zip(chunk_embeddings)
            .map(|(chunk, embedding)| {
                let mut chunk = chunk.clone();
                chunk.rerank_score = Some(cosine_similarity(&query_embedding, &embedding));
                chunk
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        reranked.truncate(invocation.k);
        Ok(ToolOutput::Replace(reranked))
    }
}

/// Pure lexical search: BM25 over each document's corpus, no embeddings.
pub struct SearchTool {
    manager: Arc<StoreManager>,
}

impl SearchTool {
    pub fn new(manager: Arc<StoreManager>) -> Self {
        Self { manager }
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    async fn call(&self, invocation: &ToolInvocation) -> AppResult<ToolOutput> {
        let document_ids = if invocation.document_ids.is_empty() {
            self.manager.list_documents()
        } else {
            invocation.document_ids.clone()
        };
        let query_tokens = tokenize(&invocation.query);

        let mut records: Vec<(f32, Value)> = Vec::new();
        for document_id in &document_ids {
            let store = match self.manager.open_store(document_id) {
                Ok(store) => store,
                Err(e) => {
                    tracing::warn!("Search skipping '{}': {}", document_id, e);
                    continue;
                }
            };
            let bm25 = match self.manager.bm25_for(&store) {
                Ok(bm25) => bm25,
                Err(e) => {
                    tracing::warn!("BM25 unavailable for '{}': {}", document_id, e);
                    continue;
                }
            };
            let texts = store.corpus_texts()?;
            let scores = bm25.scores(&query_tokens);

            for (position, (text, score)) in texts.iter().zip(&scores).enumerate() {
                if *score <= 0.0 {
                    continue;
                }
                records.push((
                    *score,
                    json!({
                        "document_id": document_id,
                        "position": position,
                        "text": text,
                        "score": score,
                    }),
                ));
            }
        }

        records.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        records.truncate(invocation.k);
        Ok(ToolOutput::Records(
            records.into_iter().map(|(_, r)| r).collect(),
        ))
    }
}

/// Dispatch table from action kinds to tools.
pub struct ToolRegistry {
    builtins: HashMap<&'static str, Arc<dyn Tool>>,
    external: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Build the registry with the built-in tool set.
    pub fn new(
        retriever: Arc<HybridRetriever>,
        embedder: Arc<dyn EmbeddingProvider>,
        manager: Arc<StoreManager>,
    ) -> Self {
        let mut builtins: HashMap<&'static str, Arc<dyn Tool>> = HashMap::new();
        builtins.insert("retrieve", Arc::new(RetrieveTool::new(retriever)));
        builtins.insert("rerank", Arc::new(RerankTool::new(embedder)));
        builtins.insert("search", Arc::new(SearchTool::new(manager)));

        Self {
            builtins,
            external: HashMap::new(),
        }
    }

    /// Registry with no built-ins; used by tests to script tool behavior.
    pub fn empty() -> Self {
        Self {
            builtins: HashMap::new(),
            external: HashMap::new(),
        }
    }

    /// Register an externally discovered tool under its advertised name.
    pub fn register_external(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!("Registered external tool '{}'", name);
        self.external.insert(name, tool);
    }

    /// Override or add a built-in-named tool (test seam).
    pub fn register_builtin(&mut self, name: &'static str, tool: Arc<dyn Tool>) {
        self.builtins.insert(name, tool);
    }

    /// Resolve an action name to its kind.
    ///
    /// Built-in names win; names of discovered external tools resolve to
    /// `External`; everything else is `Unknown`.
    pub fn resolve(&self, name: &str) -> ActionKind {
        match builtin_kind(name) {
            ActionKind::Unknown(n) if self.external.contains_key(&n) => ActionKind::External(n),
            other => other,
        }
    }

    /// Look up the handler for an action kind.
    ///
    /// `Chat`, `Generate`, and `Unknown` have no handler; the loop treats
    /// them specially.
    pub fn get(&self, kind: &ActionKind) -> Option<Arc<dyn Tool>> {
        match kind {
            ActionKind::Retrieve => self.builtins.get("retrieve").cloned(),
            ActionKind::Rerank => self.builtins.get("rerank").cloned(),
            ActionKind::Search => self.builtins.get("search").cloned(),
            ActionKind::External(name) => self.external.get(name).cloned(),
            ActionKind::Chat | ActionKind::Generate | ActionKind::Unknown(_) => None,
        }
    }

    pub fn external_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.external.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_core::AppError;
    use tome_retrieval::{create_provider, StoredChunk};

    fn invocation(query: &str, chunks: Vec<RetrievedChunk>, suggest_rerank: bool) -> ToolInvocation {
        ToolInvocation {
            query: query.to_string(),
            document_ids: Vec::new(),
            k: 5,
            params: json!({}),
            chunks,
            suggest_rerank,
        }
    }

    fn chunk(id: &str, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            text: text.to_string(),
            source: "doc.md".to_string(),
            page: None,
            confidence: score,
            final_score: Some(score),
            rerank_score: None,
            document_id: "doc".to_string(),
        }
    }

    struct FailingTool;

    #[async_trait::async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "web_search"
        }

        async fn call(&self, _invocation: &ToolInvocation) -> AppResult<ToolOutput> {
            Err(AppError::Tool {
                tool: "web_search".to_string(),
                message: "upstream unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_rerank_skips_when_not_suggested() {
        let embedder = create_provider("trigram", "trigram", 128, None).unwrap();
        let tool = RerankTool::new(embedder);

        let chunks = vec![chunk("c1", "alpha", 0.9), chunk("c2", "beta", 0.8)];
        let output = tool.call(&invocation("alpha", chunks.clone(), false)).await.unwrap();

        match output {
            ToolOutput::Replace(out) => {
                assert_eq!(out.len(), 2);
                assert!(out.iter().all(|c| c.rerank_score.is_none()));
            }
            _ => panic!("expected Replace"),
        }
    }

    #[tokio::test]
    async fn test_rerank_rescored_when_suggested() {
        let embedder = create_provider("trigram", "trigram", 128, None).unwrap();
        let tool = RerankTool::new(embedder);

        let chunks = vec![
            chunk("off-topic", "sourdough fermentation schedule", 0.9),
            chunk("on-topic", "gradient descent learning rate", 0.2),
        ];
        let output = tool
            .call(&invocation("gradient descent learning rate", chunks, true))
            .await
            .unwrap();

        match output {
            ToolOutput::Replace(out) => {
                assert!(out.iter().all(|c| c.rerank_score.is_some()));
                assert_eq!(out[0].id, "on-topic");
            }
            _ => panic!("expected Replace"),
        }
    }

    #[tokio::test]
    async fn test_search_returns_scored_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = Arc::new(StoreManager::new(dir.path()));
        let store = manager.open_store("doc-a").unwrap();
        store
            .add(&[
                StoredChunk {
                    id: "c0".to_string(),
                    text: "gradient descent converges slowly".to_string(),
                    source: "a.md".to_string(),
                    page: None,
                    position: 0,
                    embedding: vec![1.0, 0.0],
                },
                StoredChunk {
                    id: "c1".to_string(),
                    text: "bread rises overnight".to_string(),
                    source: "a.md".to_string(),
                    page: None,
                    position: 1,
                    embedding: vec![0.0, 1.0],
                },
            ])
            .unwrap();

        let tool = SearchTool::new(manager);
        let output = tool
            .call(&invocation("gradient descent", Vec::new(), true))
            .await
            .unwrap();

        match output {
            ToolOutput::Records(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0]["document_id"], "doc-a");
                assert!(records[0]["text"].as_str().unwrap().contains("gradient"));
            }
            _ => panic!("expected Records"),
        }
    }

    #[tokio::test]
    async fn test_registry_resolution() {
        let mut registry = ToolRegistry::empty();
        registry.register_external(Arc::new(FailingTool));

        assert_eq!(registry.resolve("retrieve"), ActionKind::Retrieve);
        assert_eq!(
            registry.resolve("web_search"),
            ActionKind::External("web_search".to_string())
        );
        assert_eq!(
            registry.resolve("teleport"),
            ActionKind::Unknown("teleport".to_string())
        );

        assert!(registry
            .get(&ActionKind::External("web_search".to_string()))
            .is_some());
        assert!(registry.get(&ActionKind::Generate).is_none());
        assert!(registry
            .get(&ActionKind::Unknown("teleport".to_string()))
            .is_none());

        // Failures surface as errors, never panics
        let tool = registry
            .get(&ActionKind::External("web_search".to_string()))
            .unwrap();
        let err = tool
            .call(&invocation("anything", Vec::new(), true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("web_search"));
    }
}

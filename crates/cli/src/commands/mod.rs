//! Command handlers for the Tome CLI.

pub mod ask;
pub mod chat;
pub mod ingest;
pub mod stats;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use ingest::IngestCommand;
pub use stats::StatsCommand;

use std::sync::Arc;
use tome_core::{config::AppConfig, AppResult};
use tome_engine::{
    discover_tools, ConversationEngine, Planner, PromptBuilder, SessionManager, ToolRegistry,
};
use tome_llm::create_client;
use tome_retrieval::{create_provider, HybridRetriever, SectionAligner, StoreManager};

/// Embedding dimensionality for the deterministic trigram provider.
const EMBEDDING_DIMENSIONS: usize = 384;

/// Wire up the full engine from configuration.
///
/// Built once per command invocation: stores, embedder, retriever,
/// aligner, tool registry (with external discovery), planner, sessions.
pub(crate) async fn build_engine(config: &AppConfig) -> AppResult<Arc<ConversationEngine>> {
    let embedder = create_provider(
        &config.embedding_provider,
        &config.embedding_model,
        EMBEDDING_DIMENSIONS,
        config.endpoint.as_deref(),
    )?;
    let manager = Arc::new(StoreManager::new(config.stores_dir()));
    let retriever = Arc::new(HybridRetriever::new(
        Arc::clone(&manager),
        Arc::clone(&embedder),
        config.engine.clone(),
    ));
    let aligner = SectionAligner::new(Arc::clone(&embedder));

    let mut registry = ToolRegistry::new(
        Arc::clone(&retriever),
        Arc::clone(&embedder),
        Arc::clone(&manager),
    );
    if !config.tool_servers.is_empty() {
        discover_tools(&mut registry, &config.tool_servers).await;
        tracing::info!(
            "External tools available: {:?}",
            registry.external_tool_names()
        );
    }

    let llm = create_client(
        &config.provider,
        config.endpoint.as_deref(),
        config.api_key.as_deref(),
    )?;
    let planner = Planner::new(Arc::clone(&llm), &config.model, PromptBuilder::new()?);
    let sessions = Arc::new(SessionManager::new(config.engine.min_summary_answer_len));

    let engine = ConversationEngine::new(
        sessions,
        retriever,
        aligner,
        Arc::new(registry),
        planner,
        llm,
        &config.model,
        config.engine.clone(),
    )?;
    Ok(Arc::new(engine))
}

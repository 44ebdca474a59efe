//! Retrieval crate for Tome.
//!
//! Everything between raw document text and ranked evidence lives here:
//! - Embedding providers (deterministic trigram, Ollama)
//! - Per-document SQLite-backed vector stores and the store manager
//! - BM25 lexical indexing, cached per document
//! - The hybrid retriever (semantic + lexical blend, document aggregation)
//! - The comparison aligner and the context trimmer
//! - A paragraph chunker for ingestion
//!
//! Retrieval failures degrade rather than propagate: a broken store or
//! embedding provider contributes no chunks instead of failing the turn.

pub mod align;
pub mod chunker;
pub mod embeddings;
pub mod lexical;
pub mod manager;
pub mod retriever;
pub mod store;
pub mod trim;
pub mod types;

// Re-export main types
pub use align::SectionAligner;
pub use chunker::{chunk_text, chunk_text_with_budget};
pub use embeddings::{cosine_similarity, create_provider, EmbeddingProvider};
pub use lexical::{tokenize, Bm25Index};
pub use manager::StoreManager;
pub use retriever::{HybridRetriever, RetrievalResult};
pub use store::{DocumentStore, StoredChunk, StoredHit};
pub use trim::{trim_chunks, trim_messages};
pub use types::{AlignedSection, GroupedChunks, RetrievedChunk};

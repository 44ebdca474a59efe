//! Store manager: registry of per-document stores plus a lexical index cache.
//!
//! Stores live under one base directory, one subdirectory per document.
//! BM25 indexes are cached per document and rebuilt whenever the store's
//! chunk count changes (the corpus grew or was reset).

use crate::lexical::Bm25Index;
use crate::store::{sanitize_document_id, DocumentStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tome_core::{AppError, AppResult};

/// Manages document stores under a base directory.
pub struct StoreManager {
    base_dir: PathBuf,
    bm25_cache: RwLock<HashMap<String, CachedIndex>>,
}

struct CachedIndex {
    corpus_size: usize,
    index: Arc<Bm25Index>,
}

impl StoreManager {
    /// Create a manager over the given base directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            bm25_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Base directory holding the stores.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// List known document ids (store subdirectory names).
    pub fn list_documents(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.base_dir) else {
            return Vec::new();
        };

        let mut documents: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();

        documents.sort();
        documents
    }

    /// Open a store handle for a document.
    ///
    /// Each call opens a fresh handle; concurrent retrieval workers each own
    /// their own handle.
    pub fn open_store(&self, document_id: &str) -> AppResult<DocumentStore> {
        DocumentStore::open(&self.base_dir, document_id)
    }

    /// Check whether a document has an ingested store.
    pub fn has_document(&self, document_id: &str) -> bool {
        DocumentStore::db_path(&self.base_dir, document_id).exists()
    }

    /// Get the BM25 index for a document, rebuilding when the chunk count
    /// has changed since the cached build.
    pub fn bm25_for(&self, store: &DocumentStore) -> AppResult<Arc<Bm25Index>> {
        let document_id = sanitize_document_id(store.document_id());
        let chunk_count = store.chunk_count()?;

        {
            let cache = self
                .bm25_cache
                .read()
                .map_err(|_| AppError::Retrieval("BM25 cache poisoned".to_string()))?;
            if let Some(cached) = cache.get(&document_id) {
                if cached.corpus_size == chunk_count {
                    return Ok(Arc::clone(&cached.index));
                }
            }
        }

        tracing::debug!(
            "Rebuilding BM25 index for '{}' ({} chunks)",
            document_id,
            chunk_count
        );

        let texts = store.corpus_texts()?;
        let index = Arc::new(Bm25Index::build(&texts));

        let mut cache = self
            .bm25_cache
            .write()
            .map_err(|_| AppError::Retrieval("BM25 cache poisoned".to_string()))?;
        cache.insert(
            document_id,
            CachedIndex {
                corpus_size: chunk_count,
                index: Arc::clone(&index),
            },
        );

        Ok(index)
    }
}

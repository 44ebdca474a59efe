//! SQLite-backed per-document vector store.
//!
//! Each ingested document gets its own store directory containing one
//! SQLite database of chunks and their embeddings. Search is a full-scan
//! cosine ranking; `confidence` is the similarity transform `1/(1+distance)`
//! with `distance = 1 - cosine`, so it always lies in [0, 1].

use crate::embeddings::cosine_similarity;
use crate::types::RetrievedChunk;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tome_core::{AppError, AppResult};

/// A chunk as written at ingestion time.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
    /// Corpus position within the document (insertion order)
    pub position: usize,
    pub embedding: Vec<f32>,
}

/// A search hit: the retrieved chunk plus its corpus position, which lexical
/// scorers use to line semantic hits up with BM25 score arrays.
#[derive(Debug, Clone)]
pub struct StoredHit {
    pub chunk: RetrievedChunk,
    pub position: usize,
}

/// Handle to one document's vector store.
///
/// Handles are cheap to open; concurrent retrieval opens one handle per
/// worker rather than sharing connections.
pub struct DocumentStore {
    document_id: String,
    conn: Connection,
}

impl DocumentStore {
    /// Open (or create) the store for a document under `store_dir`.
    pub fn open(store_dir: &Path, document_id: &str) -> AppResult<Self> {
        let db_path = Self::db_path(store_dir, document_id);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Retrieval(format!("Failed to create store directory: {}", e))
            })?;
        }

        let conn = Connection::open(&db_path)
            .map_err(|e| AppError::Retrieval(format!("Failed to open store: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                text TEXT NOT NULL,
                source TEXT NOT NULL,
                page INTEGER,
                embedding BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_position ON chunks(position);
            "#,
        )
        .map_err(|e| AppError::Retrieval(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Opened store for document '{}' at {:?}", document_id, db_path);

        Ok(Self {
            document_id: document_id.to_string(),
            conn,
        })
    }

    /// Path of the SQLite database for a document.
    pub fn db_path(store_dir: &Path, document_id: &str) -> PathBuf {
        store_dir.join(sanitize_document_id(document_id)).join("index.sqlite")
    }

    /// The document this store belongs to.
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Insert chunks with their embeddings.
    pub fn add(&self, chunks: &[StoredChunk]) -> AppResult<()> {
        for chunk in chunks {
            let embedding_bytes = embedding_to_bytes(&chunk.embedding);

            self.conn
                .execute(
                    "INSERT OR REPLACE INTO chunks (id, position, text, source, page, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        chunk.id,
                        chunk.position as i64,
                        chunk.text,
                        chunk.source,
                        chunk.page.map(|p| p as i64),
                        embedding_bytes,
                    ],
                )
                .map_err(|e| AppError::Retrieval(format!("Failed to insert chunk: {}", e)))?;
        }

        Ok(())
    }

    /// Search for the top-k chunks nearest to the query embedding.
    ///
    /// Results are ordered by descending confidence.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> AppResult<Vec<StoredHit>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, position, text, source, page, embedding FROM chunks ORDER BY position")
            .map_err(|e| AppError::Retrieval(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let embedding_bytes: Vec<u8> = row.get(5)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as usize,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    bytes_to_embedding(&embedding_bytes),
                ))
            })
            .map_err(|e| AppError::Retrieval(format!("Failed to query chunks: {}", e)))?;

        let mut hits: Vec<StoredHit> = Vec::new();

        for row in rows {
            let (id, position, text, source, page, embedding) =
                row.map_err(|e| AppError::Retrieval(format!("Failed to read chunk: {}", e)))?;

            let similarity = cosine_similarity(query_embedding, &embedding);
            let distance = (1.0 - similarity).max(0.0);
            let confidence = 1.0 / (1.0 + distance);

            hits.push(StoredHit {
                chunk: RetrievedChunk {
                    id,
                    text,
                    source,
                    page: page.map(|p| p as u32),
                    confidence,
                    final_score: None,
                    rerank_score: None,
                    document_id: self.document_id.clone(),
                },
                position,
            });
        }

        hits.sort_by(|a, b| {
            b.chunk
                .confidence
                .partial_cmp(&a.chunk.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        tracing::debug!(
            "Store '{}' returned {} hits (requested top-{})",
            self.document_id,
            hits.len(),
            k
        );

        Ok(hits)
    }

    /// Number of chunks in the store.
    pub fn chunk_count(&self) -> AppResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| AppError::Retrieval(format!("Failed to count chunks: {}", e)))?;
        Ok(count as usize)
    }

    /// All chunk texts in corpus (position) order, for lexical indexing.
    pub fn corpus_texts(&self) -> AppResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT text FROM chunks ORDER BY position")
            .map_err(|e| AppError::Retrieval(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| AppError::Retrieval(format!("Failed to query texts: {}", e)))?;

        let mut texts = Vec::new();
        for row in rows {
            texts.push(row.map_err(|e| AppError::Retrieval(format!("Failed to read text: {}", e)))?);
        }
        Ok(texts)
    }
}

/// Make a document id filesystem-safe for use as a store directory name.
pub fn sanitize_document_id(document_id: &str) -> String {
    document_id
        .trim_end_matches(".pdf")
        .trim_end_matches(".md")
        .trim_end_matches(".txt")
        .replace([' ', '/'], "_")
        .to_lowercase()
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

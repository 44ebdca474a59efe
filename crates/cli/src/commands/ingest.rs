//! Ingest command handler.
//!
//! Reads text files, chunks them, embeds the chunks, and writes them into
//! a per-document store under `.tome/stores/`.

use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tome_core::{config::AppConfig, AppError, AppResult};
use tome_retrieval::{chunk_text, create_provider, EmbeddingProvider, StoreManager, StoredChunk};
use walkdir::WalkDir;

/// File extensions treated as ingestible text.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst", "csv", "json", "html"];

/// Ingest documents into per-document stores
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest
    pub paths: Vec<PathBuf>,

    /// Document id (defaults to the file stem; required for directories
    /// holding more than one file per document)
    #[arg(short, long)]
    pub document: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if self.paths.is_empty() {
            return Err(AppError::Config("No paths to ingest".to_string()));
        }

        let embedder = create_provider(
            &config.embedding_provider,
            &config.embedding_model,
            super::EMBEDDING_DIMENSIONS,
            config.endpoint.as_deref(),
        )?;
        let manager = StoreManager::new(config.stores_dir());

        let files = collect_files(&self.paths)?;
        if files.is_empty() {
            return Err(AppError::Config(
                "No ingestible text files found".to_string(),
            ));
        }

        let mut documents = 0usize;
        let mut total_chunks = 0usize;
        let mut total_bytes = 0usize;

        for file in &files {
            let document_id = match &self.document {
                Some(id) => id.clone(),
                None => file
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("document")
                    .to_string(),
            };

            let chunks = ingest_file(&manager, &embedder, file, &document_id).await?;
            tracing::info!(
                "Ingested {} ({} chunks) into '{}'",
                file.display(),
                chunks,
                document_id
            );
            documents += 1;
            total_chunks += chunks;
            total_bytes += std::fs::metadata(file).map(|m| m.len() as usize).unwrap_or(0);
        }

        if self.json {
            let output = serde_json::json!({
                "files": documents,
                "chunks": total_chunks,
                "bytes": total_bytes,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Ingested {} files ({} chunks, {} bytes)",
                documents, total_chunks, total_bytes
            );
        }
        Ok(())
    }
}

/// Expand paths into a sorted list of ingestible files.
fn collect_files(paths: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "Path does not exist: {}",
                path.display()
            )));
        }
        if path.is_file() {
            files.push(path.clone());
            continue;
        }

        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && is_text_file(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Chunk, embed, and store one file. Returns the chunk count.
async fn ingest_file(
    manager: &StoreManager,
    embedder: &Arc<dyn EmbeddingProvider>,
    file: &Path,
    document_id: &str,
) -> AppResult<usize> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| AppError::Config(format!("Failed to read {}: {}", file.display(), e)))?;

    let texts = chunk_text(&text);
    if texts.is_empty() {
        tracing::warn!("{} contained no ingestible text", file.display());
        return Ok(0);
    }

    let embeddings = embedder.embed_batch(&texts).await?;
    let store = manager.open_store(document_id)?;
    let offset = store.chunk_count()?;

    let source = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(document_id)
        .to_string();
    let chunks: Vec<StoredChunk> = texts
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (text, embedding))| StoredChunk {
            id: format!("{}-{}", document_id, offset + i),
            text,
            source: source.clone(),
            page: None,
            position: offset + i,
            embedding,
        })
        .collect();

    let count = chunks.len();
    store.add(&chunks)?;
    Ok(count)
}

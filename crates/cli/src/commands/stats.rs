//! Stats command handler.

use clap::Args;
use tome_core::{config::AppConfig, AppResult};
use tome_retrieval::StoreManager;

/// Show ingested document statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let manager = StoreManager::new(config.stores_dir());
        let documents = manager.list_documents();

        let mut entries = Vec::new();
        for document_id in &documents {
            let chunks = match manager.open_store(document_id) {
                Ok(store) => store.chunk_count().unwrap_or(0),
                Err(_) => 0,
            };
            entries.push((document_id.clone(), chunks));
        }

        if self.json {
            let output = serde_json::json!({
                "documents": entries
                    .iter()
                    .map(|(id, chunks)| serde_json::json!({ "id": id, "chunks": chunks }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if entries.is_empty() {
            println!("No documents ingested. Use 'tome ingest <path>' to add some.");
        } else {
            println!("Ingested documents:");
            for (id, chunks) in entries {
                println!("  {} ({} chunks)", id, chunks);
            }
        }
        Ok(())
    }
}

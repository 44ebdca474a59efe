//! Chat command handler.
//!
//! Interactive loop over one session. The session (messages, active
//! documents, rolling summary) lives for the life of the process.

use clap::Args;
use futures::StreamExt;
use std::io::{BufRead, Write};
use tome_core::{config::AppConfig, AppResult};
use tome_engine::{SourcesPayload, StreamEvent, TurnRequest};
use tome_retrieval::StoreManager;

/// Interactive chat over ingested documents
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Activate specific document ids (default: all ingested)
    #[arg(short, long)]
    pub document: Vec<String>,

    /// Number of chunks to retrieve per store
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let engine = super::build_engine(config).await?;

        let session = engine.sessions().create_session()?;
        let documents = if self.document.is_empty() {
            StoreManager::new(config.stores_dir()).list_documents()
        } else {
            self.document.clone()
        };
        for document_id in &documents {
            engine.sessions().add_document(&session.id, document_id)?;
        }

        println!(
            "Chatting over {} document(s). Type 'exit' to quit.",
            documents.len()
        );

        let stdin = std::io::stdin();
        loop {
            print!("\n> ");
            std::io::stdout().flush().ok();

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break; // EOF
            }
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            if query == "exit" || query == "quit" {
                break;
            }

            let mut request = TurnRequest::new(&session.id, query);
            request.top_k = self.top_k;

            let mut stream = engine.stream(request);
            while let Some(event) = stream.next().await {
                match event {
                    StreamEvent::Token(token) => {
                        print!("{}", token);
                        std::io::stdout().flush().ok();
                    }
                    StreamEvent::Sources(SourcesPayload::Flat(sources)) if !sources.is_empty() => {
                        let names: Vec<&str> =
                            sources.iter().map(|s| s.source.as_str()).collect();
                        print!("\n  [sources: {}]", names.join(", "));
                    }
                    StreamEvent::Sources(SourcesPayload::Grouped(grouped)) => {
                        let names: Vec<&str> =
                            grouped.keys().map(|k| k.as_str()).collect();
                        print!("\n  [compared: {}]", names.join(" vs "));
                    }
                    StreamEvent::Error(message) => {
                        eprintln!("\nerror: {}", message);
                    }
                    _ => {}
                }
            }
            println!();
        }

        Ok(())
    }
}

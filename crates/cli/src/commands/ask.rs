//! Ask command handler.
//!
//! Runs one conversation turn against an ephemeral session: tokens stream
//! to stdout, citations and sources print after the answer.

use clap::Args;
use futures::StreamExt;
use std::io::Write;
use tome_core::{config::AppConfig, AppError, AppResult};
use tome_engine::{SourcesPayload, StreamEvent, TurnRequest};
use tome_retrieval::StoreManager;

/// Ask one question and stream the cited answer
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub query: String,

    /// Restrict to specific document ids (default: all ingested)
    #[arg(short, long)]
    pub document: Vec<String>,

    /// Force comparison mode
    #[arg(long)]
    pub compare: bool,

    /// Number of chunks to retrieve per store
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Emit raw events as JSON lines instead of formatted output
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
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
        tracing::debug!("Asking over {} documents", documents.len());

        let mut request = TurnRequest::new(&session.id, &self.query);
        request.compare_mode = self.compare;
        request.top_k = self.top_k;

        let mut stream = engine.stream(request);
        let mut failed = None;

        while let Some(event) = stream.next().await {
            if self.json {
                println!("{}", serde_json::to_string(&event)?);
                continue;
            }

            match event {
                StreamEvent::Token(token) => {
                    print!("{}", token);
                    std::io::stdout().flush().ok();
                }
                StreamEvent::Citations(citations) => {
                    if !citations.is_empty() {
                        println!("\n\nCitations:");
                        for citation in citations {
                            let page = citation
                                .page
                                .map(|p| format!(" p.{}", p))
                                .unwrap_or_default();
                            println!(
                                "  [{}{}] {}",
                                citation.source, page, citation.sentence
                            );
                        }
                    }
                }
                StreamEvent::Sources(payload) => print_sources(&payload),
                StreamEvent::Error(message) => failed = Some(message),
                StreamEvent::Done => {
                    println!();
                }
            }
        }

        match failed {
            Some(message) => Err(AppError::Other(message)),
            None => Ok(()),
        }
    }
}

fn print_sources(payload: &SourcesPayload) {
    match payload {
        SourcesPayload::Flat(sources) => {
            if sources.is_empty() {
                return;
            }
            println!("\nSources:");
            for source in sources {
                let page = source.page.map(|p| format!(" p.{}", p)).unwrap_or_default();
                println!(
                    "  {}{} (confidence {:.2})",
                    source.source, page, source.confidence
                );
            }
        }
        SourcesPayload::Grouped(grouped) => {
            println!("\nSources by document:");
            for (document_id, sources) in grouped {
                println!("  {}: {} passages", document_id, sources.len());
            }
        }
    }
}

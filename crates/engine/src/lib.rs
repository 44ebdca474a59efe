//! Conversation engine crate for Tome.
//!
//! Orchestrates one conversation turn end to end: session memory, plan
//! generation (with short-circuits and a fixed fallback), tool dispatch
//! through an injected registry, evidence trimming, and a streaming
//! grounded answer with sentence-level citations.
//!
//! The entry point is [`ConversationEngine::stream`], which returns a
//! stream of typed [`StreamEvent`]s for one [`TurnRequest`].

pub mod engine;
pub mod events;
pub mod external;
pub mod generate;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod session;
pub mod tools;

#[cfg(test)]
mod testing;

// Re-export main types
pub use engine::{ConversationEngine, TurnRequest};
pub use events::{SentenceCitation, SourceRef, SourcesPayload, StreamEvent};
pub use external::discover_tools;
pub use plan::{Action, ActionKind, Plan};
pub use planner::{detect_comparison, is_acknowledgement, Planner, SessionSnapshot};
pub use prompts::PromptBuilder;
pub use session::{Message, ObservationPreview, Session, SessionManager, SessionSummary};
pub use tools::{Tool, ToolInvocation, ToolOutput, ToolRegistry};

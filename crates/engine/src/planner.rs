//! Turn planning.
//!
//! Planning is pure: it reads a session snapshot and the query, and
//! produces a plan without touching session state. Two well-known intents
//! short-circuit the LLM call entirely — comparisons (the LLM is
//! unreliable at authoring that plan) and bare acknowledgements (no plan
//! needed). Everything else goes to the planner model at temperature 0,
//! with the fixed fallback covering malformed output.

use crate::plan::{fallback_plan, parse_plan, Action, ActionKind, Plan};
use crate::prompts::PromptBuilder;
use crate::session::Message;
use crate::tools::ToolRegistry;
use serde_json::json;
use std::sync::Arc;
use tome_llm::{ChatMessage, LlmClient, LlmRequest};

/// Vocabulary marking a comparison query.
const COMPARISON_CUES: &[&str] = &["compare", "difference", "differences", "versus", "contrast"];

/// Bare acknowledgements that end a topic rather than opening one.
const ACK_PHRASES: &[&str] = &[
    "thanks",
    "thank you",
    "thx",
    "ok",
    "okay",
    "fine",
    "got it",
    "cool",
    "great",
    "very good",
    "nice",
];

/// What the planner sees of a session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub recent_messages: Vec<Message>,
    pub active_documents: Vec<String>,
}

/// Decide whether a query asks for a cross-document comparison.
///
/// Requires at least two active documents; "compare" against one document
/// is an ordinary question.
pub fn detect_comparison(query: &str, active_documents: &[String]) -> bool {
    if active_documents.len() < 2 {
        return false;
    }
    let lowered = query.to_lowercase();
    lowered.split_whitespace().any(|word| {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        word == "vs" || COMPARISON_CUES.contains(&word)
    })
}

/// Detect a bare acknowledgement ("thanks", "ok", ...).
pub fn is_acknowledgement(query: &str) -> bool {
    let normalized = query
        .trim()
        .trim_end_matches(['!', '.'])
        .trim()
        .to_lowercase();
    ACK_PHRASES.contains(&normalized.as_str())
}

/// Produces plans for the conversation engine.
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompts: PromptBuilder,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompts: PromptBuilder) -> Self {
        Self {
            llm,
            model: model.into(),
            prompts,
        }
    }

    /// Plan the next actions for a turn.
    ///
    /// Never fails: short-circuits handle well-known intents, and any LLM
    /// or parse problem degrades to the fixed fallback plan.
    pub async fn plan(
        &self,
        snapshot: &SessionSnapshot,
        query: &str,
        registry: &ToolRegistry,
    ) -> Plan {
        let has_documents = !snapshot.active_documents.is_empty();

        if detect_comparison(query, &snapshot.active_documents) {
            tracing::debug!("Comparison intent: short-circuiting planner");
            let mut generate = Action::new(ActionKind::Generate);
            generate.params = json!({ "compare_mode": true });
            return Plan {
                actions: vec![Action::new(ActionKind::Retrieve), generate],
            };
        }

        if is_acknowledgement(query) {
            tracing::debug!("Acknowledgement: chat-only plan");
            return fallback_plan(false);
        }

        match self.plan_with_llm(snapshot, query, registry).await {
            Some(plan) if !plan.is_empty() => plan,
            _ => {
                tracing::debug!("Planner output unusable, using fallback plan");
                fallback_plan(has_documents)
            }
        }
    }

    async fn plan_with_llm(
        &self,
        snapshot: &SessionSnapshot,
        query: &str,
        registry: &ToolRegistry,
    ) -> Option<Plan> {
        let mut action_names: Vec<String> = ["chat", "retrieve", "rerank", "search", "generate"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        action_names.extend(registry.external_tool_names());

        let snapshot_json = json!({
            "recent_messages": snapshot
                .recent_messages
                .iter()
                .map(|m| json!({
                    "role": m.role.as_str(),
                    "content": m.content.chars().take(200).collect::<String>(),
                }))
                .collect::<Vec<_>>(),
            "active_documents": snapshot.active_documents,
        });

        let system = self.prompts.planner_system(&action_names).ok()?;
        let user = self.prompts.planner_user(&snapshot_json, query).ok()?;

        let request = LlmRequest::new(
            vec![ChatMessage::system(system), ChatMessage::user(user)],
            &self.model,
        )
        .with_temperature(0.0);

        let response = match self.llm.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Planner LLM call failed: {}", e);
                return None;
            }
        };

        parse_plan(&response.content, |name| registry.resolve(name))
    }
}

//! Prompt templates for planning, answering, and comparison.
//!
//! Templates are Handlebars strings registered once at construction and
//! rendered with plain-text escaping disabled. Wording is internal and may
//! change; the planner's JSON output contract is the only binding shape.

use handlebars::Handlebars;
use serde_json::json;
use tome_core::{AppError, AppResult};

const PLANNER_SYSTEM: &str = "\
You are a planner. Decide WHAT actions to take; do not answer the user.

Available actions:
{{#each actions}}- {{this}}
{{/each}}
Rules:
1. Output ONLY valid JSON
2. Do not explain reasoning
3. Choose the minimum actions needed
4. Tool actions come before \"generate\"
5. Always end with \"generate\"";

const PLANNER_USER: &str = "\
Session state:
{{snapshot}}

User query:
{{query}}

Return a JSON plan with this schema:

{\"actions\": [{\"name\": \"<action_name>\", \"params\": {}}]}";

const ANSWER_SYSTEM: &str = "\
You are a factual assistant. Answer using ONLY the provided context.
If the answer is not present in the context, say you cannot find it in
the documents. Never invent citations or facts.";

const ANSWER_USER: &str = "\
{{#if summary}}Conversation summary:
{{summary}}

{{/if}}{{#if messages}}Recent conversation:
{{messages}}

{{/if}}{{#if context}}Context:
{{context}}

{{/if}}{{#if observations}}Observations:
{{observations}}

{{/if}}Question:
{{query}}";

const COMPARISON_SYSTEM: &str = "\
You are a document comparison assistant. Contrast the paired sections
point by point, citing which document each statement comes from. Use ONLY
the provided sections.";

const COMPARISON_ALIGNED: &str = "\
Compare the documents for this question:
{{query}}

Aligned sections:
{{#each sections}}
## Section {{this.section_id}} (similarity {{this.similarity}})
[{{this.left_document}}] {{this.left_text}}
[{{this.right_document}}] {{this.right_text}}
{{/each}}";

const COMPARISON_GROUPED: &str = "\
Compare the documents for this question:
{{query}}

No sections aligned; contrast the retrieved passages per document.
{{#each groups}}
## Document: {{this.document_id}}
{{this.text}}
{{/each}}";

/// Renders engine prompts from registered templates.
pub struct PromptBuilder {
    handlebars: Handlebars<'static>,
}

impl PromptBuilder {
    pub fn new() -> AppResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);

        for (name, template) in [
            ("planner_system", PLANNER_SYSTEM),
            ("planner_user", PLANNER_USER),
            ("answer_system", ANSWER_SYSTEM),
            ("answer_user", ANSWER_USER),
            ("comparison_system", COMPARISON_SYSTEM),
            ("comparison_aligned", COMPARISON_ALIGNED),
            ("comparison_grouped", COMPARISON_GROUPED),
        ] {
            handlebars
                .register_template_string(name, template)
                .map_err(|e| {
                    AppError::Plan(format!("Failed to register template '{}': {}", name, e))
                })?;
        }

        Ok(Self { handlebars })
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> AppResult<String> {
        self.handlebars
            .render(name, data)
            .map_err(|e| AppError::Plan(format!("Failed to render template '{}': {}", name, e)))
    }

    /// System prompt for the planner, listing the action vocabulary.
    pub fn planner_system(&self, action_names: &[String]) -> AppResult<String> {
        self.render("planner_system", &json!({ "actions": action_names }))
    }

    /// User prompt for the planner: session snapshot JSON plus the query.
    pub fn planner_user(&self, snapshot: &serde_json::Value, query: &str) -> AppResult<String> {
        let snapshot_text = serde_json::to_string_pretty(snapshot)?;
        self.render(
            "planner_user",
            &json!({ "snapshot": snapshot_text, "query": query }),
        )
    }

    pub fn answer_system(&self) -> AppResult<String> {
        self.render("answer_system", &json!({}))
    }

    /// User prompt for generation, seeded with trimmed evidence and memory.
    pub fn answer_user(
        &self,
        query: &str,
        context: &str,
        summary: &str,
        messages: &str,
        observations: &str,
    ) -> AppResult<String> {
        self.render(
            "answer_user",
            &json!({
                "query": query,
                "context": context,
                "summary": summary,
                "messages": messages,
                "observations": observations,
            }),
        )
    }

    pub fn comparison_system(&self) -> AppResult<String> {
        self.render("comparison_system", &json!({}))
    }

    pub fn comparison_aligned(
        &self,
        query: &str,
        sections: &[tome_retrieval::AlignedSection],
    ) -> AppResult<String> {
        let sections: Vec<serde_json::Value> = sections
            .iter()
            .map(|s| {
                json!({
                    "section_id": s.section_id,
                    "similarity": format!("{:.2}", s.similarity),
                    "left_document": s.left.document_id,
                    "left_text": s.left.text,
                    "right_document": s.right.document_id,
                    "right_text": s.right.text,
                })
            })
            .collect();
        self.render(
            "comparison_aligned",
            &json!({ "query": query, "sections": sections }),
        )
    }

    pub fn comparison_grouped(
        &self,
        query: &str,
        grouped: &tome_retrieval::GroupedChunks,
    ) -> AppResult<String> {
        let groups: Vec<serde_json::Value> = grouped
            .iter()
            .map(|(document_id, chunks)| {
                let text = if chunks.is_empty() {
                    "(no relevant passages retrieved)".to_string()
                } else {
                    chunks
                        .iter()
                        .map(|c| c.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n")
                };
                json!({ "document_id": document_id, "text": text })
            })
            .collect();
        self.render(
            "comparison_grouped",
            &json!({ "query": query, "groups": groups }),
        )
    }
}

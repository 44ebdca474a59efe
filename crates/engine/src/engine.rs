//! The conversation engine: per-turn orchestration state machine.
//!
//! One turn runs LOAD → (COMPARE | REACT_LOOP) → GENERATE → PERSIST →
//! DONE, emitting a typed event stream along the way. Tool failures and
//! malformed plans recover locally; only a missing session and an
//! exhausted step budget surface as error events.
//!
//! The whole turn runs on one task. The only fan-out is per-document
//! comparison retrieval inside the hybrid retriever, which writes into a
//! result map keyed by document id. A consumer may stop reading the event
//! stream at any point; state persisted before the drop stays valid, and
//! persistence that would have followed stream completion simply does not
//! happen.

use crate::events::{SourcesPayload, StreamEvent};
use crate::generate::{build_context_block, dedup_sources, generate_citations};
use crate::plan::ActionKind;
use crate::planner::{detect_comparison, Planner, SessionSnapshot};
use crate::prompts::PromptBuilder;
use crate::session::SessionManager;
use crate::tools::{ToolInvocation, ToolOutput, ToolRegistry};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tome_core::{AppResult, EngineConfig};
use tome_llm::{ChatMessage, LlmClient, LlmRequest, Role};
use tome_retrieval::{trim_chunks, trim_messages, HybridRetriever, RetrievedChunk, SectionAligner};

/// Sampling temperature for answer generation; planning runs at 0.
const GENERATION_TEMPERATURE: f32 = 0.7;

/// Fixed answer for the empty-retrieval path.
const NO_CONTEXT_ANSWER: &str =
    "I could not find relevant context for this question in the active documents.";

/// One user turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub query: String,
    /// Force comparison mode; otherwise detected from the query.
    pub compare_mode: bool,
    /// Override the session's active document set for this turn.
    pub document_ids: Option<Vec<String>>,
    pub top_k: Option<usize>,
}

impl TurnRequest {
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            compare_mode: false,
            document_ids: None,
            top_k: None,
        }
    }
}

/// One action result accumulated during the loop. Discarded at turn end;
/// only previews persist on the session.
#[derive(Debug, Clone)]
enum Observation {
    Chunk(RetrievedChunk),
    Record(Value),
    ToolError { tool: String, error: String },
}

fn chunk_observations(observations: &[Observation]) -> Vec<RetrievedChunk> {
    observations
        .iter()
        .filter_map(|o| match o {
            Observation::Chunk(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .collect()
}

/// Drives conversation turns; constructed once per process with its
/// collaborators injected.
pub struct ConversationEngine {
    sessions: Arc<SessionManager>,
    retriever: Arc<HybridRetriever>,
    aligner: SectionAligner,
    registry: Arc<ToolRegistry>,
    planner: Planner,
    llm: Arc<dyn LlmClient>,
    model: String,
    prompts: PromptBuilder,
    config: EngineConfig,
}

impl ConversationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionManager>,
        retriever: Arc<HybridRetriever>,
        aligner: SectionAligner,
        registry: Arc<ToolRegistry>,
        planner: Planner,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        config: EngineConfig,
    ) -> AppResult<Self> {
        Ok(Self {
            sessions,
            retriever,
            aligner,
            registry,
            planner,
            llm,
            model: model.into(),
            prompts: PromptBuilder::new()?,
            config,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Run one turn, returning its event stream.
    ///
    /// The turn executes on a spawned task; dropping the stream stops
    /// event delivery but does not roll back state persisted so far.
    pub fn stream(self: &Arc<Self>, request: TurnRequest) -> impl Stream<Item = StreamEvent> {
        let engine = Arc::clone(self);
        let (tx, rx) = mpsc::unbounded();

        tokio::spawn(async move {
            if let Err(e) = engine.run_turn(&request, &tx).await {
                tracing::error!("Turn failed: {}", e);
                let _ = tx.unbounded_send(StreamEvent::Error(e.to_string()));
            }
        });

        rx
    }

    async fn run_turn(
        &self,
        request: &TurnRequest,
        tx: &UnboundedSender<StreamEvent>,
    ) -> AppResult<()> {
        // LOAD
        let Some(session) = self.sessions.get_session(&request.session_id)? else {
            let _ = tx.unbounded_send(StreamEvent::Error("Session not found".to_string()));
            return Ok(());
        };
        self.sessions
            .append_message(&request.session_id, Role::User, &request.query)?;

        let summary = self.sessions.summary(&request.session_id)?;
        let recent = self
            .sessions
            .recent_messages(&request.session_id, self.config.recent_message_limit)?;
        let transcript_lines: Vec<String> = recent
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect();
        let transcript =
            trim_messages(&transcript_lines, self.config.max_message_chars).join("\n");

        let active_docs = match &request.document_ids {
            Some(ids) if !ids.is_empty() => ids.clone(),
            _ => session.active_documents.clone(),
        };
        let top_k = request.top_k.unwrap_or(self.config.top_k);

        let compare =
            request.compare_mode || detect_comparison(&request.query, &active_docs);
        if compare && active_docs.len() >= 2 {
            return self
                .run_comparison(request, tx, &active_docs)
                .await;
        }

        // REACT_LOOP
        let mut observations: Vec<Observation> = Vec::new();
        let mut suggest_rerank = true;
        let mut retrieval_ran = false;
        let mut step = 0;

        while step < self.config.max_steps {
            step += 1;

            let snapshot = SessionSnapshot {
                recent_messages: recent
                    .iter()
                    .rev()
                    .take(5)
                    .rev()
                    .cloned()
                    .collect(),
                active_documents: active_docs.clone(),
            };
            let plan = self
                .planner
                .plan(&snapshot, &request.query, &self.registry)
                .await;
            if plan.is_empty() {
                break;
            }

            for action in plan.actions {
                match &action.kind {
                    ActionKind::Generate => {
                        return self
                            .run_generate(
                                request,
                                tx,
                                &active_docs,
                                &observations,
                                retrieval_ran,
                                &summary,
                                &transcript,
                            )
                            .await;
                    }
                    ActionKind::Chat => {
                        // Chat carries no tool work; generation handles it
                        continue;
                    }
                    ActionKind::Unknown(name) => {
                        tracing::debug!("Skipping unknown action '{}'", name);
                        continue;
                    }
                    kind => {
                        let Some(tool) = self.registry.get(kind) else {
                            tracing::debug!("No handler for action '{}'", kind.name());
                            continue;
                        };

                        let invocation = ToolInvocation {
                            query: request.query.clone(),
                            document_ids: active_docs.clone(),
                            k: top_k,
                            params: action.params.clone(),
                            chunks: chunk_observations(&observations),
                            suggest_rerank,
                        };

                        match tool.call(&invocation).await {
                            Err(e) => {
                                tracing::warn!("Tool '{}' failed: {}", kind.name(), e);
                                observations.push(Observation::ToolError {
                                    tool: kind.name().to_string(),
                                    error: e.to_string(),
                                });
                            }
                            Ok(output) => {
                                self.record_observation(request, kind.name(), &output)?;
                                match output {
                                    ToolOutput::Chunks {
                                        chunks,
                                        suggest_rerank: suggestion,
                                    } => {
                                        retrieval_ran = true;
                                        suggest_rerank = suggestion;
                                        observations
                                            .extend(chunks.into_iter().map(Observation::Chunk));
                                    }
                                    ToolOutput::Replace(chunks) => {
                                        observations
                                            .retain(|o| !matches!(o, Observation::Chunk(_)));
                                        observations
                                            .extend(chunks.into_iter().map(Observation::Chunk));
                                    }
                                    ToolOutput::Records(items) => {
                                        observations
                                            .extend(items.into_iter().map(Observation::Record));
                                    }
                                    ToolOutput::Record(value) => {
                                        observations.push(Observation::Record(value));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let _ = tx.unbounded_send(StreamEvent::Error(
            "Agent exceeded maximum steps".to_string(),
        ));
        Ok(())
    }

    /// COMPARE: concurrent per-document retrieval, alignment, structured
    /// comparison answer.
    async fn run_comparison(
        &self,
        request: &TurnRequest,
        tx: &UnboundedSender<StreamEvent>,
        active_docs: &[String],
    ) -> AppResult<()> {
        let grouped = self
            .retriever
            .retrieve_for_comparison(&request.query, active_docs)
            .await;
        let sections = self.aligner.align(&grouped).await;

        let user_prompt = if sections.is_empty() {
            tracing::debug!("No aligned sections; falling back to grouped comparison");
            self.prompts.comparison_grouped(&request.query, &grouped)?
        } else {
            self.prompts.comparison_aligned(&request.query, &sections)?
        };
        let messages = vec![
            ChatMessage::system(self.prompts.comparison_system()?),
            ChatMessage::user(user_prompt),
        ];

        let Some(full_answer) = self.stream_tokens(tx, messages).await? else {
            return Ok(()); // consumer dropped mid-stream
        };

        // Every requested document id appears, empty groups included
        let grouped_sources = grouped
            .iter()
            .map(|(document_id, chunks)| {
                (document_id.clone(), chunks.iter().map(Into::into).collect())
            })
            .collect();
        let _ = tx.unbounded_send(StreamEvent::Sources(SourcesPayload::Grouped(
            grouped_sources,
        )));

        if !full_answer.trim().is_empty() {
            self.sessions
                .append_message(&request.session_id, Role::Assistant, &full_answer)?;
            self.sessions
                .maybe_update_summary(&request.session_id, &request.query, &full_answer)?;
        }
        let _ = tx.unbounded_send(StreamEvent::Done);
        Ok(())
    }

    /// GENERATE: trim evidence, stream the grounded answer, cite, persist.
    #[allow(clippy::too_many_arguments)]
    async fn run_generate(
        &self,
        request: &TurnRequest,
        tx: &UnboundedSender<StreamEvent>,
        active_docs: &[String],
        observations: &[Observation],
        retrieval_ran: bool,
        summary: &str,
        transcript: &str,
    ) -> AppResult<()> {
        let chunks = chunk_observations(observations);
        let (trimmed, _used_sources) = trim_chunks(
            &chunks,
            self.config.max_context_chars,
            self.config.score_drop_delta,
        );

        // Empty retrieval is a clean outcome, not an error
        if retrieval_ran && trimmed.is_empty() && !active_docs.is_empty() {
            if tx
                .unbounded_send(StreamEvent::Token(NO_CONTEXT_ANSWER.to_string()))
                .is_err()
            {
                return Ok(());
            }
            let _ = tx.unbounded_send(StreamEvent::Sources(SourcesPayload::Flat(Vec::new())));
            self.sessions
                .append_message(&request.session_id, Role::Assistant, NO_CONTEXT_ANSWER)?;
            let _ = tx.unbounded_send(StreamEvent::Done);
            return Ok(());
        }

        let context_block = build_context_block(&trimmed);
        let observation_notes = self.observation_notes(request, observations)?;
        let user_prompt = self.prompts.answer_user(
            &request.query,
            &context_block,
            summary,
            transcript,
            &observation_notes,
        )?;
        let messages = vec![
            ChatMessage::system(self.prompts.answer_system()?),
            ChatMessage::user(user_prompt),
        ];

        let Some(full_answer) = self.stream_tokens(tx, messages).await? else {
            return Ok(());
        };

        let citations = generate_citations(&full_answer, &trimmed);
        let _ = tx.unbounded_send(StreamEvent::Citations(citations));
        let _ = tx.unbounded_send(StreamEvent::Sources(SourcesPayload::Flat(dedup_sources(
            &trimmed,
        ))));

        // PERSIST
        if !full_answer.trim().is_empty() {
            self.sessions
                .append_message(&request.session_id, Role::Assistant, &full_answer)?;
            self.sessions
                .maybe_update_summary(&request.session_id, &request.query, &full_answer)?;
        }

        let _ = tx.unbounded_send(StreamEvent::Done);
        Ok(())
    }

    /// Stream an LLM answer, forwarding each fragment as a token event.
    ///
    /// Returns the accumulated answer, or `None` when the consumer dropped
    /// the stream (nothing further should be persisted by callers that
    /// only persist at stream completion).
    async fn stream_tokens(
        &self,
        tx: &UnboundedSender<StreamEvent>,
        messages: Vec<ChatMessage>,
    ) -> AppResult<Option<String>> {
        let llm_request = LlmRequest::new(messages, &self.model)
            .with_temperature(GENERATION_TEMPERATURE)
            .with_streaming();

        let mut stream = self.llm.stream(&llm_request).await?;
        let mut full_answer = String::new();

        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if !fragment.content.is_empty() {
                full_answer.push_str(&fragment.content);
                if tx
                    .unbounded_send(StreamEvent::Token(fragment.content))
                    .is_err()
                {
                    return Ok(None);
                }
            }
            if fragment.done {
                break;
            }
        }
        Ok(Some(full_answer))
    }

    /// Persist a preview of a successful tool result on the session.
    fn record_observation(
        &self,
        request: &TurnRequest,
        tool: &str,
        output: &ToolOutput,
    ) -> AppResult<()> {
        let preview = match output {
            ToolOutput::Chunks { chunks, .. } | ToolOutput::Replace(chunks) => chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(" | "),
            ToolOutput::Records(items) => serde_json::to_string(items)?,
            ToolOutput::Record(value) => value.to_string(),
        };
        if preview.is_empty() {
            return Ok(());
        }
        self.sessions
            .add_observation(&request.session_id, tool, &preview)
    }

    /// Notes for the generation prompt: persisted previews plus this
    /// turn's record and error observations.
    fn observation_notes(
        &self,
        request: &TurnRequest,
        observations: &[Observation],
    ) -> AppResult<String> {
        let mut notes: Vec<String> = Vec::new();

        for observation in observations {
            match observation {
                Observation::Record(value) => notes.push(value.to_string()),
                Observation::ToolError { tool, error } => {
                    notes.push(format!("[{} failed: {}]", tool, error));
                }
                Observation::Chunk(_) => {} // already in the context block
            }
        }

        for preview in self.sessions.observations(&request.session_id)? {
            notes.push(format!("{}: {}", preview.tool, preview.preview));
        }

        notes.truncate(10);
        Ok(notes.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlm;
    use crate::tools::Tool;
    use tome_core::AppError;
    use tome_retrieval::{create_provider, StoreManager, StoredChunk};

    const PLAN_RETRIEVE_GENERATE: &str =
        r#"{"actions": [{"name": "retrieve", "params": {}}, {"name": "generate", "params": {}}]}"#;
    const PLAN_RETRIEVE_ONLY: &str = r#"{"actions": [{"name": "retrieve", "params": {}}]}"#;

    struct AlwaysFailingTool(&'static str);

    #[async_trait::async_trait]
    impl Tool for AlwaysFailingTool {
        fn name(&self) -> &str {
            self.0
        }

        async fn call(&self, _invocation: &ToolInvocation) -> AppResult<ToolOutput> {
            Err(AppError::Tool {
                tool: self.0.to_string(),
                message: "always fails".to_string(),
            })
        }
    }

    struct Fixture {
        engine: Arc<ConversationEngine>,
        sessions: Arc<SessionManager>,
        manager: Arc<StoreManager>,
        embedder: Arc<dyn tome_retrieval::EmbeddingProvider>,
        _dir: tempfile::TempDir,
    }

    /// Full engine over a temp store directory and a scripted LLM.
    ///
    /// The planner and generator share one mock, so scripts interleave
    /// planner JSON and answer text in call order.
    fn fixture(llm_script: Vec<&str>, failing_tools: bool) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig::default();

        let manager = Arc::new(StoreManager::new(dir.path()));
        let embedder = create_provider("trigram", "trigram", 128, None).unwrap();
        let retriever = Arc::new(HybridRetriever::new(
            Arc::clone(&manager),
            Arc::clone(&embedder),
            config.clone(),
        ));
        let aligner = SectionAligner::new(Arc::clone(&embedder));

        let registry = if failing_tools {
            let mut registry = ToolRegistry::empty();
            registry.register_builtin("retrieve", Arc::new(AlwaysFailingTool("retrieve")));
            registry.register_builtin("rerank", Arc::new(AlwaysFailingTool("rerank")));
            registry.register_builtin("search", Arc::new(AlwaysFailingTool("search")));
            registry
        } else {
            ToolRegistry::new(
                Arc::clone(&retriever),
                Arc::clone(&embedder),
                Arc::clone(&manager),
            )
        };
        let registry = Arc::new(registry);

        let llm: Arc<dyn LlmClient> = Arc::new(MockLlm::scripted(llm_script));
        let planner = Planner::new(Arc::clone(&llm), "mock", PromptBuilder::new().unwrap());
        let sessions = Arc::new(SessionManager::new(config.min_summary_answer_len));

        let engine = Arc::new(
            ConversationEngine::new(
                Arc::clone(&sessions),
                retriever,
                aligner,
                registry,
                planner,
                llm,
                "mock",
                config,
            )
            .unwrap(),
        );

        Fixture {
            engine,
            sessions,
            manager,
            embedder,
            _dir: dir,
        }
    }

    async fn ingest(fixture: &Fixture, document_id: &str, texts: &[&str]) {
        let store = fixture.manager.open_store(document_id).unwrap();
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let embeddings = fixture.embedder.embed_batch(&owned).await.unwrap();
        let chunks: Vec<StoredChunk> = owned
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(position, (text, embedding))| StoredChunk {
                id: format!("{}-{}", document_id, position),
                text,
                source: format!("{}.md", document_id),
                page: None,
                position,
                embedding,
            })
            .collect();
        store.add(&chunks).unwrap();
    }

    async fn collect_events(
        fixture: &Fixture,
        request: TurnRequest,
    ) -> Vec<StreamEvent> {
        fixture.engine.stream(request).collect().await
    }

    fn answer_text(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_missing_session_is_terminal_error() {
        let fixture = fixture(vec![], false);

        let events =
            collect_events(&fixture, TurnRequest::new("no-such-session", "hello")).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error(message) => assert!(message.contains("Session not found")),
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_turn_with_retrieval_and_citations() {
        let answer = "Transformers use self attention to relate tokens in a sequence.";
        // One planner call, then one generation stream
        let fixture = fixture(vec![PLAN_RETRIEVE_GENERATE, answer], false);
        ingest(
            &fixture,
            "ml-paper",
            &[
                "Transformers use self attention to relate tokens in a sequence",
                "Cooking pasta requires salted boiling water",
            ],
        )
        .await;

        let session = fixture.sessions.create_session().unwrap();
        fixture.sessions.add_document(&session.id, "ml-paper").unwrap();

        let events = collect_events(
            &fixture,
            TurnRequest::new(&session.id, "how do transformers relate tokens?"),
        )
        .await;

        assert_eq!(answer_text(&events), answer);
        assert!(matches!(events.last(), Some(StreamEvent::Done)));

        let citations = events.iter().find_map(|e| match e {
            StreamEvent::Citations(c) => Some(c),
            _ => None,
        });
        assert!(!citations.unwrap().is_empty());

        let sources = events.iter().find_map(|e| match e {
            StreamEvent::Sources(SourcesPayload::Flat(s)) => Some(s),
            _ => None,
        });
        assert!(!sources.unwrap().is_empty());

        // Both turn messages persisted in order
        let messages = fixture.sessions.recent_messages(&session.id, 10).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, answer);
    }

    #[tokio::test]
    async fn test_step_budget_bounds_loop_with_failing_tools() {
        // Planner keeps returning a plan that never generates
        let script = vec![PLAN_RETRIEVE_ONLY; EngineConfig::default().max_steps];
        let fixture = fixture(script, true);

        let session = fixture.sessions.create_session().unwrap();
        fixture.sessions.add_document(&session.id, "doc-a").unwrap();

        let events = collect_events(
            &fixture,
            TurnRequest::new(&session.id, "keep retrying forever"),
        )
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error(message) => {
                assert!(message.contains("exceeded maximum steps"))
            }
            other => panic!("expected step-budget error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_retrieval_yields_clean_no_context_answer() {
        let fixture = fixture(vec![PLAN_RETRIEVE_GENERATE], false);

        let session = fixture.sessions.create_session().unwrap();
        // Active document was never ingested, so retrieval finds nothing
        fixture.sessions.add_document(&session.id, "ghost-doc").unwrap();

        let events = collect_events(
            &fixture,
            TurnRequest::new(&session.id, "what does the document say?"),
        )
        .await;

        assert!(answer_text(&events).contains("could not find relevant context"));
        assert!(!events
            .iter()
            .any(|e| matches!(e, StreamEvent::Error(_))));
        assert!(matches!(events.last(), Some(StreamEvent::Done)));

        // Empty sources list is emitted, not omitted
        let sources = events.iter().find_map(|e| match e {
            StreamEvent::Sources(SourcesPayload::Flat(s)) => Some(s),
            _ => None,
        });
        assert!(sources.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comparison_lists_both_documents_when_one_is_empty() {
        let fixture = fixture(
            vec!["Document A discusses throughput while document B has no retrieved passages."],
            false,
        );
        ingest(
            &fixture,
            "doc-a",
            &["Throughput doubled after the caching change"],
        )
        .await;
        // doc-b is never ingested

        let session = fixture.sessions.create_session().unwrap();
        fixture.sessions.add_document(&session.id, "doc-a").unwrap();
        fixture.sessions.add_document(&session.id, "doc-b").unwrap();

        let events = collect_events(
            &fixture,
            TurnRequest::new(&session.id, "compare doc a and doc b"),
        )
        .await;

        let grouped = events.iter().find_map(|e| match e {
            StreamEvent::Sources(SourcesPayload::Grouped(g)) => Some(g),
            _ => None,
        });
        let grouped = grouped.expect("comparison emits grouped sources");
        assert_eq!(grouped.len(), 2);
        assert!(!grouped["doc-a"].is_empty());
        assert!(grouped["doc-b"].is_empty());
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_chat_turn_without_documents() {
        // Planner output is unusable, so the chat-only fallback plan runs
        let fixture = fixture(
            vec!["just answer directly", "Hello! Ask me about your documents."],
            false,
        );

        let session = fixture.sessions.create_session().unwrap();
        let events = collect_events(&fixture, TurnRequest::new(&session.id, "hi there")).await;

        assert!(answer_text(&events).starts_with("Hello!"));
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_tool_error_becomes_observation_not_failure() {
        // Retrieve fails, but the plan still reaches generate
        let fixture = fixture(vec![PLAN_RETRIEVE_GENERATE, "No evidence was available."], true);

        let session = fixture.sessions.create_session().unwrap();
        fixture.sessions.add_document(&session.id, "doc-a").unwrap();

        let events = collect_events(
            &fixture,
            TurnRequest::new(&session.id, "what happened in chapter one?"),
        )
        .await;

        // Failing retrieve never set retrieval_ran, so generation proceeds
        assert_eq!(answer_text(&events), "No evidence was available.");
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }
}

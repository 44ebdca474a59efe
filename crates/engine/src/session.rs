//! In-memory session store.
//!
//! Sessions hold the conversation state between turns: ordered messages,
//! the active document set, observation previews, and the rolling summary.
//! Everything is ephemeral; nothing survives process exit.
//!
//! The manager is shared behind an `Arc` and guards its map with a
//! `RwLock`. Within one turn only the orchestrating task mutates a
//! session; concurrent turns on the *same* session are not guarded
//! against interleaving.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tome_core::{AppError, AppResult};
use tome_llm::Role;
use uuid::Uuid;

/// One message in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A short record of a tool result, kept on the session for transparency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationPreview {
    pub tool: String,
    pub preview: String,
    pub timestamp: DateTime<Utc>,
}

/// Conversation state for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub active_documents: Vec<String>,
    pub observations: Vec<ObservationPreview>,
    pub summary: String,
}

/// Listing entry for a session, without the message payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Owner of all live sessions.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    /// Minimum assistant answer length before the rolling summary updates.
    min_summary_answer_len: usize,
}

impl SessionManager {
    pub fn new(min_summary_answer_len: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            min_summary_answer_len,
        }
    }

    fn read_map(&self) -> AppResult<std::sync::RwLockReadGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .read()
            .map_err(|_| AppError::Session("Session map poisoned".to_string()))
    }

    fn write_map(&self) -> AppResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .write()
            .map_err(|_| AppError::Session("Session map poisoned".to_string()))
    }

    /// Create a new empty session and return it.
    pub fn create_session(&self) -> AppResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            title: "New Chat".to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            active_documents: Vec::new(),
            observations: Vec::new(),
            summary: String::new(),
        };

        self.write_map()?.insert(session.id.clone(), session.clone());
        tracing::debug!("Created session {}", session.id);
        Ok(session)
    }

    /// Fetch a snapshot of a session. `None` when the id is unknown.
    pub fn get_session(&self, session_id: &str) -> AppResult<Option<Session>> {
        Ok(self.read_map()?.get(session_id).cloned())
    }

    /// List all sessions, most recently updated first.
    pub fn list_sessions(&self) -> AppResult<Vec<SessionSummary>> {
        let map = self.read_map()?;
        let mut summaries: Vec<SessionSummary> = map
            .values()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                title: s.title.clone(),
                updated_at: s.updated_at,
                message_count: s.messages.len(),
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Append a message to a session's history.
    ///
    /// Empty content is rejected; the history never contains blank entries.
    pub fn append_message(&self, session_id: &str, role: Role, content: &str) -> AppResult<()> {
        if content.trim().is_empty() {
            return Err(AppError::Session(
                "Refusing to append empty message".to_string(),
            ));
        }

        let mut map = self.write_map()?;
        let session = map
            .get_mut(session_id)
            .ok_or_else(|| AppError::Session(format!("Session not found: {}", session_id)))?;

        let now = Utc::now();
        session.messages.push(Message {
            role,
            content: content.to_string(),
            timestamp: now,
        });
        session.updated_at = now;

        // First user message becomes the session title
        if session.title == "New Chat" && role == Role::User {
            session.title = content.chars().take(60).collect();
        }

        Ok(())
    }

    /// The last `limit` messages, in chronological order.
    pub fn recent_messages(&self, session_id: &str, limit: usize) -> AppResult<Vec<Message>> {
        let map = self.read_map()?;
        let session = map
            .get(session_id)
            .ok_or_else(|| AppError::Session(format!("Session not found: {}", session_id)))?;

        let start = session.messages.len().saturating_sub(limit);
        Ok(session.messages[start..].to_vec())
    }

    /// Mark a document as active for a session. Duplicates are ignored.
    pub fn add_document(&self, session_id: &str, document_id: &str) -> AppResult<()> {
        let mut map = self.write_map()?;
        let session = map
            .get_mut(session_id)
            .ok_or_else(|| AppError::Session(format!("Session not found: {}", session_id)))?;

        if !session.active_documents.iter().any(|d| d == document_id) {
            session.active_documents.push(document_id.to_string());
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    pub fn active_documents(&self, session_id: &str) -> AppResult<Vec<String>> {
        let map = self.read_map()?;
        let session = map
            .get(session_id)
            .ok_or_else(|| AppError::Session(format!("Session not found: {}", session_id)))?;
        Ok(session.active_documents.clone())
    }

    /// Record a truncated preview of a tool result on the session.
    pub fn add_observation(&self, session_id: &str, tool: &str, preview: &str) -> AppResult<()> {
        let mut map = self.write_map()?;
        let session = map
            .get_mut(session_id)
            .ok_or_else(|| AppError::Session(format!("Session not found: {}", session_id)))?;

        session.observations.push(ObservationPreview {
            tool: tool.to_string(),
            preview: preview.chars().take(500).collect(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub fn observations(&self, session_id: &str) -> AppResult<Vec<ObservationPreview>> {
        let map = self.read_map()?;
        let session = map
            .get(session_id)
            .ok_or_else(|| AppError::Session(format!("Session not found: {}", session_id)))?;
        Ok(session.observations.clone())
    }

    pub fn summary(&self, session_id: &str) -> AppResult<String> {
        let map = self.read_map()?;
        let session = map
            .get(session_id)
            .ok_or_else(|| AppError::Session(format!("Session not found: {}", session_id)))?;
        Ok(session.summary.clone())
    }

    /// Fold a turn into the rolling summary when the answer is substantial.
    ///
    /// Short answers (acknowledgements, refusals) are not worth keeping;
    /// the summary keeps at most the six most recent lines.
    pub fn maybe_update_summary(
        &self,
        session_id: &str,
        user_query: &str,
        assistant_answer: &str,
    ) -> AppResult<bool> {
        if assistant_answer.trim().len() < self.min_summary_answer_len {
            return Ok(false);
        }

        let mut map = self.write_map()?;
        let session = map
            .get_mut(session_id)
            .ok_or_else(|| AppError::Session(format!("Session not found: {}", session_id)))?;

        let mut lines: Vec<String> = Vec::new();
        if !session.summary.is_empty() {
            lines.extend(session.summary.lines().map(|l| l.to_string()));
        }
        lines.push(format!("User intent: {}", user_query.trim()));
        let answer_head: String = assistant_answer.trim().chars().take(400).collect();
        lines.push(format!("Key answer: {}", answer_head));

        let start = lines.len().saturating_sub(6);
        session.summary = lines[start..].join("\n");
        Ok(true)
    }

    /// Drop a session and all its state.
    pub fn clear_session(&self, session_id: &str) -> AppResult<bool> {
        Ok(self.write_map()?.remove(session_id).is_some())
    }
}

//! Error types for Tome.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application, including configuration, I/O, LLM, retrieval, session,
//! and planning errors.

use thiserror::Error;

/// Unified error type for Tome.
///
/// All functions in the application return `Result<T, AppError>`.
/// We never panic — errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store and lexical index errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Session memory errors
    #[error("Session error: {0}")]
    Session(String),

    /// Plan parsing and prompt errors
    #[error("Plan error: {0}")]
    Plan(String),

    /// Tool execution errors (expected failure modes, recorded as observations)
    #[error("Tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

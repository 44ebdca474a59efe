//! Tome Core Library
//!
//! This crate provides the foundational utilities for Tome:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management (application + engine tunables)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, EngineConfig};
pub use error::{AppError, AppResult};

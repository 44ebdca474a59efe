//! Configuration management for Tome.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.tome/config.yaml)
//!
//! The configuration is workspace-centric: ingested document stores and the
//! config file live under `.tome/` in the workspace root. Every engine
//! tunable (retrieval weights, step budget, trim budgets, thresholds) lives
//! in [`EngineConfig`] with serde defaults, so deployments can adjust them
//! without code changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Main application configuration.
///
/// This struct holds all global configuration options that affect
/// behavior across commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .tome/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// LLM provider (e.g., "ollama")
    pub provider: String,

    /// Model identifier for generation
    pub model: String,

    /// Model identifier for embeddings
    pub embedding_model: String,

    /// Embedding provider ("trigram" for local deterministic, "ollama")
    pub embedding_provider: String,

    /// Provider endpoint override
    pub endpoint: Option<String>,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// External tool servers to discover at startup
    #[serde(default)]
    pub tool_servers: Vec<String>,

    /// Engine tunables
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Tunables for the retrieval and orchestration engine.
///
/// The blend weights, document caps, and step budget varied across
/// deployments; they are configuration, not constants. All fields default
/// to the values below when absent from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Semantic weight for factual queries (lexical weight is the complement)
    #[serde(default = "default_semantic_weight_factual")]
    pub semantic_weight_factual: f32,

    /// Semantic weight for conceptual queries
    #[serde(default = "default_semantic_weight_conceptual")]
    pub semantic_weight_conceptual: f32,

    /// Maximum number of documents contributing chunks in multi-document mode
    #[serde(default = "default_top_docs")]
    pub top_docs: usize,

    /// Maximum chunks per document in multi-document mode; also the N for
    /// the document-level top-N score aggregate
    #[serde(default = "default_max_chunks_per_doc")]
    pub max_chunks_per_doc: usize,

    /// Mean-score threshold below which the retriever suggests a rerank pass
    #[serde(default = "default_rerank_threshold")]
    pub rerank_threshold: f32,

    /// Diminishing-returns cutoff: stop trimming when the score drops more
    /// than this from the previously accepted chunk
    #[serde(default = "default_score_drop_delta")]
    pub score_drop_delta: f32,

    /// Character budget for trimmed evidence
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Character budget for the recent-message window
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Number of recent messages loaded per turn
    #[serde(default = "default_recent_message_limit")]
    pub recent_message_limit: usize,

    /// Maximum plan/act iterations per turn
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Retrieval depth (top-k) per store
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum assistant answer length for a rolling-summary update
    #[serde(default = "default_min_summary_answer_len")]
    pub min_summary_answer_len: usize,

    /// Upper bound on concurrent per-document retrieval tasks
    #[serde(default = "default_max_parallel_retrievals")]
    pub max_parallel_retrievals: usize,
}

fn default_semantic_weight_factual() -> f32 {
    0.8
}

fn default_semantic_weight_conceptual() -> f32 {
    0.4
}

fn default_top_docs() -> usize {
    3
}

fn default_max_chunks_per_doc() -> usize {
    2
}

fn default_rerank_threshold() -> f32 {
    0.75
}

fn default_score_drop_delta() -> f32 {
    0.4
}

fn default_max_context_chars() -> usize {
    6000
}

fn default_max_message_chars() -> usize {
    6000
}

fn default_recent_message_limit() -> usize {
    20
}

fn default_max_steps() -> usize {
    6
}

fn default_top_k() -> usize {
    5
}

fn default_min_summary_answer_len() -> usize {
    150
}

fn default_max_parallel_retrievals() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            semantic_weight_factual: default_semantic_weight_factual(),
            semantic_weight_conceptual: default_semantic_weight_conceptual(),
            top_docs: default_top_docs(),
            max_chunks_per_doc: default_max_chunks_per_doc(),
            rerank_threshold: default_rerank_threshold(),
            score_drop_delta: default_score_drop_delta(),
            max_context_chars: default_max_context_chars(),
            max_message_chars: default_max_message_chars(),
            recent_message_limit: default_recent_message_limit(),
            max_steps: default_max_steps(),
            top_k: default_top_k(),
            min_summary_answer_len: default_min_summary_answer_len(),
            max_parallel_retrievals: default_max_parallel_retrievals(),
        }
    }
}

impl EngineConfig {
    /// Lexical weight paired with the factual semantic weight.
    ///
    /// Weights always sum to 1.
    pub fn lexical_weight_factual(&self) -> f32 {
        1.0 - self.semantic_weight_factual
    }

    /// Lexical weight paired with the conceptual semantic weight.
    pub fn lexical_weight_conceptual(&self) -> f32 {
        1.0 - self.semantic_weight_conceptual
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    llm: Option<LlmFileConfig>,
    engine: Option<EngineConfig>,
    #[serde(default)]
    tool_servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmFileConfig {
    provider: Option<String>,
    model: Option<String>,
    #[serde(rename = "embeddingModel")]
    embedding_model: Option<String>,
    #[serde(rename = "embeddingProvider")]
    embedding_provider: Option<String>,
    endpoint: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_provider: "trigram".to_string(),
            endpoint: None,
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            tool_servers: Vec::new(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `TOME_WORKSPACE`: Override workspace path
    /// - `TOME_CONFIG`: Path to config file
    /// - `TOME_PROVIDER`: LLM provider
    /// - `TOME_MODEL`: Model identifier
    /// - `TOME_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("TOME_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("TOME_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        // Load from YAML config file if it exists
        let config_path = if let Some(ref cf) = config.config_file {
            cf.clone()
        } else {
            config.workspace.join(".tome/config.yaml")
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("TOME_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("TOME_MODEL") {
            config.model = model;
        }

        if let Ok(key) = std::env::var("TOME_API_KEY") {
            config.api_key = Some(key);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &PathBuf) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if let Some(embedding_model) = llm.embedding_model {
                result.embedding_model = embedding_model;
            }
            if let Some(embedding_provider) = llm.embedding_provider {
                result.embedding_provider = embedding_provider;
            }
            if llm.endpoint.is_some() {
                result.endpoint = llm.endpoint;
            }
        }

        if let Some(engine) = config_file.engine {
            result.engine = engine;
        }

        if !config_file.tool_servers.is_empty() {
            result.tool_servers = config_file.tool_servers;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and config files.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .tome directory.
    pub fn tome_dir(&self) -> PathBuf {
        self.workspace.join(".tome")
    }

    /// Get the base directory holding per-document stores.
    pub fn stores_dir(&self) -> PathBuf {
        self.tome_dir().join("stores")
    }

    /// Ensure the .tome directory exists.
    pub fn ensure_tome_dir(&self) -> AppResult<()> {
        let tome_dir = self.tome_dir();
        if !tome_dir.exists() {
            std::fs::create_dir_all(&tome_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .tome directory: {}", e))
            })?;
        }
        Ok(())
    }
}

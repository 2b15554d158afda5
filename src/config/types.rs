//! Configuration types for ClawCore
//!
//! Serde-backed configuration structs with defaults matching the documented
//! behavior of the agent loop and compression engine. All fields are optional
//! in config files; missing values fall back to defaults.

use serde::{Deserialize, Serialize};

/// Top-level ClawCore configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent loop settings
    pub agent: AgentConfig,
    /// Context compression settings
    pub compression: CompressionConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Agent loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Default model identifier sent to the provider
    pub model: String,
    /// Maximum number of model turns before the loop fails.
    /// Tool-only rounds do not count against this budget.
    pub max_turns: u32,
    /// Maximum tokens the model may generate per completion
    pub max_tokens: u32,
    /// Context window of the model in tokens. 0 means unknown, which
    /// disables overflow detection.
    pub context_window: u32,
    /// Base delay in milliseconds for exponential retry backoff
    pub backoff_base_ms: u64,
    /// Maximum delay cap in milliseconds for retry backoff
    pub backoff_max_ms: u64,
    /// Maximum stream attempts (first try + retries) before `ApiError`
    pub max_attempts: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claw-3-sonnet".to_string(),
            max_turns: 50,
            max_tokens: 8192,
            context_window: 200_000,
            backoff_base_ms: 1000,
            backoff_max_ms: 60_000,
            max_attempts: 10,
        }
    }
}

/// Context compression configuration.
///
/// Thresholds for the two-stage compression pipeline: pruning stale tool
/// results first, then compacting the whole history into a summary.
/// Immutable for the duration of a loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Whether automatic compression is enabled at all
    pub auto_compact: bool,
    /// Fraction (0.0-1.0) of the context window that triggers compression
    pub trigger_ratio: f64,
    /// Tokens reserved for model output when computing the usable window
    pub reserved_output_tokens: u32,
    /// Number of most-recent turns whose tool results are never pruned
    pub protected_turns: usize,
    /// Running token total beyond which older tool results become prunable
    pub protect_tokens: usize,
    /// Minimum total tokens a prune pass must reclaim to commit
    pub min_prune_tokens: usize,
    /// Tool names whose results are never pruned
    pub protected_tools: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            auto_compact: true,
            trigger_ratio: 0.7,
            reserved_output_tokens: 16_384,
            protected_turns: 2,
            protect_tokens: 40_000,
            min_prune_tokens: 20_000,
            protected_tools: Vec::new(),
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Default tracing pretty-print (human-readable)
    Pretty,
    /// Compact text with a `component` field for per-subsystem filtering
    Component,
    /// Structured JSON lines for log aggregators
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log output format
    pub format: LogFormat,
    /// Optional log file path; stderr when absent
    pub file: Option<String>,
    /// Log level filter (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            file: None,
            level: "info".to_string(),
        }
    }
}

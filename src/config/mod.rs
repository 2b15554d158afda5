//! Configuration management for ClawCore
//!
//! This module provides configuration loading, saving, and global state
//! management. Configuration is loaded from `~/.clawcore/config.json` with
//! environment variable overrides.

mod types;

pub use types::*;

use crate::error::{CoreError, Result};
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::RwLock;

/// Global configuration instance
static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

impl Config {
    /// Returns the ClawCore configuration directory path (~/.clawcore)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".clawcore")
    }

    /// Returns the path to the config file (~/.clawcore/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `CLAWCORE_SECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: CLAWCORE_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CLAWCORE_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Ok(val) = std::env::var("CLAWCORE_AGENT_MAX_TURNS") {
            if let Ok(v) = val.parse() {
                self.agent.max_turns = v;
            }
        }
        if let Ok(val) = std::env::var("CLAWCORE_AGENT_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                self.agent.max_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("CLAWCORE_AGENT_CONTEXT_WINDOW") {
            if let Ok(v) = val.parse() {
                self.agent.context_window = v;
            }
        }
        if let Ok(val) = std::env::var("CLAWCORE_COMPRESSION_AUTO_COMPACT") {
            if let Ok(v) = val.parse() {
                self.compression.auto_compact = v;
            }
        }
        if let Ok(val) = std::env::var("CLAWCORE_COMPRESSION_TRIGGER_RATIO") {
            if let Ok(v) = val.parse() {
                self.compression.trigger_ratio = v;
            }
        }
        if let Ok(val) = std::env::var("CLAWCORE_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `CoreError::Config` when a value is outside its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_turns == 0 {
            return Err(CoreError::Config("agent.max_turns must be > 0".into()));
        }
        if self.agent.max_attempts == 0 {
            return Err(CoreError::Config("agent.max_attempts must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.compression.trigger_ratio) {
            return Err(CoreError::Config(
                "compression.trigger_ratio must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }

    /// Save configuration to the default path as pretty-printed JSON.
    pub fn save(&self) -> Result<()> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the global configuration, initializing it from disk on first access.
    pub fn global() -> &'static RwLock<Config> {
        CONFIG.get_or_init(|| RwLock::new(Config::load().unwrap_or_default()))
    }
}

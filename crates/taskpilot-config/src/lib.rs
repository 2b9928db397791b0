//! # Taskpilot Config
//!
//! YAML-loaded configuration for the agent: LLM endpoint, search
//! limits, capability flags and the skill runner's settings. Loaded
//! once at startup; the LLM base URL and API key reach the core only
//! through this module.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub skills: SkillsConfig,
    pub capabilities: CapabilityConfig,
}

/// LLM endpoint settings (OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Search provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub tavily_api_key: String,
    /// Result count for the initial search.
    pub default_limit: usize,
    /// Result cap when the user asks for more results.
    pub more_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: String::new(),
            default_limit: 5,
            more_limit: 50,
        }
    }
}

/// Skill runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    pub dir: PathBuf,
    pub auto_approve_tools: bool,
    /// Tool-call loop bound per skill execution.
    pub max_tool_rounds: usize,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("skills"),
            auto_approve_tools: false,
            max_tool_rounds: 10,
        }
    }
}

/// Advertised post-processing capabilities.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub ppt: bool,
    pub podcast: bool,
}

/// Load configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<PilotConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: PilotConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &PilotConfig) -> Result<(), ConfigError> {
    if config.llm.model.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "llm.model must not be empty".to_string(),
        ));
    }
    if config.llm.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "llm.api_base must not be empty".to_string(),
        ));
    }
    if config.search.more_limit == 0 {
        return Err(ConfigError::Invalid(
            "search.more_limit must be > 0".to_string(),
        ));
    }
    if config.skills.max_tool_rounds == 0 {
        return Err(ConfigError::Invalid(
            "skills.max_tool_rounds must be > 0".to_string(),
        ));
    }
    Ok(())
}

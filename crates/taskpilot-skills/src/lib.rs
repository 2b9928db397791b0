//! # Taskpilot Skills
//!
//! The alternative entry mode: discover declarative skill packages,
//! let the LLM pick one, and run its body with tool calling.

mod discovery;
mod package;
mod runner;

use std::path::PathBuf;

use thiserror::Error;

use taskpilot_core::InteractionError;
use taskpilot_llm::LlmError;

pub use discovery::discover_skills;
pub use package::{parse_skill_file, SkillMeta, SkillPackage, SkillResources};
pub use runner::{SkillRunner, SkillRunnerConfig};

/// Skill errors.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("skill parse error: {0}")]
    Parse(String),
    #[error("missing frontmatter field: {0}")]
    MissingField(String),
    #[error("duplicate skill name: {0}")]
    DuplicateName(String),
    #[error("no valid skills found in {}", .0.display())]
    NoSkills(PathBuf),
    #[error("LLM selected a non-existent skill '{0}'")]
    UnknownSkill(String),
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("interaction error: {0}")]
    Interaction(#[from] InteractionError),
    #[error("exceeded maximum tool call iterations")]
    ToolLoopExceeded,
    #[error("skill execution cancelled")]
    Cancelled,
}

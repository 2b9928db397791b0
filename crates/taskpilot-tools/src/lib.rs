//! # Taskpilot Tools
//!
//! The tool registry and executor: named tools with JSON argument
//! contracts, dispatched on behalf of the LLM. Built-ins cover shell
//! and python execution, file I/O, web search and fetch; skill
//! packages contribute dynamic script tools on top.

mod exec;
mod files;
mod registry;
mod script;
mod search;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use taskpilot_llm::ToolDefinition;

pub use exec::{
    resolve_python, PythonCodeTool, PythonScriptTool, ShellCodeTool, ShellScriptTool,
};
pub use files::{ReadFileTool, WriteFileTool};
pub use registry::ToolRegistry;
pub use script::SkillScriptTool;
pub use search::{
    DuckDuckGoSearch, DuckDuckGoSearchTool, SearchProvider, TavilySearch, WebFetchTool,
    WikipediaSearch, WikipediaSearchTool,
};

/// Tool errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to decode {tool} arguments: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("{0}")]
    Execution(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(String),
    #[error("failed to find python3 or python in PATH")]
    MissingInterpreter,
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// A named side-effecting function the LLM may invoke.
///
/// Tools are black boxes to the registry: they decode their own
/// arguments and report failures as errors, which callers feed back to
/// the LLM as tool-role content rather than aborting.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must be unique within a registry).
    fn name(&self) -> &str;

    /// Description advertised to the LLM.
    fn description(&self) -> &str;

    /// JSON schema for the argument object.
    fn parameters(&self) -> Value;

    /// Invoke with the raw JSON argument string the model produced.
    async fn invoke(&self, arguments: &str) -> Result<String, ToolError>;

    /// Definition advertised in chat-completion requests.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters())
    }
}

/// Decode a tool's typed argument struct from the model-produced JSON.
/// An empty argument string decodes as an empty object.
pub(crate) fn decode_args<T: DeserializeOwned>(
    tool: &str,
    arguments: &str,
) -> Result<T, ToolError> {
    let raw = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

//! Tool registry - named dispatch for LLM tool calls.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use taskpilot_llm::{ToolCall, ToolDefinition};

use crate::{Tool, ToolError};

/// Holds the tools advertised to the LLM and dispatches calls to them.
///
/// Shared read-only across sessions; registration happens before the
/// registry is handed out.
#[derive(Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions in registration order, for LLM advertisement.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Dispatch one LLM tool call to the matching tool.
    pub async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self
            .get(&call.function.name)
            .ok_or_else(|| ToolError::UnknownTool(call.function.name.clone()))?;
        debug!(
            tool = %call.function.name,
            call_id = %call.id,
            "dispatching tool call"
        );
        tool.invoke(&call.function.arguments).await
    }
}

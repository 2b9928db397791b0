//! # Taskpilot LLM
//!
//! Chat-completion client abstraction for an OpenAI-compatible endpoint
//! with tool-calling support. Planner, subagents and the skill runner
//! all speak to the model through [`LlmClient`].

mod client;
mod message;

pub use client::{HttpLlmClient, HttpLlmClientConfig, LlmClient, LlmError, ScriptedLlmClient};
pub use message::{
    ChatMessage, ChatRequest, FunctionCall, FunctionDefinition, ToolCall, ToolDefinition,
};

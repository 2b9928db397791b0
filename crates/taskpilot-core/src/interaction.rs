//! Interaction handler - the human-in-the-loop capability interface.
//!
//! Subagents and the orchestrator ask the human (or its proxy) a
//! question only through this trait. Implementations are injected as
//! `Arc<dyn InteractionHandler>` at construction time; they never hold
//! a back-pointer to the session that owns them.

use async_trait::async_trait;

use crate::types::Plan;

/// Outcome of a plan review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    /// Empty reply: execute the plan unchanged.
    Approved,
    /// Non-empty reply: re-plan with this modification instruction.
    Modify(String),
}

/// Interaction errors.
#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("interaction cancelled")]
    Cancelled,
    #[error("interaction channel closed: {0}")]
    ChannelClosed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability interface for log streaming and human review gates.
///
/// `review_plan` may block indefinitely; every method must respect the
/// session's cancellation token internally.
#[async_trait]
pub trait InteractionHandler: Send + Sync {
    /// Push a progress line to the user.
    async fn log(&self, line: &str);

    /// Present a plan for approval or modification.
    async fn review_plan(&self, plan: &Plan) -> Result<PlanDecision, InteractionError>;

    /// Ask whether the user wants more search results.
    async fn review_search_results(&self, results: &str) -> Result<bool, InteractionError>;

    /// Ask whether a tool invocation may proceed.
    async fn approve_tool(&self, name: &str, arguments: &str) -> Result<bool, InteractionError>;
}

//! Subagent - the single-task-type worker contract.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::types::{Task, TaskResult, TaskType};

/// A worker that executes exactly one task type.
///
/// Subagents are stateless beyond their configured LLM client, model
/// and interaction handler, and must be safe to share across sessions.
/// Failures are reported through `TaskResult.success`, never panics.
#[async_trait]
pub trait Subagent: Send + Sync {
    /// The task type this subagent handles.
    fn task_type(&self) -> TaskType;

    /// Execute the task, observing `cancel` at every suspension point.
    async fn execute(&self, cancel: &CancellationToken, task: &Task) -> TaskResult;
}

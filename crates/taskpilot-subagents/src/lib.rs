//! # Taskpilot Subagents
//!
//! One worker per task type. Each subagent composes its prompt shape,
//! calls the LLM and/or the search back-ends, and returns exactly one
//! [`TaskResult`]; failures are carried in the result, never panicked.

mod analyze;
mod render;
mod report;
mod search;

pub use analyze::AnalyzeSubagent;
pub use render::RenderSubagent;
pub use report::ReportSubagent;
pub use search::SearchSubagent;

use std::future::Future;

use taskpilot_core::CancellationToken;

/// Await a future unless the session is cancelled first.
pub(crate) async fn or_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        value = fut => Some(value),
    }
}

pub(crate) const CANCELLED_MESSAGE: &str = "task cancelled";

/// Join prior-task outputs for a context-bearing prompt.
pub(crate) fn join_context(context: &[String]) -> String {
    context.join("\n\n")
}

/// Append the session's global context to a system prompt.
pub(crate) fn with_global_context(system: &str, global_context: Option<&str>) -> String {
    match global_context.filter(|c| !c.trim().is_empty()) {
        Some(context) => format!("{}\n\n来自用户的重要上下文/指令：\n{}", system, context),
        None => system.to_string(),
    }
}

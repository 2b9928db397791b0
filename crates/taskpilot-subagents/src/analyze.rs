//! Analyze subagent: synthesizes prior outputs with the LLM.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use taskpilot_core::{
    CancellationToken, InteractionHandler, Subagent, Task, TaskResult, TaskType,
};
use taskpilot_llm::{ChatRequest, LlmClient};

use crate::{join_context, or_cancelled, with_global_context, CANCELLED_MESSAGE};

const SYSTEM_PROMPT: &str = "你是一个分析助手，负责综合和分析信息。请提供清晰、结构化的分析。";
const TEMPERATURE: f32 = 0.3;

/// Analyzes and synthesizes information for ANALYZE tasks.
pub struct AnalyzeSubagent {
    client: Arc<dyn LlmClient>,
    model: Option<String>,
    handler: Option<Arc<dyn InteractionHandler>>,
}

impl AnalyzeSubagent {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: Option<String>,
        handler: Option<Arc<dyn InteractionHandler>>,
    ) -> Self {
        Self {
            client,
            model,
            handler,
        }
    }

    fn build_prompt(&self, task: &Task) -> String {
        let context = &task.parameters.context;
        if context.is_empty() {
            task.description.clone()
        } else {
            format!(
                "分析以下信息并 {}:\n\n{}",
                task.description,
                join_context(context)
            )
        }
    }
}

#[async_trait]
impl Subagent for AnalyzeSubagent {
    fn task_type(&self) -> TaskType {
        TaskType::Analyze
    }

    async fn execute(&self, cancel: &CancellationToken, task: &Task) -> TaskResult {
        if let Some(handler) = &self.handler {
            handler
                .log(&format!("> 分析子Agent: {}", task.description))
                .await;
        }

        let prompt = self.build_prompt(task);
        let system =
            with_global_context(SYSTEM_PROMPT, task.parameters.global_context.as_deref());

        let mut request = ChatRequest::prompt(system, prompt).with_temperature(TEMPERATURE);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        let analysis = match or_cancelled(cancel, self.client.chat(request)).await {
            None => return TaskResult::failed(TaskType::Analyze, CANCELLED_MESSAGE),
            Some(Ok(message)) => message.content_or_empty().to_string(),
            Some(Err(e)) => return TaskResult::failed(TaskType::Analyze, e.to_string()),
        };

        info!(bytes = analysis.len(), "analysis completed");
        if let Some(handler) = &self.handler {
            handler
                .log(&format!("✓ 分析完成 ({} 字节)", analysis.len()))
                .await;
        }

        TaskResult::ok(TaskType::Analyze, analysis)
    }
}

//! Report subagent: writes the final Markdown report.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use taskpilot_core::{
    CancellationToken, InteractionHandler, Subagent, Task, TaskResult, TaskType,
};
use taskpilot_llm::{ChatRequest, LlmClient};

use crate::{join_context, or_cancelled, with_global_context, CANCELLED_MESSAGE};

const SYSTEM_PROMPT: &str = "你是一个报告写作助手，负责创建格式良好、清晰且全面的 Markdown 格式报告。\
使用适当的标题、列表和格式使报告易于阅读。如果提供的信息包含带有 URL 和描述的图片，\
请选择最相关的图片，并使用标准 Markdown 图片语法 `![描述](URL)` 将其嵌入报告中。\
将图片放置在相关文本部分附近。";
const TEMPERATURE: f32 = 0.5;

/// Generates formatted Markdown reports for REPORT tasks.
pub struct ReportSubagent {
    client: Arc<dyn LlmClient>,
    model: Option<String>,
    handler: Option<Arc<dyn InteractionHandler>>,
}

impl ReportSubagent {
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
                "基于以下信息，{}:\n\n{}",
                task.description,
                join_context(context)
            )
        }
    }
}

#[async_trait]
impl Subagent for ReportSubagent {
    fn task_type(&self) -> TaskType {
        TaskType::Report
    }

    async fn execute(&self, cancel: &CancellationToken, task: &Task) -> TaskResult {
        if let Some(handler) = &self.handler {
            handler
                .log(&format!("> 报告子Agent: {}", task.description))
                .await;
        }

        let prompt = self.build_prompt(task);
        let system =
            with_global_context(SYSTEM_PROMPT, task.parameters.global_context.as_deref());

        let mut request = ChatRequest::prompt(system, prompt).with_temperature(TEMPERATURE);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        let report = match or_cancelled(cancel, self.client.chat(request)).await {
            None => return TaskResult::failed(TaskType::Report, CANCELLED_MESSAGE),
            Some(Ok(message)) => message.content_or_empty().to_string(),
            Some(Err(e)) => return TaskResult::failed(TaskType::Report, e.to_string()),
        };

        info!(bytes = report.len(), "report generated");
        if let Some(handler) = &self.handler {
            handler
                .log(&format!("✓ 报告已生成 ({} 字节)", report.len()))
                .await;
        }

        TaskResult::ok(TaskType::Report, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpilot_llm::ScriptedLlmClient;

    #[test]
    fn test_context_prompt_shape() {
        let agent = ReportSubagent::new(
            Arc::new(ScriptedLlmClient::from_texts(vec![])),
            None,
            None,
        );
        let mut task = Task::new(TaskType::Report, "写一份历史综述");
        task.parameters.context = vec!["Output from SEARCH task:\nfindings".to_string()];
        let prompt = agent.build_prompt(&task);
        assert!(prompt.starts_with("基于以下信息，写一份历史综述:\n\n"));
        assert!(prompt.ends_with("findings"));
    }

    #[test]
    fn test_report_success_and_failure() {
        tokio_test::block_on(async {
            let ok_agent = ReportSubagent::new(
                Arc::new(ScriptedLlmClient::from_texts(vec!["# Report\n\nbody"])),
                None,
                None,
            );
            let task = Task::new(TaskType::Report, "write it");
            let result = ok_agent.execute(&CancellationToken::new(), &task).await;
            assert!(result.success);
            assert!(result.output.starts_with("# Report"));

            let err_agent = ReportSubagent::new(
                Arc::new(ScriptedLlmClient::from_texts(vec![])),
                None,
                None,
            );
            let result = err_agent.execute(&CancellationToken::new(), &task).await;
            assert!(!result.success);
        });
    }
}

//! Render subagent: turns the final report into a terminal rendering
//! or a complete HTML page.

use std::sync::Arc;

use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};
use tracing::info;

use taskpilot_core::{
    CancellationToken, InteractionHandler, Subagent, Task, TaskResult, TaskType,
};

const TERMINAL_WIDTH: usize = 80;
const TERMINAL_INDENT: usize = 6;
const REPORT_HEADER: &str = "Output from REPORT task:";

/// Renders markdown content for RENDER tasks.
pub struct RenderSubagent {
    render_html: bool,
    handler: Option<Arc<dyn InteractionHandler>>,
}

impl RenderSubagent {
    pub fn new(render_html: bool, handler: Option<Arc<dyn InteractionHandler>>) -> Self {
        Self {
            render_html,
            handler,
        }
    }

    /// Resolution order: explicit content parameter, then the most
    /// recent REPORT output in context, then the last context entry,
    /// then the task description.
    fn resolve_content(task: &Task) -> String {
        if let Some(content) = &task.parameters.content {
            return content.clone();
        }

        let context = &task.parameters.context;
        if context.is_empty() {
            return task.description.clone();
        }

        for entry in context.iter().rev() {
            if entry.contains(REPORT_HEADER) {
                let content = match entry.find('\n') {
                    Some(idx) => &entry[idx + 1..],
                    None => entry.as_str(),
                };
                return content.trim().to_string();
            }
        }

        // No REPORT output found: take the last entry, stripping any
        // "Output from …" header line.
        let last = &context[context.len() - 1];
        let mut content = last.as_str();
        if let Some(idx) = content.find("Output from ") {
            if let Some(newline) = content[idx..].find('\n') {
                content = &content[idx + newline + 1..];
            }
        }
        content.trim().to_string()
    }

    fn render_terminal(content: &str) -> String {
        let skin = termimad::MadSkin::default();
        let text = skin.text(content, Some(TERMINAL_WIDTH - TERMINAL_INDENT));
        let indent = " ".repeat(TERMINAL_INDENT);
        text.to_string()
            .lines()
            .map(|line| format!("{}{}", indent, line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_html_page(content: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        let parser = Parser::new_ext(content, options);
        let mut body = String::new();
        html::push_html(&mut body, parser);
        let body = body.replace("<a href=", r#"<a target="_blank" href="#);
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Agent Report</title>\n</head>\n<body>\n{}</body>\n</html>\n",
            body
        )
    }
}

#[async_trait]
impl Subagent for RenderSubagent {
    fn task_type(&self) -> TaskType {
        TaskType::Render
    }

    async fn execute(&self, cancel: &CancellationToken, task: &Task) -> TaskResult {
        if let Some(handler) = &self.handler {
            handler
                .log(&format!("> 渲染子Agent: {}", task.description))
                .await;
        }
        if cancel.is_cancelled() {
            return TaskResult::failed(TaskType::Render, crate::CANCELLED_MESSAGE);
        }

        let content = Self::resolve_content(task);
        info!(bytes = content.len(), html = self.render_html, "rendering content");
        if let Some(handler) = &self.handler {
            handler
                .log(&format!("正在渲染 {} 字节的内容", content.len()))
                .await;
        }

        let output = if self.render_html {
            Self::render_html_page(&content)
        } else {
            Self::render_terminal(&content)
        };

        TaskResult::ok(TaskType::Render, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_task(context: Vec<&str>) -> Task {
        let mut task = Task::new(TaskType::Render, "渲染报告");
        task.parameters.context = context.into_iter().map(String::from).collect();
        task
    }

    #[test]
    fn test_content_parameter_wins() {
        let mut task = render_task(vec!["Output from REPORT task:\nignored"]);
        task.parameters.content = Some("explicit".to_string());
        assert_eq!(RenderSubagent::resolve_content(&task), "explicit");
    }

    #[test]
    fn test_most_recent_report_output_selected() {
        let task = render_task(vec![
            "Output from REPORT task:\nfirst report",
            "Output from ANALYZE task:\nnotes",
            "Output from REPORT task:\nsecond report",
        ]);
        assert_eq!(RenderSubagent::resolve_content(&task), "second report");
    }

    #[test]
    fn test_last_entry_header_stripped_when_no_report() {
        let task = render_task(vec![
            "Output from SEARCH task:\nresults",
            "Output from ANALYZE task:\nthe analysis",
        ]);
        assert_eq!(RenderSubagent::resolve_content(&task), "the analysis");
    }

    #[test]
    fn test_description_fallback_without_context() {
        let task = render_task(vec![]);
        assert_eq!(RenderSubagent::resolve_content(&task), "渲染报告");
    }

    #[test]
    fn test_html_page_has_target_blank_links() {
        let html = RenderSubagent::render_html_page("[site](https://example.com)");
        assert!(html.contains("<!DOCTYPE html>"));
        assert!(html.contains("<title>Agent Report</title>"));
        assert!(html.contains(r#"<a target="_blank" href="https://example.com""#));
    }

    #[test]
    fn test_report_content_survives_rendering() {
        // Round-trip property: a report fed through Render keeps its
        // textual content, modulo formatting.
        tokio_test::block_on(async {
            let report = "# Olympic History\n\nThe modern games began in 1896.";
            let entry = format!("Output from REPORT task:\n{}", report);
            let task = render_task(vec![entry.as_str()]);
            let agent = RenderSubagent::new(true, None);
            let result = agent.execute(&CancellationToken::new(), &task).await;
            assert!(result.success);
            assert!(result.output.contains("Olympic History"));
            assert!(result.output.contains("The modern games began in 1896."));
        });
    }

    #[test]
    fn test_terminal_rendering_is_indented() {
        let output = RenderSubagent::render_terminal("plain line");
        for line in output.lines() {
            assert!(line.starts_with("      "));
        }
    }
}

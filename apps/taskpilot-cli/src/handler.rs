//! Terminal interaction handler: prompts on stdin, prints to stdout.

use std::io::Write;

use async_trait::async_trait;

use taskpilot_core::{InteractionError, InteractionHandler, Plan, PlanDecision};

const RESULTS_PREVIEW_CHARS: usize = 500;

pub struct TerminalInteractionHandler;

async fn read_line() -> Result<String, InteractionError> {
    let line = tokio::task::spawn_blocking(|| {
        let mut buffer = String::new();
        std::io::stdin().read_line(&mut buffer)?;
        Ok::<_, std::io::Error>(buffer)
    })
    .await
    .map_err(|e| InteractionError::ChannelClosed(e.to_string()))??;
    Ok(line.trim().to_string())
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

fn preview(text: &str) -> String {
    if text.chars().count() <= RESULTS_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(RESULTS_PREVIEW_CHARS).collect();
    format!("{}...", cut)
}

#[async_trait]
impl InteractionHandler for TerminalInteractionHandler {
    async fn log(&self, line: &str) {
        println!("{}", line);
    }

    async fn review_plan(&self, plan: &Plan) -> Result<PlanDecision, InteractionError> {
        println!("\n📋 计划: {}", plan.description);
        for (i, task) in plan.tasks.iter().enumerate() {
            println!("  {}. [{}] {}", i + 1, task.task_type, task.description);
        }
        prompt("按回车批准计划，或输入修改意见: ");
        let reply = read_line().await?;
        if reply.is_empty() {
            Ok(PlanDecision::Approved)
        } else {
            Ok(PlanDecision::Modify(reply))
        }
    }

    async fn review_search_results(&self, results: &str) -> Result<bool, InteractionError> {
        println!("\n🔎 搜索结果预览:\n{}", preview(results));
        prompt("是否获取更多搜索结果? [y/N]: ");
        let reply = read_line().await?;
        Ok(reply.eq_ignore_ascii_case("y"))
    }

    async fn approve_tool(&self, name: &str, arguments: &str) -> Result<bool, InteractionError> {
        println!("⚙️ Calling tool: {} with args: {}", name, arguments);
        prompt("⚠️  Allow this tool execution? [y/N]: ");
        let reply = read_line().await?;
        if reply.eq_ignore_ascii_case("y") {
            Ok(true)
        } else {
            println!("❌ Tool execution denied by user.");
            Ok(false)
        }
    }
}

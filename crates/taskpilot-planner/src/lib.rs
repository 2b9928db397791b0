//! # Taskpilot Planner
//!
//! Turns a natural-language request into a validated [`Plan`] of typed
//! tasks. The LLM is asked for strict JSON; malformed output earns one
//! corrective retry before the request fails.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use taskpilot_core::{Plan, PlanValidationError, Task, TaskParameters, TaskType};
use taskpilot_llm::{ChatRequest, LlmClient, LlmError};

const MAX_PROMPT_LOG_CHARS: usize = 4_000;

/// Planner errors.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("malformed plan: {0}")]
    Malformed(String),
    #[error("invalid plan: {0}")]
    Invalid(#[from] PlanValidationError),
}

/// Planner trait - the orchestrator depends on this seam only.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &str, global_context: Option<&str>) -> Result<Plan, PlanError>;
}

/// Planner config.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub model: Option<String>,
    pub temperature: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
        }
    }
}

/// LLM-backed planner.
pub struct TaskPlanner<C: LlmClient> {
    client: C,
    config: PlannerConfig,
}

const PLANNER_SYSTEM_PROMPT: &str = "\
You are the planning component of a task-orchestration agent. Decompose \
the user's request into an ordered list of typed tasks. The available \
task types are:
- SEARCH: gather information from the web. Set parameters.query.
- ANALYZE: analyze and synthesize previously gathered information.
- REPORT: write a well-structured Markdown report from prior outputs.
- RENDER: render the final report for presentation. Place it last.

Rules:
1) Return ONLY one valid JSON object, no prose and no code fences.
2) Shape: {\"description\":\"...\",\"tasks\":[{\"type\":\"SEARCH\",\"description\":\"...\",\"parameters\":{}}]}
3) Each task's type must be one of SEARCH, ANALYZE, REPORT, RENDER.
4) parameters must be a JSON object; it may be empty.
5) Order tasks so that every task can build on the outputs before it.
6) A RENDER task, if present, must come after the REPORT it renders.";

impl<C: LlmClient> TaskPlanner<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(client: C, config: PlannerConfig) -> Self {
        Self { client, config }
    }

    fn build_user_prompt(&self, request: &str, global_context: Option<&str>) -> String {
        let mut user = format!("User request:\n{}\n", request);
        if let Some(context) = global_context.filter(|c| !c.trim().is_empty()) {
            user.push_str(&format!("\nAdditional user guidance:\n{}\n", context));
        }
        user.push_str("\nReturn the plan JSON now.");
        user
    }

    async fn request_plan(&self, system: &str, user: &str) -> Result<Plan, PlanError> {
        let mut request =
            ChatRequest::prompt(system, user).with_temperature(self.config.temperature);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }
        let output = self.client.chat(request).await?;
        let raw = output.content_or_empty();
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                llm_output = %truncate_for_log(raw, MAX_PROMPT_LOG_CHARS),
                "planner raw llm output"
            );
        }
        parse_plan(raw)
    }
}

#[async_trait]
impl<C: LlmClient> Planner for TaskPlanner<C> {
    async fn plan(&self, request: &str, global_context: Option<&str>) -> Result<Plan, PlanError> {
        let user = self.build_user_prompt(request, global_context);
        info!(request_len = request.len(), "planner request prepared");

        let first = self.request_plan(PLANNER_SYSTEM_PROMPT, &user).await;
        let plan = match first {
            Ok(plan) => plan,
            Err(PlanError::Llm(e)) => return Err(PlanError::Llm(e)),
            Err(e) => {
                warn!(error = %e, "plan output malformed, retrying once");
                let corrective = format!(
                    "{}\n\nYour previous output could not be used: {}. \
                     Return ONLY the corrected JSON object.",
                    user, e
                );
                self.request_plan(PLANNER_SYSTEM_PROMPT, &corrective)
                    .await?
            }
        };
        info!(
            task_count = plan.tasks.len(),
            goal = %truncate_for_log(&plan.description, MAX_PROMPT_LOG_CHARS),
            "planner produced plan"
        );
        Ok(plan)
    }
}

#[derive(Debug, Deserialize)]
struct PlanJson {
    #[serde(default)]
    description: String,
    tasks: Vec<TaskJson>,
}

#[derive(Debug, Deserialize)]
struct TaskJson {
    #[serde(rename = "type")]
    task_type: TaskType,
    description: String,
    #[serde(default)]
    parameters: TaskParameters,
}

fn parse_plan(raw: &str) -> Result<Plan, PlanError> {
    let json_str = extract_json(raw)
        .ok_or_else(|| PlanError::Malformed("LLM output did not contain JSON".to_string()))?;
    let parsed: PlanJson = serde_json::from_str(&json_str)
        .map_err(|e| PlanError::Malformed(format!("invalid plan JSON: {}", e)))?;

    let tasks = parsed
        .tasks
        .into_iter()
        .map(|t| Task {
            index: 0,
            task_type: t.task_type,
            description: t.description,
            parameters: t.parameters,
        })
        .collect();
    let mut plan = Plan::new(parsed.description, tasks);
    plan.validate()?;
    Ok(plan)
}

/// Find the first balanced JSON object in free-form LLM output.
fn extract_json(text: &str) -> Option<String> {
    for (start, ch) in text.char_indices() {
        if ch != '{' {
            continue;
        }
        if let Some(end) = find_json_object_end(text, start) {
            let candidate = &text[start..=end];
            if serde_json::from_str::<serde_json::Value>(candidate)
                .map(|v| v.is_object())
                .unwrap_or(false)
            {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

fn find_json_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text[start..].char_indices() {
        let abs = start + idx;
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
                if depth == 0 {
                    return Some(abs);
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

//! Task model definitions
//!
//! A Plan is an ordered list of typed Tasks produced by the planner;
//! each Task is executed by exactly one subagent and yields one
//! TaskResult.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of task types; each value is handled by exactly one subagent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Search,
    Analyze,
    Report,
    Render,
}

impl TaskType {
    /// Wire-format name, as it appears in plan JSON and context headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Search => "SEARCH",
            TaskType::Analyze => "ANALYZE",
            TaskType::Report => "REPORT",
            TaskType::Render => "RENDER",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task parameters.
///
/// `query` and `content` come from the planner and are immutable after
/// validation. `context` and `global_context` are injected by the
/// orchestrator immediately before execution. Unrecognized planner
/// fields are preserved in `extra` and ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_context: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A unit of work within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable index within the owning plan, assigned at validation.
    #[serde(default)]
    pub index: usize,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Human-readable description; also seeds the subagent prompt.
    pub description: String,
    #[serde(default)]
    pub parameters: TaskParameters,
}

impl Task {
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            index: 0,
            task_type,
            description: description.into(),
            parameters: TaskParameters::default(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.parameters.query = Some(query.into());
        self
    }
}

/// Plan validation errors.
#[derive(Debug, thiserror::Error)]
pub enum PlanValidationError {
    #[error("plan contains no tasks")]
    Empty,
    #[error("RENDER task at index {render} precedes the REPORT task at index {report}")]
    RenderBeforeReport { render: usize, report: usize },
}

/// An ordered, typed task list with a goal restatement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub description: String,
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn new(description: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            description: description.into(),
            tasks,
        }
    }

    /// Validate the plan and assign task indices `0..n-1`.
    ///
    /// A valid plan is non-empty and, when it carries both a REPORT and
    /// a RENDER task, renders after reporting.
    pub fn validate(&mut self) -> Result<(), PlanValidationError> {
        if self.tasks.is_empty() {
            return Err(PlanValidationError::Empty);
        }
        for (i, task) in self.tasks.iter_mut().enumerate() {
            task.index = i;
        }

        let report = self
            .tasks
            .iter()
            .position(|t| t.task_type == TaskType::Report);
        let render = self
            .tasks
            .iter()
            .position(|t| t.task_type == TaskType::Render);
        if let (Some(report), Some(render)) = (report, render) {
            if render < report {
                return Err(PlanValidationError::RenderBeforeReport { render, report });
            }
        }
        Ok(())
    }

    /// Index of the task whose output becomes the response payload:
    /// the REPORT task when present, otherwise the last task.
    pub fn response_task_index(&self) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.task_type == TaskType::Report)
            .or_else(|| self.tasks.len().checked_sub(1))
    }
}

/// Outcome of executing one task. `error` is empty on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_type: TaskType,
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TaskResult {
    pub fn ok(task_type: TaskType, output: impl Into<String>) -> Self {
        Self {
            task_type,
            success: true,
            output: output.into(),
            error: String::new(),
            metadata: Map::new(),
        }
    }

    pub fn failed(task_type: TaskType, error: impl Into<String>) -> Self {
        Self {
            task_type,
            success: false,
            output: String::new(),
            error: error.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Render this result as a context entry for successor tasks.
    pub fn context_entry(&self) -> String {
        format!("Output from {} task:\n{}", self.task_type, self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_type_wire_format() {
        assert_eq!(
            serde_json::to_string(&TaskType::Search).unwrap(),
            r#""SEARCH""#
        );
        let parsed: TaskType = serde_json::from_str(r#""RENDER""#).unwrap();
        assert_eq!(parsed, TaskType::Render);
        assert!(serde_json::from_str::<TaskType>(r#""DANCE""#).is_err());
    }

    #[test]
    fn test_task_parameters_preserve_unknown_fields() {
        let params: TaskParameters = serde_json::from_value(json!({
            "query": "olympics",
            "depth": 3
        }))
        .unwrap();
        assert_eq!(params.query.as_deref(), Some("olympics"));
        assert_eq!(params.extra.get("depth"), Some(&json!(3)));
    }

    #[test]
    fn test_plan_validate_assigns_indices() {
        let mut plan = Plan::new(
            "research",
            vec![
                Task::new(TaskType::Search, "find sources"),
                Task::new(TaskType::Report, "write it up"),
            ],
        );
        plan.validate().unwrap();
        assert_eq!(plan.tasks[0].index, 0);
        assert_eq!(plan.tasks[1].index, 1);
    }

    #[test]
    fn test_plan_validate_rejects_empty() {
        let mut plan = Plan::new("empty", Vec::new());
        assert!(matches!(plan.validate(), Err(PlanValidationError::Empty)));
    }

    #[test]
    fn test_plan_validate_rejects_render_before_report() {
        let mut plan = Plan::new(
            "backwards",
            vec![
                Task::new(TaskType::Render, "render"),
                Task::new(TaskType::Report, "report"),
            ],
        );
        assert!(matches!(
            plan.validate(),
            Err(PlanValidationError::RenderBeforeReport {
                render: 0,
                report: 1
            })
        ));
    }

    #[test]
    fn test_response_task_prefers_report() {
        let plan = Plan::new(
            "r",
            vec![
                Task::new(TaskType::Search, "s"),
                Task::new(TaskType::Report, "rep"),
                Task::new(TaskType::Render, "ren"),
            ],
        );
        assert_eq!(plan.response_task_index(), Some(1));

        let plan = Plan::new(
            "a",
            vec![
                Task::new(TaskType::Search, "s"),
                Task::new(TaskType::Analyze, "an"),
            ],
        );
        assert_eq!(plan.response_task_index(), Some(1));
    }

    #[test]
    fn test_context_entry_header() {
        let result = TaskResult::ok(TaskType::Search, "findings");
        assert_eq!(result.context_entry(), "Output from SEARCH task:\nfindings");
    }
}

//! Skill-selection runner: pick one skill via the LLM, then execute
//! its body with a bounded tool-call loop.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use taskpilot_core::{CancellationToken, InteractionHandler};
use taskpilot_llm::{ChatMessage, ChatRequest, LlmClient};
use taskpilot_tools::{ReadFileTool, SkillScriptTool, Tool, ToolRegistry, WriteFileTool};

use crate::discovery::discover_skills;
use crate::package::SkillPackage;
use crate::SkillError;

const SELECTION_SYSTEM_PROMPT: &str = "\
You are an expert assistant that selects the most appropriate skill to \
handle a user's request. Your response must be only the exact name of \
the chosen skill, with no other text or explanation.";

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct SkillRunnerConfig {
    pub skills_dir: PathBuf,
    pub auto_approve_tools: bool,
    /// Tool-call loop bound per execution.
    pub max_tool_rounds: usize,
    /// Model override; a skill's own `model` takes precedence.
    pub model: Option<String>,
}

impl Default for SkillRunnerConfig {
    fn default() -> Self {
        Self {
            skills_dir: PathBuf::from("skills"),
            auto_approve_tools: false,
            max_tool_rounds: 10,
            model: None,
        }
    }
}

/// Discovers skills, selects one for the prompt and runs it.
pub struct SkillRunner {
    client: Arc<dyn LlmClient>,
    /// Tools advertised for every skill, on top of the per-skill file
    /// and script tools the runner adds itself.
    base_tools: Vec<Arc<dyn Tool>>,
    handler: Option<Arc<dyn InteractionHandler>>,
    config: SkillRunnerConfig,
}

impl SkillRunner {
    pub fn new(
        client: Arc<dyn LlmClient>,
        base_tools: Vec<Arc<dyn Tool>>,
        handler: Option<Arc<dyn InteractionHandler>>,
        config: SkillRunnerConfig,
    ) -> Self {
        Self {
            client,
            base_tools,
            handler,
            config,
        }
    }

    /// Full entry: discovery → selection → tool-loop execution.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        user_prompt: &str,
    ) -> Result<String, SkillError> {
        let skills = discover_skills(&self.config.skills_dir)?;
        if skills.is_empty() {
            return Err(SkillError::NoSkills(self.config.skills_dir.clone()));
        }
        info!(count = skills.len(), "discovered skills");

        let selected = self.select_skill(cancel, user_prompt, &skills).await?;
        let skill = skills
            .get(&selected)
            .ok_or_else(|| SkillError::UnknownSkill(selected.clone()))?;
        info!(skill = %selected, "skill selected");

        self.execute_skill(cancel, user_prompt, skill).await
    }

    async fn select_skill(
        &self,
        cancel: &CancellationToken,
        user_prompt: &str,
        skills: &HashMap<String, SkillPackage>,
    ) -> Result<String, SkillError> {
        let mut listing = format!("User Request: {}\n\nAvailable Skills:\n", user_prompt);
        let mut names: Vec<&String> = skills.keys().collect();
        names.sort();
        for name in names {
            listing.push_str(&format!("- {}: {}\n", name, skills[name].meta.description));
        }
        listing.push_str(
            "\nBased on the user request, which single skill is the most appropriate to use? \
             Respond with only the name of the skill.",
        );

        let request =
            ChatRequest::prompt(SELECTION_SYSTEM_PROMPT, listing).with_temperature(0.0);
        let reply = or_cancelled(cancel, self.client.chat(request))
            .await
            .ok_or(SkillError::Cancelled)??;
        let name = reply
            .content_or_empty()
            .trim()
            .trim_matches(|c| c == '\'' || c == '"')
            .to_string();
        Ok(name)
    }

    async fn execute_skill(
        &self,
        cancel: &CancellationToken,
        user_prompt: &str,
        skill: &SkillPackage,
    ) -> Result<String, SkillError> {
        let registry = self.build_registry(skill);
        let tools = registry.definitions();

        let system = format!(
            "{}\n\n## SKILL CONTEXT\nSkill Root Path: {}\n",
            skill.body,
            skill.path.display()
        );
        let mut messages = vec![
            ChatMessage::system(system),
            ChatMessage::user(user_prompt),
        ];
        let model = skill
            .meta
            .model
            .clone()
            .or_else(|| self.config.model.clone());

        for round in 0..self.config.max_tool_rounds {
            let mut request = ChatRequest::new(messages.clone()).with_tools(tools.clone());
            if let Some(model) = &model {
                request = request.with_model(model.clone());
            }
            let assistant = or_cancelled(cancel, self.client.chat(request))
                .await
                .ok_or(SkillError::Cancelled)??;
            messages.push(assistant.clone());

            if !assistant.has_tool_calls() {
                return Ok(assistant.content_or_empty().to_string());
            }

            // Tool calls run in the order the model produced them and
            // their results are appended in that same order.
            for call in &assistant.tool_calls {
                info!(
                    round,
                    tool = %call.function.name,
                    "skill tool call"
                );
                if !self.config.auto_approve_tools {
                    if let Some(handler) = &self.handler {
                        let approved = handler
                            .approve_tool(&call.function.name, &call.function.arguments)
                            .await
                            .unwrap_or(false);
                        if !approved {
                            messages.push(ChatMessage::tool(
                                &call.id,
                                "Error: User denied tool execution.",
                            ));
                            continue;
                        }
                    }
                }

                let content = match registry.invoke(call).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(tool = %call.function.name, error = %e, "tool call failed");
                        format!("Error: {}", e)
                    }
                };
                messages.push(ChatMessage::tool(&call.id, content));
            }
        }

        Err(SkillError::ToolLoopExceeded)
    }

    fn build_registry(&self, skill: &SkillPackage) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in &self.base_tools {
            registry.register(tool.clone());
        }
        registry.register(Arc::new(ReadFileTool::with_skill_root(&skill.path)));
        registry.register(Arc::new(WriteFileTool));
        for script in &skill.resources.scripts {
            registry.register(Arc::new(SkillScriptTool::new(
                tool_name_for_script(script),
                script,
            )));
        }
        registry
    }
}

fn tool_name_for_script(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("script");
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

async fn or_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        value = fut => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use taskpilot_core::{InteractionError, Plan, PlanDecision};
    use taskpilot_llm::{FunctionCall, LlmError, ToolCall};
    use taskpilot_tools::ToolError;

    /// Test client that records every request and pops scripted
    /// responses.
    struct RecordingClient {
        responses: Mutex<Vec<ChatMessage>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl RecordingClient {
        fn new(mut responses: Vec<ChatMessage>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request_messages(&self) -> Vec<ChatMessage> {
            self.requests
                .lock()
                .unwrap()
                .last()
                .map(|r| r.messages.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for RecordingClient {
        async fn chat(&self, request: ChatRequest) -> Result<ChatMessage, LlmError> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                Ok(responses.pop().unwrap())
            } else {
                // Keep replaying the final scripted response.
                responses
                    .last()
                    .cloned()
                    .ok_or_else(|| LlmError::Response("exhausted".to_string()))
            }
        }
    }

    struct CountingTool {
        invocations: Mutex<usize>,
    }

    impl CountingTool {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                invocations: Mutex::new(0),
            })
        }

        fn count(&self) -> usize {
            *self.invocations.lock().unwrap()
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "count_things"
        }

        fn description(&self) -> &str {
            "Counts invocations"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn invoke(&self, _arguments: &str) -> Result<String, ToolError> {
            *self.invocations.lock().unwrap() += 1;
            Ok("counted".to_string())
        }
    }

    struct DenyFirstHandler {
        denied: Mutex<bool>,
    }

    #[async_trait]
    impl InteractionHandler for DenyFirstHandler {
        async fn log(&self, _line: &str) {}

        async fn review_plan(&self, _plan: &Plan) -> Result<PlanDecision, InteractionError> {
            Ok(PlanDecision::Approved)
        }

        async fn review_search_results(&self, _results: &str) -> Result<bool, InteractionError> {
            Ok(false)
        }

        async fn approve_tool(
            &self,
            _name: &str,
            _arguments: &str,
        ) -> Result<bool, InteractionError> {
            let mut denied = self.denied.lock().unwrap();
            if *denied {
                Ok(true)
            } else {
                *denied = true;
                Ok(false)
            }
        }
    }

    fn write_skill_dir(root: &Path, name: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            format!(
                "---\nname: {}\ndescription: test skill {}\n---\nUse tools to finish the task.\n",
                name, name
            ),
        )
        .unwrap();
    }

    fn tool_call_message(tool: &str, call_id: &str) -> ChatMessage {
        ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: vec![ToolCall {
                id: call_id.to_string(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: tool.to_string(),
                    arguments: "{}".to_string(),
                },
            }],
            tool_call_id: None,
        }
    }

    fn runner_config(root: &Path, auto_approve: bool) -> SkillRunnerConfig {
        SkillRunnerConfig {
            skills_dir: root.to_path_buf(),
            auto_approve_tools: auto_approve,
            max_tool_rounds: 10,
            model: None,
        }
    }

    #[test]
    fn test_selection_strips_quotes_and_runs_tool_loop() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            write_skill_dir(root.path(), "counter");

            let tool = CountingTool::new();
            let client = RecordingClient::new(vec![
                ChatMessage::assistant("  'counter'  "),
                tool_call_message("count_things", "call_1"),
                ChatMessage::assistant("all done"),
            ]);
            let runner = SkillRunner::new(
                client.clone(),
                vec![tool.clone() as Arc<dyn Tool>],
                None,
                runner_config(root.path(), true),
            );

            let output = runner
                .run(&CancellationToken::new(), "count my things")
                .await
                .unwrap();
            assert_eq!(output, "all done");
            assert_eq!(tool.count(), 1);

            // The final request carries the tool-role result threaded
            // by call id.
            let messages = client.last_request_messages();
            let tool_msg = messages
                .iter()
                .find(|m| m.role == "tool")
                .expect("tool message");
            assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
            assert_eq!(tool_msg.content_or_empty(), "counted");
            assert!(messages[0].content_or_empty().contains("## SKILL CONTEXT"));
        });
    }

    #[test]
    fn test_unknown_skill_name_fails() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            write_skill_dir(root.path(), "real");

            let client = RecordingClient::new(vec![ChatMessage::assistant("imaginary")]);
            let runner =
                SkillRunner::new(client, vec![], None, runner_config(root.path(), true));
            let err = runner
                .run(&CancellationToken::new(), "prompt")
                .await
                .unwrap_err();
            assert!(matches!(err, SkillError::UnknownSkill(name) if name == "imaginary"));
        });
    }

    #[test]
    fn test_empty_skills_dir_fails() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            let client = RecordingClient::new(vec![]);
            let runner =
                SkillRunner::new(client, vec![], None, runner_config(root.path(), true));
            let err = runner
                .run(&CancellationToken::new(), "prompt")
                .await
                .unwrap_err();
            assert!(matches!(err, SkillError::NoSkills(_)));
        });
    }

    #[test]
    fn test_tool_loop_cap() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            write_skill_dir(root.path(), "looper");

            let tool = CountingTool::new();
            // Selection reply, then a tool call forever.
            let client = RecordingClient::new(vec![
                ChatMessage::assistant("looper"),
                tool_call_message("count_things", "call_loop"),
            ]);
            let runner = SkillRunner::new(
                client.clone(),
                vec![tool.clone() as Arc<dyn Tool>],
                None,
                runner_config(root.path(), true),
            );

            let err = runner
                .run(&CancellationToken::new(), "never stop")
                .await
                .unwrap_err();
            assert!(matches!(err, SkillError::ToolLoopExceeded));
            assert_eq!(
                err.to_string(),
                "exceeded maximum tool call iterations"
            );
            // One selection request plus exactly ten loop rounds.
            assert_eq!(client.request_count(), 11);
            assert_eq!(tool.count(), 10);
        });
    }

    #[test]
    fn test_denied_tool_execution_feeds_error_back() {
        tokio_test::block_on(async {
            let root = tempfile::tempdir().unwrap();
            write_skill_dir(root.path(), "guarded");

            let tool = CountingTool::new();
            let client = RecordingClient::new(vec![
                ChatMessage::assistant("guarded"),
                tool_call_message("count_things", "call_denied"),
                ChatMessage::assistant("finished without the tool"),
            ]);
            let handler: Arc<dyn InteractionHandler> = Arc::new(DenyFirstHandler {
                denied: Mutex::new(false),
            });
            let runner = SkillRunner::new(
                client.clone(),
                vec![tool.clone() as Arc<dyn Tool>],
                Some(handler),
                runner_config(root.path(), false),
            );

            let output = runner
                .run(&CancellationToken::new(), "guarded prompt")
                .await
                .unwrap();
            assert_eq!(output, "finished without the tool");
            assert_eq!(tool.count(), 0);

            let messages = client.last_request_messages();
            let denial = messages
                .iter()
                .find(|m| m.role == "tool")
                .expect("denial message");
            assert_eq!(denial.tool_call_id.as_deref(), Some("call_denied"));
            assert_eq!(
                denial.content_or_empty(),
                "Error: User denied tool execution."
            );
        });
    }

    #[test]
    fn test_script_tools_are_registered() {
        let root = tempfile::tempdir().unwrap();
        write_skill_dir(root.path(), "scripted");
        let scripts = root.path().join("scripted/scripts");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join("make-report.py"), "print('ok')").unwrap();

        let skills = discover_skills(root.path()).unwrap();
        let runner = SkillRunner::new(
            RecordingClient::new(vec![]),
            vec![],
            None,
            runner_config(root.path(), true),
        );
        let registry = runner.build_registry(&skills["scripted"]);
        let names: Vec<&str> = registry.names().collect();
        assert!(names.contains(&"read_file"));
        assert!(names.contains(&"write_file"));
        assert!(names.contains(&"make_report"));
    }

    #[test]
    fn test_tool_name_for_script_sanitizes() {
        assert_eq!(
            tool_name_for_script(Path::new("scripts/gen report-v2.py")),
            "gen_report_v2"
        );
    }
}

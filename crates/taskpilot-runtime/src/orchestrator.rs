//! Orchestrator - plan → review → execute pipeline.
//!
//! Runs a validated plan one task at a time, threading each result
//! into the next task's context and emitting progress events. The
//! literal log markers (`📍 步骤`, `✓ 完成`, `✗ 失败`) are a parse
//! contract with the UI and must not change shape.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use taskpilot_core::{
    InteractionError, InteractionHandler, Plan, PlanDecision, ResponsePayload, SessionEvent,
    Subagent, TaskResult, TaskType,
};
use taskpilot_planner::{PlanError, Planner};

use crate::postprocess::{PodcastGenerator, PptGenerator};
use crate::session::Session;

/// Orchestrator errors. Each becomes the session's single terminal
/// `Error` event.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("planner error: {0}")]
    Planner(#[from] PlanError),
    #[error("no subagent registered for task type {0}")]
    UnknownTaskType(TaskType),
    #[error("task failed: {0}")]
    TaskFailed(String),
    #[error("session cancelled")]
    Cancelled,
    #[error("interaction error: {0}")]
    Interaction(#[from] InteractionError),
}

/// Executes plans for one session at a time.
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    handler: Arc<dyn InteractionHandler>,
    subagents: HashMap<TaskType, Arc<dyn Subagent>>,
    require_review: bool,
    ppt: Option<Arc<dyn PptGenerator>>,
    podcast: Option<Arc<dyn PodcastGenerator>>,
}

impl Orchestrator {
    pub fn new(planner: Arc<dyn Planner>, handler: Arc<dyn InteractionHandler>) -> Self {
        Self {
            planner,
            handler,
            subagents: HashMap::new(),
            require_review: false,
            ppt: None,
            podcast: None,
        }
    }

    /// Register the subagent for its task type.
    pub fn register_subagent(mut self, agent: Arc<dyn Subagent>) -> Self {
        self.subagents.insert(agent.task_type(), agent);
        self
    }

    /// Require human plan review before execution.
    pub fn with_review(mut self, require_review: bool) -> Self {
        self.require_review = require_review;
        self
    }

    pub fn with_ppt_generator(mut self, generator: Arc<dyn PptGenerator>) -> Self {
        self.ppt = Some(generator);
        self
    }

    pub fn with_podcast_generator(mut self, generator: Arc<dyn PodcastGenerator>) -> Self {
        self.podcast = Some(generator);
        self
    }

    /// Run the full pipeline for `request`, emitting events on the
    /// session. Always ends the stream with exactly one terminal
    /// event.
    pub async fn run(&self, session: &Session, request: &str) {
        match self.run_inner(session, request).await {
            Ok(payload) => {
                session.emit(SessionEvent::response(payload));
                session.emit(SessionEvent::Done);
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "session failed");
                session.emit(SessionEvent::error(e.to_string()));
            }
        }
    }

    async fn run_inner(
        &self,
        session: &Session,
        request: &str,
    ) -> Result<ResponsePayload, OrchestratorError> {
        let cancel = session.cancel_token().clone();
        let request = session.flags().apply_to(request);
        let global_context = session.global_context().await;
        let global = Some(global_context.as_str()).filter(|c| !c.trim().is_empty());

        info!(session_id = %session.id, "planning started");
        let mut plan = or_cancelled(&cancel, self.planner.plan(&request, global))
            .await
            .ok_or(OrchestratorError::Cancelled)??;
        self.check_coverage(&plan)?;
        self.handler.log(&render_plan(&plan)).await;

        if self.require_review {
            plan = self.review_loop(&cancel, plan, &request, global).await?;
        }
        session.set_plan(plan.clone()).await;

        let total = plan.tasks.len();
        let mut results: Vec<TaskResult> = Vec::with_capacity(total);
        for (i, task) in plan.tasks.iter().enumerate() {
            self.handler
                .log(&format!(
                    "📍 步骤 {}/{}: [{}] {}",
                    i + 1,
                    total,
                    task.task_type,
                    task.description
                ))
                .await;

            let mut run_task = task.clone();
            run_task.parameters.context =
                results.iter().map(TaskResult::context_entry).collect();
            run_task.parameters.global_context = global.map(str::to_string);

            let agent = self
                .subagents
                .get(&task.task_type)
                .ok_or(OrchestratorError::UnknownTaskType(task.task_type))?;

            let result = agent.execute(&cancel, &run_task).await;
            if !result.success {
                self.handler
                    .log(&format!("✗ 失败: {} - {}", task.description, result.error))
                    .await;
                if cancel.is_cancelled() {
                    return Err(OrchestratorError::Cancelled);
                }
                return Err(OrchestratorError::TaskFailed(result.error));
            }
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            self.handler
                .log(&format!("✓ 完成: {}", task.description))
                .await;
            session.record_result(result.clone()).await;
            results.push(result);
        }

        let content = plan
            .response_task_index()
            .and_then(|i| results.get(i))
            .map(|r| r.output.clone())
            .unwrap_or_default();

        let mut payload = ResponsePayload {
            content,
            ppt: None,
            podcast: None,
        };
        if session.flags().request_ppt {
            if let Some(generator) = &self.ppt {
                match or_cancelled(&cancel, generator.generate(&payload.content))
                    .await
                    .ok_or(OrchestratorError::Cancelled)?
                {
                    Ok(url) => payload.ppt = Some(url),
                    Err(e) => warn!(error = %e, "ppt generation failed"),
                }
            }
        }
        if session.flags().request_podcast {
            if let Some(generator) = &self.podcast {
                match or_cancelled(&cancel, generator.generate(&payload.content))
                    .await
                    .ok_or(OrchestratorError::Cancelled)?
                {
                    Ok(podcast) => payload.podcast = Some(podcast),
                    Err(e) => warn!(error = %e, "podcast generation failed"),
                }
            }
        }
        Ok(payload)
    }

    /// Repeat the review gate until the plan is approved. A non-empty
    /// reply re-invokes the planner with the modification instruction.
    async fn review_loop(
        &self,
        cancel: &CancellationToken,
        mut plan: Plan,
        request: &str,
        global: Option<&str>,
    ) -> Result<Plan, OrchestratorError> {
        loop {
            let decision = or_cancelled(cancel, self.handler.review_plan(&plan))
                .await
                .ok_or(OrchestratorError::Cancelled)??;
            match decision {
                PlanDecision::Approved => return Ok(plan),
                PlanDecision::Modify(instruction) => {
                    info!(instruction = %instruction, "re-planning after review");
                    self.handler
                        .log(&format!("🔄 正在根据反馈重新规划: {}", instruction))
                        .await;
                    let revised = format!("{}\n\n修改意见: {}", request, instruction);
                    plan = or_cancelled(cancel, self.planner.plan(&revised, global))
                        .await
                        .ok_or(OrchestratorError::Cancelled)??;
                    self.check_coverage(&plan)?;
                    self.handler.log(&render_plan(&plan)).await;
                }
            }
        }
    }

    /// Every task type in the plan must have a registered subagent;
    /// checked at validation time rather than at dispatch.
    fn check_coverage(&self, plan: &Plan) -> Result<(), OrchestratorError> {
        for task in &plan.tasks {
            if !self.subagents.contains_key(&task.task_type) {
                return Err(OrchestratorError::UnknownTaskType(task.task_type));
            }
        }
        Ok(())
    }
}

fn render_plan(plan: &Plan) -> String {
    let mut out = format!("📋 计划: {}\n", plan.description);
    for (i, task) in plan.tasks.iter().enumerate() {
        out.push_str(&format!(
            "  {}. [{}] {}\n",
            i + 1,
            task.task_type,
            task.description
        ));
    }
    out.trim_end().to_string()
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
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::handler::ChannelInteractionHandler;
    use crate::session::{Capabilities, SessionFlags, SessionManager};
    use taskpilot_core::{Task, TaskParameters};

    struct StubPlanner {
        plans: Mutex<VecDeque<Plan>>,
    }

    impl StubPlanner {
        fn new(plans: Vec<Plan>) -> Arc<Self> {
            Arc::new(Self {
                plans: Mutex::new(plans.into()),
            })
        }
    }

    #[async_trait]
    impl Planner for StubPlanner {
        async fn plan(
            &self,
            _request: &str,
            _global_context: Option<&str>,
        ) -> Result<Plan, PlanError> {
            self.plans
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| PlanError::Malformed("stub planner exhausted".to_string()))
        }
    }

    /// Records the parameters each execution saw and returns a fixed
    /// output.
    struct EchoSubagent {
        task_type: TaskType,
        output: String,
        seen: Mutex<Vec<TaskParameters>>,
    }

    impl EchoSubagent {
        fn new(task_type: TaskType, output: &str) -> Arc<Self> {
            Arc::new(Self {
                task_type,
                output: output.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Subagent for EchoSubagent {
        fn task_type(&self) -> TaskType {
            self.task_type
        }

        async fn execute(&self, _cancel: &CancellationToken, task: &Task) -> TaskResult {
            self.seen.lock().unwrap().push(task.parameters.clone());
            TaskResult::ok(self.task_type, self.output.clone())
        }
    }

    /// Blocks until cancelled, then reports the cancellation.
    struct HangingSubagent {
        task_type: TaskType,
    }

    #[async_trait]
    impl Subagent for HangingSubagent {
        fn task_type(&self) -> TaskType {
            self.task_type
        }

        async fn execute(&self, cancel: &CancellationToken, _task: &Task) -> TaskResult {
            cancel.cancelled().await;
            TaskResult::failed(self.task_type, "task cancelled")
        }
    }

    fn research_plan() -> Plan {
        Plan::new(
            "research the topic",
            vec![
                Task::new(TaskType::Search, "find sources"),
                Task::new(TaskType::Report, "write the report"),
                Task::new(TaskType::Render, "render the report"),
            ],
        )
    }

    async fn post_when_waiting(manager: &SessionManager, id: &str, text: &str) {
        for _ in 0..100 {
            if manager.post_response(id, text.to_string()).await.is_ok() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("no review became pending for session {}", id);
    }

    fn collect_markers(events: &[SessionEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Log { content } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_simple_research_event_order() {
        tokio_test::block_on(async {
            let manager = SessionManager::new(Capabilities::default());
            let (session, mut rx) = manager.start("s1", SessionFlags::default()).await;
            let handler = ChannelInteractionHandler::for_session(&session);

            let orchestrator = Orchestrator::new(StubPlanner::new(vec![research_plan()]), handler)
                .register_subagent(EchoSubagent::new(TaskType::Search, "search results"))
                .register_subagent(EchoSubagent::new(TaskType::Report, "# Report\n\nbody"))
                .register_subagent(EchoSubagent::new(TaskType::Render, "rendered output"));

            orchestrator.run(&session, "Summarize the history").await;
            manager.drain("s1").await.unwrap();
            drop(orchestrator);
            drop(session);

            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }

            // Exactly one terminal event, at the end.
            let terminal_count = events.iter().filter(|e| e.is_terminal()).count();
            assert_eq!(terminal_count, 1);
            assert!(matches!(events.last(), Some(SessionEvent::Done)));

            // Response carries the REPORT output, not the rendered
            // one, and precedes Done.
            match &events[events.len() - 2] {
                SessionEvent::Response { content, ppt, podcast } => {
                    assert_eq!(content, "# Report\n\nbody");
                    assert!(ppt.is_none());
                    assert!(podcast.is_none());
                }
                other => panic!("expected response, got {:?}", other),
            }

            let markers = collect_markers(&events);
            assert!(markers[0].starts_with("📋 计划:"));
            assert!(markers[1].starts_with("📍 步骤 1/3: [SEARCH]"));
            assert!(markers[2].starts_with("✓ 完成"));
            assert!(markers[3].starts_with("📍 步骤 2/3: [REPORT]"));
            assert!(markers[5].starts_with("📍 步骤 3/3: [RENDER]"));
            let started = markers.iter().filter(|m| m.starts_with("📍")).count();
            let ended = markers
                .iter()
                .filter(|m| m.starts_with("✓ 完成") || m.starts_with("✗ 失败"))
                .count();
            assert_eq!(started, ended);
        });
    }

    #[test]
    fn test_context_threading_invariant() {
        tokio_test::block_on(async {
            let manager = SessionManager::new(Capabilities::default());
            let (session, _rx) = manager.start("s1", SessionFlags::default()).await;
            session.set_global_context("关注中文史料").await;
            let handler = ChannelInteractionHandler::for_session(&session);

            let search = EchoSubagent::new(TaskType::Search, "search results");
            let report = EchoSubagent::new(TaskType::Report, "report body");
            let render = EchoSubagent::new(TaskType::Render, "rendered");
            let orchestrator = Orchestrator::new(StubPlanner::new(vec![research_plan()]), handler)
                .register_subagent(search.clone())
                .register_subagent(report.clone())
                .register_subagent(render.clone());

            orchestrator.run(&session, "request").await;

            // Task i sees exactly i context entries, each headered.
            let search_params = &search.seen.lock().unwrap()[0];
            assert!(search_params.context.is_empty());

            let report_params = &report.seen.lock().unwrap()[0];
            assert_eq!(report_params.context.len(), 1);
            assert!(report_params.context[0].starts_with("Output from SEARCH task:"));
            assert_eq!(
                report_params.global_context.as_deref(),
                Some("关注中文史料")
            );

            let render_params = &render.seen.lock().unwrap()[0];
            assert_eq!(render_params.context.len(), 2);
            assert!(render_params.context[1].starts_with("Output from REPORT task:"));
        });
    }

    #[test]
    fn test_plan_review_modification_cycle() {
        tokio_test::block_on(async {
            let manager = Arc::new(SessionManager::new(Capabilities::default()));
            let (session, mut rx) = manager.start("s2", SessionFlags::default()).await;
            let handler = ChannelInteractionHandler::for_session(&session);

            let three_tasks = Plan::new(
                "compare",
                vec![
                    Task::new(TaskType::Search, "search Go"),
                    Task::new(TaskType::Search, "search Rust"),
                    Task::new(TaskType::Report, "compare them"),
                ],
            );
            let four_tasks = Plan::new(
                "compare with security",
                vec![
                    Task::new(TaskType::Search, "search Go"),
                    Task::new(TaskType::Search, "search Rust"),
                    Task::new(TaskType::Analyze, "security comparison"),
                    Task::new(TaskType::Report, "compare them"),
                ],
            );
            let orchestrator = Orchestrator::new(
                StubPlanner::new(vec![three_tasks, four_tasks]),
                handler,
            )
            .with_review(true)
            .register_subagent(EchoSubagent::new(TaskType::Search, "s"))
            .register_subagent(EchoSubagent::new(TaskType::Analyze, "a"))
            .register_subagent(EchoSubagent::new(TaskType::Report, "r"));

            let run_session = session.clone();
            let run = tokio::spawn(async move {
                orchestrator.run(&run_session, "Compare Go and Rust.").await;
            });

            // First review: ask for a modification.
            let mut first_review = None;
            while let Some(event) = rx.recv().await {
                if let SessionEvent::PlanReview { plan } = event {
                    first_review = Some(plan);
                    break;
                }
            }
            assert_eq!(first_review.unwrap().tasks.len(), 3);
            post_when_waiting(&manager, "s2", "Add a security comparison.").await;

            // Second review: approve with an empty reply.
            let mut second_review = None;
            while let Some(event) = rx.recv().await {
                if let SessionEvent::PlanReview { plan } = event {
                    second_review = Some(plan);
                    break;
                }
            }
            assert_eq!(second_review.unwrap().tasks.len(), 4);
            post_when_waiting(&manager, "s2", "").await;

            run.await.unwrap();
            manager.drain("s2").await.unwrap();
            drop(session);

            let mut saw_done = false;
            while let Some(event) = rx.recv().await {
                if matches!(event, SessionEvent::Done) {
                    saw_done = true;
                }
            }
            assert!(saw_done);
        });
    }

    #[test]
    fn test_cancellation_mid_task() {
        tokio_test::block_on(async {
            let manager = Arc::new(SessionManager::new(Capabilities::default()));
            let (session, mut rx) = manager.start("s6", SessionFlags::default()).await;
            let handler = ChannelInteractionHandler::for_session(&session);

            let plan = Plan::new(
                "analyze",
                vec![
                    Task::new(TaskType::Search, "find"),
                    Task::new(TaskType::Analyze, "think"),
                ],
            );
            let orchestrator = Orchestrator::new(StubPlanner::new(vec![plan]), handler)
                .register_subagent(EchoSubagent::new(TaskType::Search, "found"))
                .register_subagent(Arc::new(HangingSubagent {
                    task_type: TaskType::Analyze,
                }));

            let run_session = session.clone();
            let run = tokio::spawn(async move {
                orchestrator.run(&run_session, "request").await;
            });

            // Wait for the Analyze step marker, then cancel.
            while let Some(event) = rx.recv().await {
                if let SessionEvent::Log { content } = &event {
                    if content.starts_with("📍 步骤 2/2") {
                        break;
                    }
                }
            }
            manager.cancel("s6").await.unwrap();
            run.await.unwrap();
            manager.drain("s6").await.unwrap();
            drop(session);

            let mut rest = Vec::new();
            while let Some(event) = rx.recv().await {
                rest.push(event);
            }
            // No completion marker for the cancelled task; the stream
            // ends with a single Error and nothing after it.
            assert!(collect_markers(&rest)
                .iter()
                .all(|m| !m.starts_with("✓ 完成")));
            assert!(matches!(rest.last(), Some(SessionEvent::Error { .. })));
            assert_eq!(rest.iter().filter(|e| e.is_terminal()).count(), 1);
        });
    }

    #[test]
    fn test_failed_task_stops_execution() {
        tokio_test::block_on(async {
            let manager = SessionManager::new(Capabilities::default());
            let (session, mut rx) = manager.start("sf", SessionFlags::default()).await;
            let handler = ChannelInteractionHandler::for_session(&session);

            struct FailingSubagent;

            #[async_trait]
            impl Subagent for FailingSubagent {
                fn task_type(&self) -> TaskType {
                    TaskType::Search
                }

                async fn execute(&self, _cancel: &CancellationToken, _task: &Task) -> TaskResult {
                    TaskResult::failed(TaskType::Search, "both providers down")
                }
            }

            let report = EchoSubagent::new(TaskType::Report, "never runs");
            let plan = Plan::new(
                "doomed",
                vec![
                    Task::new(TaskType::Search, "find"),
                    Task::new(TaskType::Report, "report"),
                ],
            );
            let orchestrator = Orchestrator::new(StubPlanner::new(vec![plan]), handler)
                .register_subagent(Arc::new(FailingSubagent))
                .register_subagent(report.clone());

            orchestrator.run(&session, "request").await;
            manager.drain("sf").await.unwrap();
            drop(orchestrator);
            drop(session);

            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            let markers = collect_markers(&events);
            assert!(markers.iter().any(|m| m.starts_with("✗ 失败")));
            match events.last() {
                Some(SessionEvent::Error { content }) => {
                    assert!(content.contains("both providers down"))
                }
                other => panic!("expected error, got {:?}", other),
            }
            assert!(report.seen.lock().unwrap().is_empty());
        });
    }

    #[test]
    fn test_uncovered_task_type_fails_before_execution() {
        tokio_test::block_on(async {
            let manager = SessionManager::new(Capabilities::default());
            let (session, mut rx) = manager.start("su", SessionFlags::default()).await;
            let handler = ChannelInteractionHandler::for_session(&session);

            let search = EchoSubagent::new(TaskType::Search, "found");
            let plan = Plan::new(
                "missing renderer",
                vec![
                    Task::new(TaskType::Search, "find"),
                    Task::new(TaskType::Render, "render"),
                ],
            );
            let orchestrator = Orchestrator::new(StubPlanner::new(vec![plan]), handler)
                .register_subagent(search.clone());

            orchestrator.run(&session, "request").await;
            manager.drain("su").await.unwrap();
            drop(orchestrator);
            drop(session);

            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            match events.last() {
                Some(SessionEvent::Error { content }) => {
                    assert!(content.contains("RENDER"))
                }
                other => panic!("expected error, got {:?}", other),
            }
            // Coverage failure precedes execution of any task.
            assert!(search.seen.lock().unwrap().is_empty());
        });
    }

    #[test]
    fn test_ppt_generation_rides_response() {
        tokio_test::block_on(async {
            struct StaticPpt;

            #[async_trait]
            impl PptGenerator for StaticPpt {
                async fn generate(
                    &self,
                    _markdown: &str,
                ) -> Result<String, crate::postprocess::PostProcessError> {
                    Ok("https://files.example/report.pptx".to_string())
                }
            }

            let manager = SessionManager::new(Capabilities {
                ppt: true,
                podcast: false,
            });
            let (session, mut rx) = manager
                .start(
                    "sp",
                    SessionFlags {
                        request_ppt: true,
                        request_podcast: false,
                    },
                )
                .await;
            let handler = ChannelInteractionHandler::for_session(&session);

            let plan = Plan::new("report", vec![Task::new(TaskType::Report, "write")]);
            let orchestrator = Orchestrator::new(StubPlanner::new(vec![plan]), handler)
                .register_subagent(EchoSubagent::new(TaskType::Report, "# R"))
                .with_ppt_generator(Arc::new(StaticPpt));

            orchestrator.run(&session, "request").await;
            manager.drain("sp").await.unwrap();
            drop(orchestrator);
            drop(session);

            let mut response = None;
            while let Some(event) = rx.recv().await {
                if let SessionEvent::Response { ppt, .. } = event {
                    response = Some(ppt);
                }
            }
            assert_eq!(
                response.unwrap().as_deref(),
                Some("https://files.example/report.pptx")
            );
        });
    }
}

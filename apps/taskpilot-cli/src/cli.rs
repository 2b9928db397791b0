use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use taskpilot_config::PilotConfig;
use taskpilot_core::{InteractionHandler, SessionEvent};
use taskpilot_llm::{HttpLlmClient, HttpLlmClientConfig, LlmClient};
use taskpilot_planner::TaskPlanner;
use taskpilot_runtime::{Capabilities, Orchestrator, SessionFlags, SessionManager};
use taskpilot_skills::{SkillRunner, SkillRunnerConfig};
use taskpilot_subagents::{AnalyzeSubagent, RenderSubagent, ReportSubagent, SearchSubagent};
use taskpilot_tools::{
    DuckDuckGoSearch, DuckDuckGoSearchTool, PythonCodeTool, PythonScriptTool, SearchProvider,
    ShellCodeTool, ShellScriptTool, TavilySearch, Tool, WebFetchTool, WikipediaSearch,
    WikipediaSearchTool,
};

use crate::handler::TerminalInteractionHandler;

#[derive(Debug, Parser)]
#[command(name = "taskpilot", about = "LLM task-orchestration agent")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan a request and execute it through the subagent pipeline
    Run(RunArgs),
    /// Select a skill package and run it with tool calling
    Skill(SkillArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, default_value = "config/taskpilot.yaml")]
    config: PathBuf,
    /// Review the plan before execution
    #[arg(long)]
    review: bool,
    /// Render the final report as an HTML page instead of terminal text
    #[arg(long)]
    html: bool,
    #[arg(long)]
    ppt: bool,
    #[arg(long)]
    podcast: bool,
    #[arg(long)]
    verbose: bool,
    #[arg(value_name = "REQUEST", required = true)]
    request: Vec<String>,
}

#[derive(Debug, Args)]
struct SkillArgs {
    #[arg(long, default_value = "config/taskpilot.yaml")]
    config: PathBuf,
    /// Approve every tool invocation without prompting
    #[arg(long)]
    yes: bool,
    #[arg(long)]
    verbose: bool,
    #[arg(value_name = "PROMPT", required = true)]
    prompt: Vec<String>,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Run(args) => {
                init_tracing(args.verbose);
                run_pipeline(args).await
            }
            Command::Skill(args) => {
                init_tracing(args.verbose);
                run_skill(args).await
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", if verbose { "debug" } else { "warn" });
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &PathBuf) -> anyhow::Result<PilotConfig> {
    let mut config = if path.is_file() {
        taskpilot_config::load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?
    } else {
        PilotConfig::default()
    };
    if config.llm.api_key.is_empty() {
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            config.llm.api_key = key;
        }
    }
    anyhow::ensure!(!config.llm.api_key.is_empty(), "API key is not set");
    Ok(config)
}

fn build_llm_client(config: &PilotConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    let client = HttpLlmClient::new(HttpLlmClientConfig {
        endpoint: config.llm.api_base.clone(),
        api_key: Some(config.llm.api_key.clone()),
        model: config.llm.model.clone(),
        timeout_secs: config.llm.timeout_secs,
    })?;
    Ok(Arc::new(client))
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let client = build_llm_client(&config)?;
    let handler: Arc<dyn InteractionHandler> = Arc::new(TerminalInteractionHandler);

    let tavily: Arc<dyn SearchProvider> = Arc::new(TavilySearch::new(
        config.search.tavily_api_key.clone(),
        config.search.default_limit,
    ));
    let duckduckgo: Arc<dyn SearchProvider> = Arc::new(DuckDuckGoSearch::new());
    let wikipedia: Arc<dyn SearchProvider> = Arc::new(WikipediaSearch::default());

    let planner = Arc::new(TaskPlanner::new(client.clone()));
    let orchestrator = Orchestrator::new(planner, handler.clone())
        .with_review(args.review)
        .register_subagent(Arc::new(SearchSubagent::new(
            tavily,
            duckduckgo,
            wikipedia,
            Some(handler.clone()),
            config.search.more_limit,
        )))
        .register_subagent(Arc::new(AnalyzeSubagent::new(
            client.clone(),
            None,
            Some(handler.clone()),
        )))
        .register_subagent(Arc::new(ReportSubagent::new(
            client.clone(),
            None,
            Some(handler.clone()),
        )))
        .register_subagent(Arc::new(RenderSubagent::new(
            args.html,
            Some(handler.clone()),
        )));

    let manager = SessionManager::new(Capabilities {
        ppt: config.capabilities.ppt,
        podcast: config.capabilities.podcast,
    });
    let session_id = uuid::Uuid::new_v4().to_string();
    let flags = SessionFlags {
        request_ppt: args.ppt,
        request_podcast: args.podcast,
    };
    let (session, mut events) = manager.start(session_id.clone(), flags).await;

    let interrupt = session.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        let mut failed = false;
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Response { content, ppt, .. } => {
                    println!("\n{}", content);
                    if let Some(ppt) = ppt {
                        println!("\nPPT: {}", ppt);
                    }
                }
                SessionEvent::Error { content } => {
                    eprintln!("错误: {}", content);
                    failed = true;
                }
                _ => {}
            }
        }
        failed
    });

    let request = args.request.join(" ");
    orchestrator.run(&session, &request).await;
    manager.drain(&session_id).await.ok();
    drop(orchestrator);
    drop(session);

    let failed = printer.await.unwrap_or(true);
    anyhow::ensure!(!failed, "session ended with an error");
    Ok(())
}

async fn run_skill(args: SkillArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let client = build_llm_client(&config)?;
    let handler: Arc<dyn InteractionHandler> = Arc::new(TerminalInteractionHandler);

    let duckduckgo: Arc<dyn SearchProvider> = Arc::new(DuckDuckGoSearch::new());
    let wikipedia: Arc<dyn SearchProvider> = Arc::new(WikipediaSearch::default());
    let base_tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ShellCodeTool),
        Arc::new(ShellScriptTool),
        Arc::new(PythonCodeTool),
        Arc::new(PythonScriptTool),
        Arc::new(DuckDuckGoSearchTool::new(duckduckgo)),
        Arc::new(WikipediaSearchTool::new(wikipedia)),
        Arc::new(WebFetchTool::new()),
    ];

    let runner = SkillRunner::new(
        client,
        base_tools,
        Some(handler),
        SkillRunnerConfig {
            skills_dir: config.skills.dir.clone(),
            auto_approve_tools: args.yes || config.skills.auto_approve_tools,
            max_tool_rounds: config.skills.max_tool_rounds,
            model: None,
        },
    );

    let cancel = taskpilot_core::CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let prompt = args.prompt.join(" ");
    let output = runner.run(&cancel, &prompt).await?;
    println!("{}", output);
    Ok(())
}

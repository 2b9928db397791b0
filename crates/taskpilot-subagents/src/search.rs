//! Search subagent: primary search with fallback, human review of
//! results, and Wikipedia augmentation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use taskpilot_core::{
    CancellationToken, InteractionHandler, Subagent, Task, TaskResult, TaskType,
};
use taskpilot_tools::SearchProvider;

use crate::{or_cancelled, CANCELLED_MESSAGE};

/// Performs web searches for SEARCH tasks.
pub struct SearchSubagent {
    primary: Arc<dyn SearchProvider>,
    fallback: Arc<dyn SearchProvider>,
    wikipedia: Arc<dyn SearchProvider>,
    handler: Option<Arc<dyn InteractionHandler>>,
    /// Result cap used when the reviewer asks for more results.
    more_limit: usize,
}

impl SearchSubagent {
    pub fn new(
        primary: Arc<dyn SearchProvider>,
        fallback: Arc<dyn SearchProvider>,
        wikipedia: Arc<dyn SearchProvider>,
        handler: Option<Arc<dyn InteractionHandler>>,
        more_limit: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            wikipedia,
            handler,
            more_limit: more_limit.max(1),
        }
    }

    async fn log(&self, line: String) {
        if let Some(handler) = &self.handler {
            handler.log(&line).await;
        }
    }
}

#[async_trait]
impl Subagent for SearchSubagent {
    fn task_type(&self) -> TaskType {
        TaskType::Search
    }

    async fn execute(&self, cancel: &CancellationToken, task: &Task) -> TaskResult {
        self.log(format!("> 网络搜索子Agent: {}", task.description))
            .await;

        let query = task
            .parameters
            .query
            .clone()
            .unwrap_or_else(|| task.description.clone());
        info!(query = %query, "search subagent started");

        let primary = match or_cancelled(cancel, self.primary.search(&query)).await {
            Some(result) => result,
            None => return TaskResult::failed(TaskType::Search, CANCELLED_MESSAGE),
        };

        let mut results = match primary {
            Ok(results) => {
                // Human-in-the-loop: offer to widen the search.
                if let Some(handler) = &self.handler {
                    let want_more = or_cancelled(cancel, handler.review_search_results(&results))
                        .await
                        .map(|decision| decision.unwrap_or(false));
                    match want_more {
                        None => return TaskResult::failed(TaskType::Search, CANCELLED_MESSAGE),
                        Some(true) => {
                            info!(limit = self.more_limit, "user requested more results");
                            match or_cancelled(
                                cancel,
                                self.primary.search_with_limit(&query, self.more_limit),
                            )
                            .await
                            {
                                None => {
                                    return TaskResult::failed(TaskType::Search, CANCELLED_MESSAGE)
                                }
                                Some(Ok(more)) => more,
                                Some(Err(e)) => {
                                    // Keep the original results on error.
                                    warn!(error = %e, "wider search failed");
                                    results
                                }
                            }
                        }
                        Some(false) => results,
                    }
                } else {
                    results
                }
            }
            Err(primary_err) => {
                warn!(
                    provider = self.primary.name(),
                    error = %primary_err,
                    "primary search failed, falling back"
                );
                match or_cancelled(cancel, self.fallback.search(&query)).await {
                    None => return TaskResult::failed(TaskType::Search, CANCELLED_MESSAGE),
                    Some(Ok(results)) => results,
                    Some(Err(fallback_err)) => {
                        return TaskResult::failed(TaskType::Search, fallback_err.to_string())
                    }
                }
            }
        };

        // Wikipedia augmentation runs after the primary attempt has
        // resolved, regardless of which branch produced the results.
        match or_cancelled(cancel, self.wikipedia.search(&query)).await {
            None => return TaskResult::failed(TaskType::Search, CANCELLED_MESSAGE),
            Some(Ok(wiki)) if !wiki.is_empty() => {
                results = format!("网络搜索结果:\n{}\n\n维基百科结果:\n{}", results, wiki);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => warn!(error = %e, "wikipedia augmentation failed"),
        }

        self.log(format!("✓ 已检索信息 ({} 字节)", results.len()))
            .await;

        TaskResult::ok(TaskType::Search, results).with_metadata("query", json!(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpilot_core::{InteractionError, Plan, PlanDecision};
    use taskpilot_tools::ToolError;

    struct FixedProvider {
        response: Result<String, String>,
        more_response: Option<String>,
    }

    impl FixedProvider {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(text.to_string()),
                more_response: None,
            })
        }

        fn err(message: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Err(message.to_string()),
                more_response: None,
            })
        }
    }

    #[async_trait]
    impl SearchProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(&self, _query: &str) -> Result<String, ToolError> {
            self.response
                .clone()
                .map_err(ToolError::Execution)
        }

        async fn search_with_limit(
            &self,
            query: &str,
            _max_results: usize,
        ) -> Result<String, ToolError> {
            match &self.more_response {
                Some(more) => Ok(more.clone()),
                None => self.search(query).await,
            }
        }
    }

    struct MoreHandler;

    #[async_trait]
    impl InteractionHandler for MoreHandler {
        async fn log(&self, _line: &str) {}

        async fn review_plan(&self, _plan: &Plan) -> Result<PlanDecision, InteractionError> {
            Ok(PlanDecision::Approved)
        }

        async fn review_search_results(&self, _results: &str) -> Result<bool, InteractionError> {
            Ok(true)
        }

        async fn approve_tool(
            &self,
            _name: &str,
            _arguments: &str,
        ) -> Result<bool, InteractionError> {
            Ok(true)
        }
    }

    fn task() -> Task {
        Task::new(TaskType::Search, "find Olympic history").with_query("Olympic Games")
    }

    #[test]
    fn test_fallback_on_primary_failure() {
        tokio_test::block_on(async {
            let agent = SearchSubagent::new(
                FixedProvider::err("no api key"),
                FixedProvider::ok("DDG-OK"),
                FixedProvider::ok(""),
                None,
                50,
            );
            let result = agent.execute(&CancellationToken::new(), &task()).await;
            assert!(result.success);
            assert!(result.output.contains("DDG-OK"));
            assert_eq!(result.metadata.get("query").unwrap(), "Olympic Games");
        });
    }

    #[test]
    fn test_double_failure_is_terminal() {
        tokio_test::block_on(async {
            let agent = SearchSubagent::new(
                FixedProvider::err("primary down"),
                FixedProvider::err("fallback down"),
                FixedProvider::ok(""),
                None,
                50,
            );
            let result = agent.execute(&CancellationToken::new(), &task()).await;
            assert!(!result.success);
            assert!(result.error.contains("fallback down"));
        });
    }

    #[test]
    fn test_wikipedia_augmentation_after_fallback() {
        tokio_test::block_on(async {
            let agent = SearchSubagent::new(
                FixedProvider::err("primary down"),
                FixedProvider::ok("web results"),
                FixedProvider::ok("wiki results"),
                None,
                50,
            );
            let result = agent.execute(&CancellationToken::new(), &task()).await;
            assert!(result.success);
            assert!(result.output.starts_with("网络搜索结果:\nweb results"));
            assert!(result.output.contains("维基百科结果:\nwiki results"));
        });
    }

    #[test]
    fn test_review_more_replaces_results() {
        tokio_test::block_on(async {
            let primary = Arc::new(FixedProvider {
                response: Ok("few results".to_string()),
                more_response: Some("many results".to_string()),
            });
            let agent = SearchSubagent::new(
                primary,
                FixedProvider::ok("unused"),
                FixedProvider::ok(""),
                Some(Arc::new(MoreHandler)),
                50,
            );
            let result = agent.execute(&CancellationToken::new(), &task()).await;
            assert!(result.success);
            assert_eq!(result.output, "many results");
        });
    }

    #[test]
    fn test_query_falls_back_to_description() {
        tokio_test::block_on(async {
            let agent = SearchSubagent::new(
                FixedProvider::ok("ok"),
                FixedProvider::ok("ok"),
                FixedProvider::ok(""),
                None,
                50,
            );
            let task = Task::new(TaskType::Search, "bare description");
            let result = agent.execute(&CancellationToken::new(), &task).await;
            assert_eq!(result.metadata.get("query").unwrap(), "bare description");
        });
    }

    #[test]
    fn test_cancellation_fails_task() {
        tokio_test::block_on(async {
            let agent = SearchSubagent::new(
                FixedProvider::ok("ok"),
                FixedProvider::ok("ok"),
                FixedProvider::ok(""),
                None,
                50,
            );
            let token = CancellationToken::new();
            token.cancel();
            let result = agent.execute(&token, &task()).await;
            assert!(!result.success);
            assert_eq!(result.error, CANCELLED_MESSAGE);
        });
    }
}

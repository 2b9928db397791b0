//! Channel-bridge interaction handler.
//!
//! Adapts the [`InteractionHandler`] capability onto a session's
//! channels: log lines become `Log` events, plan review emits a
//! `PlanReview` event and blocks on the response gate. Holds only the
//! channel halves, never the session itself.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use taskpilot_core::{InteractionError, InteractionHandler, Plan, PlanDecision, SessionEvent};

use crate::session::{ResponseGate, Session, SessionError};

pub struct ChannelInteractionHandler {
    events: mpsc::UnboundedSender<SessionEvent>,
    gate: Arc<ResponseGate>,
}

impl ChannelInteractionHandler {
    pub fn for_session(session: &Session) -> Arc<Self> {
        Arc::new(Self {
            events: session.event_sender(),
            gate: session.response_gate(),
        })
    }
}

#[async_trait]
impl InteractionHandler for ChannelInteractionHandler {
    async fn log(&self, line: &str) {
        if self.events.send(SessionEvent::log(line)).is_err() {
            warn!("event channel closed, log line dropped");
        }
    }

    async fn review_plan(&self, plan: &Plan) -> Result<PlanDecision, InteractionError> {
        self.events
            .send(SessionEvent::plan_review(plan.clone()))
            .map_err(|e| InteractionError::ChannelClosed(e.to_string()))?;

        let reply = self.gate.wait().await.map_err(|e| match e {
            SessionError::Cancelled => InteractionError::Cancelled,
            other => InteractionError::ChannelClosed(other.to_string()),
        })?;

        if reply.trim().is_empty() {
            Ok(PlanDecision::Approved)
        } else {
            Ok(PlanDecision::Modify(reply))
        }
    }

    async fn review_search_results(&self, _results: &str) -> Result<bool, InteractionError> {
        // The event vocabulary carries no search-review variant, so the
        // channel bridge never widens a search on its own.
        Ok(false)
    }

    async fn approve_tool(&self, _name: &str, _arguments: &str) -> Result<bool, InteractionError> {
        // Tool approval is a terminal-prompt concern; the server-side
        // bridge runs with approval granted.
        Ok(true)
    }
}

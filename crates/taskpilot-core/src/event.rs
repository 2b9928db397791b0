//! Session event vocabulary.
//!
//! Events flow one way, orchestrator → transport, over the session's
//! event channel. Within a session the order of emission is the order
//! of delivery, and the final event is always exactly one of `Done`
//! or `Error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Plan;

/// Final artifact delivered with a `Response` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ppt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub podcast: Option<Value>,
}

/// Tagged event emitted on a session's event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Human-readable progress line.
    Log { content: String },
    /// A plan awaits human approval; the orchestrator is blocked.
    PlanReview { plan: Plan },
    /// The final rendered artifact.
    Response {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ppt: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        podcast: Option<Value>,
    },
    /// Terminal failure marker.
    Error { content: String },
    /// Terminal success marker.
    Done,
}

impl SessionEvent {
    pub fn log(content: impl Into<String>) -> Self {
        SessionEvent::Log {
            content: content.into(),
        }
    }

    pub fn plan_review(plan: Plan) -> Self {
        SessionEvent::PlanReview { plan }
    }

    pub fn response(payload: ResponsePayload) -> Self {
        SessionEvent::Response {
            content: payload.content,
            ppt: payload.ppt,
            podcast: payload.podcast,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        SessionEvent::Error {
            content: content.into(),
        }
    }

    /// Whether this event ends the session's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Done | SessionEvent::Error { .. })
    }
}

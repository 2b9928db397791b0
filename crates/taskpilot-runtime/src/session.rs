//! Session - per-request context with event and response channels.
//!
//! A session owns the outbound event channel (writer: orchestrator,
//! reader: transport), the inbound response channel (writer: transport
//! on human input, reader: orchestrator blocked on review) and a
//! cancellation token. Sessions are independent; events never cross
//! between them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use taskpilot_core::{Plan, SessionEvent, TaskResult};

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("no review pending for session {0}")]
    NotWaiting(String),
    #[error("session cancelled")]
    Cancelled,
    #[error("session channel closed")]
    ChannelClosed,
}

/// Request flags set by the transport at session start.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionFlags {
    pub request_ppt: bool,
    pub request_podcast: bool,
}

impl SessionFlags {
    /// Append the directive strings the flags stand for to the user
    /// message, before planning sees it.
    pub fn apply_to(&self, message: &str) -> String {
        let mut out = message.to_string();
        if self.request_ppt {
            out.push_str("\n\n请在报告完成后生成PPT演示文稿。");
        }
        if self.request_podcast {
            out.push_str("\n\n请在报告完成后生成播客对话稿。");
        }
        out
    }
}

/// Capabilities advertised to clients via `get_config`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub ppt: bool,
    pub podcast: bool,
}

/// The response half of a session: transport writes, orchestrator
/// reads while blocked on a review. Shared by the session and its
/// interaction handler so neither needs a pointer to the other.
pub struct ResponseGate {
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    awaiting: AtomicBool,
    cancel: CancellationToken,
}

impl ResponseGate {
    fn new(cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            awaiting: AtomicBool::new(false),
            cancel,
        }
    }

    /// Non-blocking write from the transport. Fails when no reader is
    /// blocked on a review.
    pub fn post(&self, text: String) -> Result<(), SessionError> {
        if !self.awaiting.load(Ordering::SeqCst) {
            return Err(SessionError::NotWaiting(String::new()));
        }
        self.tx
            .send(text)
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Block until the transport posts a response, or the session is
    /// cancelled.
    pub async fn wait(&self) -> Result<String, SessionError> {
        self.awaiting.store(true, Ordering::SeqCst);
        let mut rx = self.rx.lock().await;
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
            received = rx.recv() => received.ok_or(SessionError::ChannelClosed),
        };
        self.awaiting.store(false, Ordering::SeqCst);
        result
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// A server-side per-request context.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    flags: SessionFlags,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    gate: Arc<ResponseGate>,
    cancel: CancellationToken,
    global_context: RwLock<String>,
    plan: RwLock<Option<Plan>>,
    results: RwLock<Vec<TaskResult>>,
}

impl Session {
    fn new(
        id: impl Into<String>,
        flags: SessionFlags,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = Arc::new(Self {
            id: id.into(),
            created_at: Utc::now(),
            flags,
            event_tx,
            gate: Arc::new(ResponseGate::new(cancel.clone())),
            cancel,
            global_context: RwLock::new(String::new()),
            plan: RwLock::new(None),
            results: RwLock::new(Vec::new()),
        });
        (session, event_rx)
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    /// Emit an event on the outbound channel. A closed channel is not
    /// an error for the orchestrator; the terminal state has already
    /// been decided by then.
    pub fn emit(&self, event: SessionEvent) {
        if self.event_tx.send(event).is_err() {
            warn!(session_id = %self.id, "event channel closed, event dropped");
        }
    }

    pub fn response_gate(&self) -> Arc<ResponseGate> {
        self.gate.clone()
    }

    pub fn event_sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.event_tx.clone()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn global_context(&self) -> String {
        self.global_context.read().await.clone()
    }

    pub async fn set_global_context(&self, context: impl Into<String>) {
        *self.global_context.write().await = context.into();
    }

    /// Record the in-flight plan (set once approved, replaced on
    /// re-planning).
    pub async fn set_plan(&self, plan: Plan) {
        *self.plan.write().await = Some(plan);
    }

    pub async fn plan(&self) -> Option<Plan> {
        self.plan.read().await.clone()
    }

    /// Append one task's result to the session's accumulated state.
    pub async fn record_result(&self, result: TaskResult) {
        self.results.write().await.push(result);
    }

    pub async fn results(&self) -> Vec<TaskResult> {
        self.results.read().await.clone()
    }
}

/// Maintains the `session_id → Session` mapping.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    capabilities: Capabilities,
}

impl SessionManager {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capabilities,
        }
    }

    /// Advertised capabilities (`get_config`).
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Create a session for `id`, allocating fresh channels.
    ///
    /// An existing session under the same id is cancelled and removed
    /// first, so a stale orchestrator can never write into the new
    /// session's stream.
    pub async fn start(
        &self,
        id: impl Into<String>,
        flags: SessionFlags,
    ) -> (Arc<Session>, mpsc::UnboundedReceiver<SessionEvent>) {
        let id = id.into();
        let mut sessions = self.sessions.write().await;
        if let Some(previous) = sessions.remove(&id) {
            warn!(session_id = %id, "replacing existing session");
            previous.cancel();
        }
        let (session, event_rx) = Session::new(id.clone(), flags);
        sessions.insert(id.clone(), session.clone());
        info!(session_id = %id, "session started");
        (session, event_rx)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Answer a pending review. Errors when the session is unknown or
    /// nothing is waiting on the response channel.
    pub async fn post_response(&self, id: &str, text: String) -> Result<(), SessionError> {
        let session = self
            .get(id)
            .await
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session
            .gate
            .post(text)
            .map_err(|e| match e {
                SessionError::NotWaiting(_) => SessionError::NotWaiting(id.to_string()),
                other => other,
            })
    }

    /// Fire the session's cancellation token.
    pub async fn cancel(&self, id: &str) -> Result<(), SessionError> {
        let session = self
            .get(id)
            .await
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.cancel();
        info!(session_id = %id, "session cancelled");
        Ok(())
    }

    /// Remove the session after its terminal event has been consumed.
    pub async fn drain(&self, id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }
}

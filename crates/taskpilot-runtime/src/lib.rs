//! # Taskpilot Runtime
//!
//! The orchestrator that executes validated plans task-by-task, and
//! the session layer that ties an asynchronous request to a streamed
//! event channel, a human-response channel and a cancellation token.

mod handler;
mod orchestrator;
mod postprocess;
mod session;

pub use handler::ChannelInteractionHandler;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use postprocess::{PodcastGenerator, PostProcessError, PptGenerator};
pub use session::{
    Capabilities, ResponseGate, Session, SessionError, SessionFlags, SessionManager,
};

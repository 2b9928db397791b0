//! # Taskpilot Core
//!
//! Core abstractions shared by every Taskpilot crate.
//!
//! This crate contains:
//! - Task / Plan / TaskResult definitions and plan validation
//! - The session event vocabulary emitted to transports
//! - The `Subagent` and `InteractionHandler` capability traits
//!
//! This crate does NOT care about:
//! - How plans are produced (see `taskpilot-planner`)
//! - How tasks are executed (see `taskpilot-subagents`)
//! - How events reach a user (transport concern)

pub mod event;
pub mod interaction;
pub mod subagent;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::event::{ResponsePayload, SessionEvent};
    pub use crate::interaction::{InteractionError, InteractionHandler, PlanDecision};
    pub use crate::subagent::Subagent;
    pub use crate::types::{
        Plan, PlanValidationError, Task, TaskParameters, TaskResult, TaskType,
    };
    pub use tokio_util::sync::CancellationToken;
}

// Re-export key types at crate root
pub use event::{ResponsePayload, SessionEvent};
pub use interaction::{InteractionError, InteractionHandler, PlanDecision};
pub use subagent::Subagent;
pub use types::{Plan, PlanValidationError, Task, TaskParameters, TaskResult, TaskType};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

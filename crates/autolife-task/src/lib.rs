//! Autolife Task
//!
//! This crate models a single device-automation task run and the rules for
//! folding the agent's event stream into it.
//!
//! # Architecture
//!
//! ```text
//! (event name, JSON data)
//!          │  TaskEvent::decode
//!          ▼
//!      TaskEvent ──► TaskStateMachine::apply ──► Transition
//!                           │
//!                           ▼
//!                     TaskExecution
//!                     └── Vec<ExecutionStep>
//! ```
//!
//! The state machine is pure: it never performs I/O and never blocks. Side
//! effects on terminal transitions belong to the caller.

mod error;
mod event;
mod machine;
mod types;

pub use error::DecodeError;
pub use event::{
  ActionPayload, ErrorPayload, StepCompletePayload, StepStartPayload, TaskCancelledPayload,
  TaskCompletePayload, TaskEvent, TaskResultPayload, TaskStartPayload, ThinkingPayload,
};
pub use machine::{
  CANCELLED_MESSAGE, COMPLETED_MESSAGE, CONNECTION_LOST_MESSAGE, FAILED_MESSAGE,
  TaskStateMachine, Transition,
};
pub use types::{
  ActionDetail, ActionType, ExecutionStep, StepStatus, SwipeDirection, TaskExecution, TaskStatus,
};

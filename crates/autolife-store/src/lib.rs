//! Autolife Store
//!
//! This crate defines the downstream consumers of finished task runs and an
//! in-memory implementation of all of them.
//!
//! - [`ChatHistory`] receives one assistant message per terminal run
//! - [`ActivityLog`] receives activity records for activity-worthy runs
//! - [`TaskStore`] tracks the current run, the archive of finished runs and
//!   whether a stream is attached
//!
//! The task stream controller receives these as injected handles; nothing in
//! this crate is global.

mod memory;
mod types;

pub use memory::MemoryStore;
pub use types::{ChatMessage, MessageRole, NewMessage};

use autolife_activity::{ActivityRecord, NewActivity};
use autolife_task::TaskExecution;

/// Receives chat messages.
pub trait ChatHistory: Send + Sync {
  /// Append a message, returning it with its assigned id and timestamp.
  fn append_message(&self, message: NewMessage) -> ChatMessage;
}

/// Receives activity records.
pub trait ActivityLog: Send + Sync {
  /// Append an activity, returning the stored record.
  fn record_activity(&self, activity: NewActivity) -> ActivityRecord;
}

/// Owns the observable task state.
pub trait TaskStore: Send + Sync {
  /// Replace the current run snapshot. `None` returns the console to idle.
  fn publish_task(&self, task: Option<TaskExecution>);

  /// Append a finished run to the immutable history.
  fn archive_task(&self, task: TaskExecution);

  /// Record whether a stream channel is currently attached.
  fn set_stream_attached(&self, attached: bool);
}

/// Everything the task stream controller writes to.
pub trait ConsoleStore: ChatHistory + ActivityLog + TaskStore {}

impl<T: ChatHistory + ActivityLog + TaskStore> ConsoleStore for T {}

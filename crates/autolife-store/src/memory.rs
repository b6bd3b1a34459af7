//! In-memory store.

use std::sync::{Mutex, MutexGuard, PoisonError};

use autolife_activity::{ActivityCategory, ActivityRecord, NewActivity};
use autolife_task::TaskExecution;
use chrono::{Local, TimeZone, Utc};
use tokio::sync::watch;
use tracing::debug;

use crate::types::{ChatMessage, NewMessage};
use crate::{ActivityLog, ChatHistory, TaskStore};

#[derive(Debug, Default)]
struct Inner {
  messages: Vec<ChatMessage>,
  activities: Vec<ActivityRecord>,
  task_history: Vec<TaskExecution>,
  streaming: bool,
}

/// A store that keeps everything in process memory.
///
/// The current run is published on a watch channel so a UI (or a test) can
/// follow it without polling.
#[derive(Debug)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
  current: watch::Sender<Option<TaskExecution>>,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    let (current, _) = watch::channel(None);
    Self {
      inner: Mutex::new(Inner::default()),
      current,
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Subscribe to snapshots of the current run.
  pub fn subscribe(&self) -> watch::Receiver<Option<TaskExecution>> {
    self.current.subscribe()
  }

  /// Snapshot of the current run, if any.
  pub fn current_task(&self) -> Option<TaskExecution> {
    self.current.borrow().clone()
  }

  pub fn is_task_running(&self) -> bool {
    self
      .current
      .borrow()
      .as_ref()
      .is_some_and(|task| !task.status.is_terminal())
  }

  pub fn is_streaming(&self) -> bool {
    self.lock().streaming
  }

  pub fn messages(&self) -> Vec<ChatMessage> {
    self.lock().messages.clone()
  }

  pub fn clear_messages(&self) {
    self.lock().messages.clear();
  }

  pub fn activities(&self) -> Vec<ActivityRecord> {
    self.lock().activities.clone()
  }

  /// Activities recorded since local midnight.
  pub fn today_activities(&self) -> Vec<ActivityRecord> {
    let midnight = Local::now()
      .date_naive()
      .and_hms_opt(0, 0, 0)
      .and_then(|naive| Local.from_local_datetime(&naive).earliest())
      .map(|local| local.with_timezone(&Utc));

    self
      .lock()
      .activities
      .iter()
      .filter(|a| midnight.is_none_or(|midnight| a.timestamp >= midnight))
      .cloned()
      .collect()
  }

  pub fn activities_by_category(&self, category: ActivityCategory) -> Vec<ActivityRecord> {
    self
      .lock()
      .activities
      .iter()
      .filter(|a| a.category == category)
      .cloned()
      .collect()
  }

  /// Remove an activity. Returns whether it existed.
  pub fn delete_activity(&self, id: &str) -> bool {
    let mut inner = self.lock();
    let before = inner.activities.len();
    inner.activities.retain(|a| a.id != id);
    inner.activities.len() != before
  }

  /// Finished runs, oldest first.
  pub fn task_history(&self) -> Vec<TaskExecution> {
    self.lock().task_history.clone()
  }
}

impl ChatHistory for MemoryStore {
  fn append_message(&self, message: NewMessage) -> ChatMessage {
    let message = ChatMessage::from_new(message);
    debug!(message_id = %message.id, role = ?message.role, "appending chat message");
    self.lock().messages.push(message.clone());
    message
  }
}

impl ActivityLog for MemoryStore {
  fn record_activity(&self, activity: NewActivity) -> ActivityRecord {
    let record = activity.into_record();
    debug!(
      activity_id = %record.id,
      task_id = %record.task_id,
      category = record.category.as_str(),
      "recording activity"
    );
    self.lock().activities.push(record.clone());
    record
  }
}

impl TaskStore for MemoryStore {
  fn publish_task(&self, task: Option<TaskExecution>) {
    self.current.send_replace(task);
  }

  fn archive_task(&self, task: TaskExecution) {
    self.lock().task_history.push(task);
  }

  fn set_stream_attached(&self, attached: bool) {
    self.lock().streaming = attached;
  }
}

use autolife_task::{ExecutionStep, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
  User,
  Assistant,
  System,
}

/// A message to append (no id or timestamp yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
  pub role: MessageRole,
  pub content: String,
  /// The run's steps, kept so the chat view can show the chain of thought.
  pub steps: Option<Vec<ExecutionStep>>,
  pub task_status: Option<TaskStatus>,
}

impl NewMessage {
  pub fn user(content: impl Into<String>) -> Self {
    Self {
      role: MessageRole::User,
      content: content.into(),
      steps: None,
      task_status: None,
    }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self {
      role: MessageRole::Assistant,
      content: content.into(),
      steps: None,
      task_status: None,
    }
  }

  pub fn with_steps(mut self, steps: Vec<ExecutionStep>) -> Self {
    self.steps = Some(steps);
    self
  }

  pub fn with_task_status(mut self, status: TaskStatus) -> Self {
    self.task_status = Some(status);
    self
  }
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
  pub id: String,
  pub role: MessageRole,
  pub content: String,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub steps: Option<Vec<ExecutionStep>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_status: Option<TaskStatus>,
}

impl ChatMessage {
  pub(crate) fn from_new(message: NewMessage) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      role: message.role,
      content: message.content,
      timestamp: Utc::now(),
      steps: message.steps,
      task_status: message.task_status,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_chat_message_wire_shape() {
    let message = ChatMessage::from_new(
      NewMessage::assistant("done")
        .with_steps(vec![ExecutionStep::started(1, None)])
        .with_task_status(TaskStatus::Completed),
    );

    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["role"], "assistant");
    assert_eq!(value["taskStatus"], "completed");
    assert_eq!(value["steps"][0]["stepNumber"], 1);
    assert!(value["timestamp"].is_i64());

    let plain = serde_json::to_value(ChatMessage::from_new(NewMessage::user("hi"))).unwrap();
    assert!(plain.get("steps").is_none());
    assert!(plain.get("taskStatus").is_none());
  }
}

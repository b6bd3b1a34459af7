//! Named events of the task stream and their payloads.
//!
//! Every event arrives as a name plus a JSON document. Field names are
//! camelCase on the wire; unknown fields (the backend also echoes `taskId`)
//! are ignored.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DecodeError;
use crate::types::ActionDetail;

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStartPayload {
  #[serde(default)]
  pub task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStartPayload {
  pub step_number: u32,
  /// Lets a consumer render the action title before the `action` event arrives.
  #[serde(default)]
  pub action: Option<ActionDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingPayload {
  pub step_number: u32,
  pub thinking: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
  pub step_number: u32,
  pub action: ActionDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletePayload {
  pub step_number: u32,
  #[serde(default)]
  pub result: Option<String>,
  #[serde(default)]
  pub screenshot: Option<String>,
  #[serde(default)]
  pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct TaskResultPayload {
  #[serde(default)]
  pub report: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct TaskCancelledPayload {
  #[serde(default)]
  pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct TaskCompletePayload {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ErrorPayload {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

/// A decoded task stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
  TaskStart(TaskStartPayload),
  StepStart(StepStartPayload),
  Thinking(ThinkingPayload),
  Action(ActionPayload),
  StepComplete(StepCompletePayload),
  TaskResult(TaskResultPayload),
  TaskComplete(TaskCompletePayload),
  TaskCancelled(TaskCancelledPayload),
  Error(ErrorPayload),
}

impl TaskEvent {
  /// Decode a named event.
  ///
  /// Returns `Ok(None)` for event names this client does not know.
  pub fn decode(name: &str, data: &str) -> Result<Option<Self>, DecodeError> {
    let event = match name {
      "task_start" => TaskEvent::TaskStart(parse(name, data)?),
      "step_start" => TaskEvent::StepStart(parse(name, data)?),
      "thinking" => TaskEvent::Thinking(parse(name, data)?),
      "action" => TaskEvent::Action(parse(name, data)?),
      "step_complete" => TaskEvent::StepComplete(parse(name, data)?),
      "task_result" => TaskEvent::TaskResult(parse(name, data)?),
      "task_complete" => TaskEvent::TaskComplete(parse(name, data)?),
      "task_cancelled" => TaskEvent::TaskCancelled(parse(name, data)?),
      "error" => TaskEvent::Error(parse_error(data)?),
      _ => return Ok(None),
    };
    Ok(Some(event))
  }

  /// The wire name of this event.
  pub fn name(&self) -> &'static str {
    match self {
      TaskEvent::TaskStart(_) => "task_start",
      TaskEvent::StepStart(_) => "step_start",
      TaskEvent::Thinking(_) => "thinking",
      TaskEvent::Action(_) => "action",
      TaskEvent::StepComplete(_) => "step_complete",
      TaskEvent::TaskResult(_) => "task_result",
      TaskEvent::TaskComplete(_) => "task_complete",
      TaskEvent::TaskCancelled(_) => "task_cancelled",
      TaskEvent::Error(_) => "error",
    }
  }

  /// The step this event refers to, if any.
  pub fn step_number(&self) -> Option<u32> {
    match self {
      TaskEvent::StepStart(p) => Some(p.step_number),
      TaskEvent::Thinking(p) => Some(p.step_number),
      TaskEvent::Action(p) => Some(p.step_number),
      TaskEvent::StepComplete(p) => Some(p.step_number),
      _ => None,
    }
  }
}

/// Only a body that is not JSON at all is unstructured. Any JSON value is a
/// server error; `message` and `error` are taken when they are strings.
fn parse_error(data: &str) -> Result<ErrorPayload, DecodeError> {
  let value: Value = serde_json::from_str(data).map_err(|_| DecodeError::UnstructuredError)?;
  let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
  Ok(ErrorPayload {
    message: field("message"),
    error: field("error"),
  })
}

/// Parse a payload; an empty body is read as `{}` so field-less events decode.
fn parse<T: DeserializeOwned>(event: &str, data: &str) -> Result<T, DecodeError> {
  let data = if data.trim().is_empty() { "{}" } else { data };
  serde_json::from_str(data).map_err(|e| DecodeError::Malformed {
    event: event.to_string(),
    message: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::ActionType;

  #[test]
  fn test_decode_step_start_with_action() {
    let event = TaskEvent::decode(
      "step_start",
      concat!(
        r#"{"taskId":"t1","stepNumber":2,"#,
        r#""action":{"action":"Tap","target":"搜索框","description":"点击搜索框"}}"#,
      ),
    )
    .unwrap()
    .unwrap();

    let TaskEvent::StepStart(payload) = event else {
      panic!("expected step_start");
    };
    assert_eq!(payload.step_number, 2);
    let action = payload.action.unwrap();
    assert_eq!(action.action, ActionType::Tap);
    assert_eq!(action.target.as_deref(), Some("搜索框"));
  }

  #[test]
  fn test_decode_empty_payloads() {
    assert_eq!(
      TaskEvent::decode("task_start", "").unwrap(),
      Some(TaskEvent::TaskStart(TaskStartPayload::default()))
    );
    assert_eq!(
      TaskEvent::decode("task_complete", "{}").unwrap(),
      Some(TaskEvent::TaskComplete(TaskCompletePayload::default()))
    );
  }

  #[test]
  fn test_decode_unknown_event_is_ignored() {
    assert_eq!(TaskEvent::decode("heartbeat", "{}").unwrap(), None);
  }

  #[test]
  fn test_decode_missing_step_number_is_malformed() {
    let err = TaskEvent::decode("thinking", r#"{"thinking":"先打开应用"}"#).unwrap_err();
    assert!(matches!(err, DecodeError::Malformed { ref event, .. } if event == "thinking"));
  }

  #[test]
  fn test_decode_invalid_json_is_malformed() {
    let err = TaskEvent::decode("step_complete", "{oops").unwrap_err();
    assert!(matches!(err, DecodeError::Malformed { .. }));
  }

  #[test]
  fn test_decode_unstructured_error() {
    assert_eq!(
      TaskEvent::decode("error", "").unwrap_err(),
      DecodeError::UnstructuredError
    );
    assert_eq!(
      TaskEvent::decode("error", "connection reset").unwrap_err(),
      DecodeError::UnstructuredError
    );
  }

  #[test]
  fn test_decode_error_with_non_object_json() {
    for data in [r#""oops""#, "123", "true", "null", "[]"] {
      assert_eq!(
        TaskEvent::decode("error", data).unwrap(),
        Some(TaskEvent::Error(ErrorPayload::default())),
        "payload {}",
        data
      );
    }
  }

  #[test]
  fn test_decode_error_ignores_non_string_fields() {
    let event = TaskEvent::decode("error", r#"{"message":5,"error":"app not found"}"#)
      .unwrap()
      .unwrap();
    assert_eq!(
      event,
      TaskEvent::Error(ErrorPayload {
        message: None,
        error: Some("app not found".to_string()),
      })
    );
  }

  #[test]
  fn test_decode_structured_error() {
    let event = TaskEvent::decode("error", r#"{"error":"app not found"}"#)
      .unwrap()
      .unwrap();
    assert_eq!(
      event,
      TaskEvent::Error(ErrorPayload {
        message: None,
        error: Some("app not found".to_string()),
      })
    );
    assert_eq!(event.name(), "error");
    assert_eq!(event.step_number(), None);
  }
}

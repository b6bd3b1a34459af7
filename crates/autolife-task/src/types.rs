//! Task execution data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Status of a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  #[default]
  Idle,
  Running,
  Completed,
  Error,
}

impl TaskStatus {
  /// Whether no further transition is legal except a fresh start.
  pub fn is_terminal(self) -> bool {
    matches!(self, TaskStatus::Completed | TaskStatus::Error)
  }
}

/// Status of a single step within a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Pending,
  Running,
  Completed,
  Error,
}

impl StepStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, StepStatus::Completed | StepStatus::Error)
  }
}

/// Device action kinds the agent can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum ActionType {
  Launch,
  Tap,
  Type,
  Swipe,
  Back,
  Home,
  Wait,
  Scroll,
  LongPress,
  DoubleTap,
  Pinch,
  Screenshot,
  Unknown,
}

impl ActionType {
  /// Parse an action name, tolerating case, spaces and underscores
  /// (`"Long Press"`, `"long_press"` and `"LongPress"` are all `LongPress`).
  pub fn parse(name: &str) -> Self {
    let normalized: String = name
      .chars()
      .filter(|c| !matches!(c, ' ' | '_' | '-'))
      .flat_map(char::to_lowercase)
      .collect();

    match normalized.as_str() {
      "launch" => ActionType::Launch,
      "tap" => ActionType::Tap,
      "type" => ActionType::Type,
      "swipe" => ActionType::Swipe,
      "back" => ActionType::Back,
      "home" => ActionType::Home,
      "wait" => ActionType::Wait,
      "scroll" => ActionType::Scroll,
      "longpress" => ActionType::LongPress,
      "doubletap" => ActionType::DoubleTap,
      "pinch" => ActionType::Pinch,
      "screenshot" => ActionType::Screenshot,
      _ => ActionType::Unknown,
    }
  }
}

impl From<String> for ActionType {
  fn from(name: String) -> Self {
    ActionType::parse(&name)
  }
}

/// Direction of a swipe or scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
  Up,
  Down,
  Left,
  Right,
}

impl SwipeDirection {
  fn parse(name: &str) -> Option<Self> {
    match name.trim().to_ascii_lowercase().as_str() {
      "up" => Some(SwipeDirection::Up),
      "down" => Some(SwipeDirection::Down),
      "left" => Some(SwipeDirection::Left),
      "right" => Some(SwipeDirection::Right),
      _ => None,
    }
  }
}

/// Unrecognized directions are dropped instead of failing the whole action.
fn lenient_direction<'de, D>(deserializer: D) -> Result<Option<SwipeDirection>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = Option::<String>::deserialize(deserializer)?;
  Ok(raw.as_deref().and_then(SwipeDirection::parse))
}

/// A structured device action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDetail {
  pub action: ActionType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(
    default,
    deserialize_with = "lenient_direction",
    skip_serializing_if = "Option::is_none"
  )]
  pub direction: Option<SwipeDirection>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub app: Option<String>,
  #[serde(default)]
  pub description: String,
}

impl ActionDetail {
  /// A new action of the given kind with no detail fields.
  pub fn new(action: ActionType, description: impl Into<String>) -> Self {
    Self {
      action,
      target: None,
      text: None,
      direction: None,
      app: None,
      description: description.into(),
    }
  }

  /// Human-readable title, preferring the server-provided description.
  pub fn title(&self) -> String {
    if !self.description.trim().is_empty() {
      return self.description.clone();
    }

    let subject = self
      .app
      .as_deref()
      .or(self.target.as_deref())
      .or(self.text.as_deref());

    match (subject, self.direction) {
      (Some(subject), _) => format!("{:?} {}", self.action, subject),
      (None, Some(direction)) => format!("{:?} {:?}", self.action, direction),
      (None, None) => format!("{:?}", self.action),
    }
  }
}

/// One attempted device-automation action within a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
  pub step_number: u32,
  pub status: StepStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub thinking: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub action: Option<ActionDetail>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<String>,
  /// Base64-encoded screenshot taken when the step completed.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub screenshot: Option<String>,
  /// Step duration in milliseconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration: Option<u64>,
  /// Client-observed creation time.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
}

impl ExecutionStep {
  /// A freshly started step.
  pub fn started(step_number: u32, action: Option<ActionDetail>) -> Self {
    Self {
      step_number,
      status: StepStatus::Running,
      thinking: None,
      action,
      result: None,
      screenshot: None,
      duration: None,
      timestamp: Utc::now(),
    }
  }
}

/// The aggregate for one task run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecution {
  pub task_id: String,
  /// The natural-language instruction.
  pub task: String,
  pub status: TaskStatus,
  pub steps: Vec<ExecutionStep>,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub start_time: DateTime<Utc>,
  #[serde(
    default,
    with = "chrono::serde::ts_milliseconds_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub end_time: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub final_message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_report: Option<String>,
}

impl TaskExecution {
  /// A run that has just started.
  pub fn running(task_id: impl Into<String>, task: impl Into<String>) -> Self {
    Self {
      task_id: task_id.into(),
      task: task.into(),
      status: TaskStatus::Running,
      steps: Vec::new(),
      start_time: Utc::now(),
      end_time: None,
      final_message: None,
      error_message: None,
      task_report: None,
    }
  }

  /// Look up a step by its number.
  pub fn step(&self, step_number: u32) -> Option<&ExecutionStep> {
    self.steps.iter().find(|s| s.step_number == step_number)
  }

  pub(crate) fn step_mut(&mut self, step_number: u32) -> Option<&mut ExecutionStep> {
    self.steps.iter_mut().find(|s| s.step_number == step_number)
  }

  /// Wall-clock duration of a finished run in milliseconds.
  pub fn duration_ms(&self) -> Option<u64> {
    let end = self.end_time?;
    u64::try_from((end - self.start_time).num_milliseconds()).ok()
  }
}

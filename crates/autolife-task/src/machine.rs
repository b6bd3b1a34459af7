//! The task state machine.
//!
//! ```text
//! idle ──start──► running ──task_complete──────────────► completed
//!                    │
//!                    ├──error / transport failure─────► error
//!                    └──task_cancelled / cancel()─────► error (cancelled)
//! ```
//!
//! Every terminal transition is guarded on `status == running`, so whichever
//! terminal input arrives first wins and later ones are no-ops.

use chrono::Utc;
use tracing::{debug, warn};

use crate::event::{
  ActionPayload, StepCompletePayload, StepStartPayload, TaskCompletePayload, TaskEvent,
  ThinkingPayload,
};
use crate::types::{ExecutionStep, StepStatus, TaskExecution, TaskStatus};

/// Final message used when `task_complete` carries neither `message` nor `result`.
pub const COMPLETED_MESSAGE: &str = "任务已完成";
/// Error message used when an `error` event carries neither `message` nor `error`.
pub const FAILED_MESSAGE: &str = "任务执行失败";
/// Error message for a run cancelled by either side.
pub const CANCELLED_MESSAGE: &str = "任务已取消";
/// Error message for a transport failure.
pub const CONNECTION_LOST_MESSAGE: &str = "连接中断";

/// The effect of applying one input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  /// The input was informational, buffered or rejected.
  Unchanged,
  /// The run was updated but is still running.
  Updated,
  /// The run completed successfully.
  Completed,
  /// The run failed. `cancelled` distinguishes cancellation from errors.
  Failed { cancelled: bool },
}

impl Transition {
  pub fn is_terminal(self) -> bool {
    matches!(self, Transition::Completed | Transition::Failed { .. })
  }
}

/// Folds an ordered event sequence into a [`TaskExecution`].
#[derive(Debug, Clone, Default)]
pub struct TaskStateMachine {
  execution: TaskExecution,
  /// Report delivered by `task_result`, held until the run completes.
  pending_report: Option<String>,
}

impl TaskStateMachine {
  /// Begin a new run in the `running` state.
  pub fn start(task_id: impl Into<String>, task: impl Into<String>) -> Self {
    Self {
      execution: TaskExecution::running(task_id, task),
      pending_report: None,
    }
  }

  /// The current state of the run.
  pub fn execution(&self) -> &TaskExecution {
    &self.execution
  }

  /// Consume the machine, returning the run.
  pub fn into_execution(self) -> TaskExecution {
    self.execution
  }

  pub fn status(&self) -> TaskStatus {
    self.execution.status
  }

  pub fn is_running(&self) -> bool {
    self.execution.status == TaskStatus::Running
  }

  pub fn is_terminal(&self) -> bool {
    self.execution.status.is_terminal()
  }

  /// Apply one decoded stream event.
  pub fn apply(&mut self, event: TaskEvent) -> Transition {
    if let TaskEvent::TaskStart(payload) = &event {
      debug!(
        task_id = %self.execution.task_id,
        server_task_id = ?payload.task_id,
        "task started on server"
      );
      return Transition::Unchanged;
    }

    if !self.is_running() {
      debug!(
        task_id = %self.execution.task_id,
        event = event.name(),
        status = ?self.execution.status,
        "ignoring event for a run that is not running"
      );
      return Transition::Unchanged;
    }

    match event {
      TaskEvent::TaskStart(_) => Transition::Unchanged,
      TaskEvent::StepStart(payload) => self.start_step(payload),
      TaskEvent::Thinking(payload) => self.set_thinking(payload),
      TaskEvent::Action(payload) => self.set_action(payload),
      TaskEvent::StepComplete(payload) => self.complete_step(payload),
      TaskEvent::TaskResult(payload) => {
        if let Some(report) = payload.report {
          debug!(task_id = %self.execution.task_id, "buffering task report");
          self.pending_report = Some(report);
        }
        Transition::Unchanged
      }
      TaskEvent::TaskComplete(payload) => self.complete(payload),
      TaskEvent::TaskCancelled(payload) => {
        let message = first_non_empty([payload.message]).unwrap_or(CANCELLED_MESSAGE.to_string());
        self.fail(message, true)
      }
      TaskEvent::Error(payload) => {
        let message =
          first_non_empty([payload.message, payload.error]).unwrap_or(FAILED_MESSAGE.to_string());
        self.fail(message, false)
      }
    }
  }

  /// The channel itself failed or closed before a terminal event.
  pub fn fail_transport(&mut self) -> Transition {
    if !self.is_running() {
      return Transition::Unchanged;
    }
    self.fail(CONNECTION_LOST_MESSAGE.to_string(), false)
  }

  /// The client cancelled the run.
  pub fn cancel_locally(&mut self) -> Transition {
    if !self.is_running() {
      return Transition::Unchanged;
    }
    self.fail(CANCELLED_MESSAGE.to_string(), true)
  }

  fn start_step(&mut self, payload: StepStartPayload) -> Transition {
    let last = self.execution.steps.last().map(|s| s.step_number);
    if last.is_some_and(|last| payload.step_number <= last) {
      warn!(
        task_id = %self.execution.task_id,
        step_number = payload.step_number,
        last_step = ?last,
        "dropping out-of-order step_start"
      );
      return Transition::Unchanged;
    }

    self
      .execution
      .steps
      .push(ExecutionStep::started(payload.step_number, payload.action));
    Transition::Updated
  }

  fn set_thinking(&mut self, payload: ThinkingPayload) -> Transition {
    let task_id = self.execution.task_id.clone();
    let Some(step) = self.step_mut(payload.step_number) else {
      return Transition::Unchanged;
    };
    if step.thinking.is_some() {
      debug!(%task_id, step_number = payload.step_number, "thinking already set");
      return Transition::Unchanged;
    }
    step.thinking = Some(payload.thinking);
    Transition::Updated
  }

  fn set_action(&mut self, payload: ActionPayload) -> Transition {
    let Some(step) = self.step_mut(payload.step_number) else {
      return Transition::Unchanged;
    };
    step.action = Some(payload.action);
    Transition::Updated
  }

  fn complete_step(&mut self, payload: StepCompletePayload) -> Transition {
    let task_id = self.execution.task_id.clone();
    let Some(step) = self.step_mut(payload.step_number) else {
      return Transition::Unchanged;
    };
    if step.status.is_terminal() {
      warn!(
        %task_id,
        step_number = payload.step_number,
        status = ?step.status,
        "dropping step_complete for a finished step"
      );
      return Transition::Unchanged;
    }

    step.status = StepStatus::Completed;
    step.result = payload.result;
    step.screenshot = payload.screenshot;
    step.duration = payload.duration;
    Transition::Updated
  }

  fn complete(&mut self, payload: TaskCompletePayload) -> Transition {
    let message =
      first_non_empty([payload.message, payload.result]).unwrap_or(COMPLETED_MESSAGE.to_string());

    self.execution.status = TaskStatus::Completed;
    self.execution.end_time = Some(Utc::now());
    self.execution.final_message = Some(message);
    self.execution.task_report = self.pending_report.take();
    Transition::Completed
  }

  fn fail(&mut self, message: String, cancelled: bool) -> Transition {
    self.execution.status = TaskStatus::Error;
    self.execution.end_time = Some(Utc::now());
    self.execution.error_message = Some(message);
    self.pending_report = None;

    for step in &mut self.execution.steps {
      if step.status == StepStatus::Running {
        step.status = StepStatus::Error;
      }
    }
    Transition::Failed { cancelled }
  }

  fn step_mut(&mut self, step_number: u32) -> Option<&mut ExecutionStep> {
    let task_id = self.execution.task_id.clone();
    let step = self.execution.step_mut(step_number);
    if step.is_none() {
      debug!(%task_id, step_number, "event for unknown step dropped");
    }
    step
  }
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
  candidates.into_iter().flatten().find(|s| !s.is_empty())
}

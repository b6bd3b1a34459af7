//! The task stream controller.
//!
//! Owns at most one open channel at a time. Each `start` bumps a run
//! generation and hands the pump task its own [`CancellationToken`]; frames
//! delivered by a superseded pump are discarded under the lock before they
//! can touch the new run.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use autolife_activity::{activity_from_task, should_create_activity};
use autolife_store::{ConsoleStore, NewMessage};
use autolife_task::{
  DecodeError, TaskEvent, TaskExecution, TaskStateMachine, TaskStatus, Transition,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::TransportError;
use crate::sse::SseFrame;
use crate::transport::AgentTransport;

/// Chat message appended when the channel drops before a terminal event.
pub const CONNECTION_LOST_CHAT_MESSAGE: &str = "❌ 连接中断，请检查网络后重试";

const FAILURE_PREFIX: &str = "❌ ";

/// Why a run reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
  /// A terminal event from the server or a local cancel.
  Settled(Transition),
  /// The transport failed or closed early.
  ConnectionLost,
}

/// The run currently owned by the controller.
#[derive(Debug)]
struct Run {
  generation: u64,
  machine: TaskStateMachine,
  cancel: CancellationToken,
  attached: bool,
}

#[derive(Debug, Default)]
struct Shared {
  next_generation: u64,
  run: Option<Run>,
  pump: Option<JoinHandle<()>>,
}

struct Inner {
  transport: Arc<dyn AgentTransport>,
  store: Arc<dyn ConsoleStore>,
  shared: Mutex<Shared>,
}

/// Drives one task run at a time from an [`AgentTransport`] into a
/// [`ConsoleStore`].
///
/// Terminal side effects (chat message, archived run, activity record) happen
/// exactly once per run, whichever terminal input arrives first.
#[derive(Clone)]
pub struct TaskStreamController {
  inner: Arc<Inner>,
}

impl TaskStreamController {
  pub fn new(transport: Arc<dyn AgentTransport>, store: Arc<dyn ConsoleStore>) -> Self {
    Self {
      inner: Arc::new(Inner {
        transport,
        store,
        shared: Mutex::new(Shared::default()),
      }),
    }
  }

  /// Start a run, closing any channel that is still open.
  ///
  /// Must be called from within a tokio runtime. Events are pumped on a
  /// spawned task; use [`wait_idle`](Self::wait_idle) to await it.
  pub fn start(&self, task_id: impl Into<String>, text: impl Into<String>) {
    let task_id = task_id.into();
    let text = text.into();

    let mut shared = self.inner.lock();
    self.inner.detach_current(&mut shared);

    shared.next_generation += 1;
    let generation = shared.next_generation;
    let cancel = CancellationToken::new();
    let machine = TaskStateMachine::start(task_id.clone(), text.clone());

    info!(%task_id, generation, "starting task run");
    self.inner.store.publish_task(Some(machine.execution().clone()));
    self.inner.store.set_stream_attached(true);

    shared.run = Some(Run {
      generation,
      machine,
      cancel: cancel.clone(),
      attached: true,
    });

    let span = info_span!("task_run", task_id = %task_id, generation);
    let inner = Arc::clone(&self.inner);
    let pump = tokio::spawn(inner.pump(generation, task_id, text, cancel).instrument(span));
    shared.pump = Some(pump);
  }

  /// Cancel the current run.
  ///
  /// Local state is settled and cleared immediately. The backend is then
  /// notified on a best-effort basis; a failed notification is logged. Does
  /// nothing when there is no run.
  pub async fn cancel(&self) {
    let notify = {
      let mut shared = self.inner.lock();
      let Some(mut run) = shared.run.take() else {
        debug!("cancel requested with no task run");
        return;
      };

      let task_id = run.machine.execution().task_id.clone();
      let transition = run.machine.cancel_locally();
      if transition.is_terminal() {
        info!(%task_id, "task run cancelled locally");
        self.inner.finish(run.machine.execution(), Outcome::Settled(transition));
      }

      run.cancel.cancel();
      if run.attached {
        self.inner.store.set_stream_attached(false);
      }
      self.inner.store.publish_task(None);

      transition.is_terminal().then_some(task_id)
    };

    if let Some(task_id) = notify
      && let Err(e) = self.inner.transport.cancel_task(&task_id).await
    {
      warn!(%task_id, error = %e, "failed to notify backend of cancellation");
    }
  }

  /// Close the channel without changing the run's state.
  pub fn stop(&self) {
    let mut shared = self.inner.lock();
    self.inner.detach_current(&mut shared);
  }

  /// Wait for the most recently started pump to exit.
  pub async fn wait_idle(&self) {
    let pump = self.inner.lock().pump.take();
    if let Some(pump) = pump
      && let Err(e) = pump.await
    {
      warn!(error = %e, "task stream pump did not exit cleanly");
    }
  }

  /// Snapshot of the run owned by the controller, if any.
  pub fn current_task(&self) -> Option<TaskExecution> {
    self
      .inner
      .lock()
      .run
      .as_ref()
      .map(|run| run.machine.execution().clone())
  }

  pub fn is_running(&self) -> bool {
    self
      .inner
      .lock()
      .run
      .as_ref()
      .is_some_and(|run| run.machine.is_running())
  }

  /// Whether a channel is currently open.
  pub fn is_attached(&self) -> bool {
    self
      .inner
      .lock()
      .run
      .as_ref()
      .is_some_and(|run| run.attached)
  }
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, Shared> {
    self.shared.lock().unwrap_or_else(PoisonError::into_inner)
  }

  async fn pump(
    self: Arc<Self>,
    generation: u64,
    task_id: String,
    text: String,
    cancel: CancellationToken,
  ) {
    let opened = tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        debug!("task run closed before the stream opened");
        return;
      }
      opened = self.transport.open_stream(&task_id, &text) => opened,
    };

    let mut stream = match opened {
      Ok(stream) => stream,
      Err(e) => {
        self.connection_lost(generation, &e);
        return;
      }
    };

    loop {
      let next = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          debug!("task stream closed");
          break;
        }
        next = stream.next() => next,
      };

      let open = match next {
        Some(Ok(frame)) => self.handle_frame(generation, frame),
        Some(Err(e)) => {
          self.connection_lost(generation, &e);
          false
        }
        None => {
          let e = TransportError::Interrupted {
            message: "stream ended before a terminal event".to_string(),
          };
          self.connection_lost(generation, &e);
          false
        }
      };
      if !open {
        break;
      }
    }

    let mut shared = self.lock();
    self.detach(&mut shared, generation);
  }

  /// Apply one frame. Returns whether the channel should stay open.
  fn handle_frame(&self, generation: u64, frame: SseFrame) -> bool {
    let mut shared = self.lock();
    let Some(run) = shared.run.as_mut().filter(|run| run.generation == generation) else {
      debug!(event = %frame.event, "dropping frame from a superseded run");
      return false;
    };

    let event = match TaskEvent::decode(&frame.event, &frame.data) {
      Ok(Some(event)) => event,
      Ok(None) => {
        debug!(event = %frame.event, "ignoring unknown event");
        return true;
      }
      Err(DecodeError::UnstructuredError) => {
        drop(shared);
        let e = TransportError::Interrupted {
          message: "unstructured error event".to_string(),
        };
        self.connection_lost(generation, &e);
        return false;
      }
      Err(e) => {
        warn!(event = %frame.event, error = %e, "dropping malformed event");
        return true;
      }
    };

    debug!(event = event.name(), step_number = ?event.step_number(), "applying event");
    let transition = run.machine.apply(event);
    match transition {
      Transition::Unchanged => true,
      Transition::Updated => {
        self.store.publish_task(Some(run.machine.execution().clone()));
        true
      }
      Transition::Completed | Transition::Failed { .. } => {
        let execution = run.machine.execution().clone();
        self.finish(&execution, Outcome::Settled(transition));
        self.detach(&mut shared, generation);
        false
      }
    }
  }

  fn connection_lost(&self, generation: u64, error: &TransportError) {
    let mut shared = self.lock();
    let Some(run) = shared.run.as_mut().filter(|run| run.generation == generation) else {
      return;
    };

    if run.machine.fail_transport().is_terminal() {
      warn!(error = %error, "task stream interrupted");
      let execution = run.machine.execution().clone();
      self.finish(&execution, Outcome::ConnectionLost);
    }
    self.detach(&mut shared, generation);
  }

  /// Terminal side effects. Called once per run, with the shared lock held.
  fn finish(&self, execution: &TaskExecution, outcome: Outcome) {
    self.store.publish_task(Some(execution.clone()));
    self.store.archive_task(execution.clone());

    match outcome {
      Outcome::Settled(Transition::Completed) => {
        info!(task_id = %execution.task_id, steps = execution.steps.len(), "task run completed");
        let content = execution.final_message.clone().unwrap_or_default();
        self.store.append_message(
          NewMessage::assistant(content)
            .with_steps(execution.steps.clone())
            .with_task_status(TaskStatus::Completed),
        );

        if should_create_activity(execution) {
          let record = self.store.record_activity(activity_from_task(execution));
          info!(
            task_id = %execution.task_id,
            activity_id = %record.id,
            category = record.category.as_str(),
            "activity recorded"
          );
        }
      }
      Outcome::Settled(_) => {
        let error = execution.error_message.as_deref().unwrap_or_default();
        info!(task_id = %execution.task_id, %error, "task run failed");
        self
          .store
          .append_message(NewMessage::assistant(format!("{FAILURE_PREFIX}{error}")));
      }
      Outcome::ConnectionLost => {
        self
          .store
          .append_message(NewMessage::assistant(CONNECTION_LOST_CHAT_MESSAGE));
      }
    }
  }

  fn detach_current(&self, shared: &mut Shared) {
    if let Some(generation) = shared.run.as_ref().map(|run| run.generation) {
      self.detach(shared, generation);
    }
  }

  /// Close the channel for `generation` if it is still the open one.
  fn detach(&self, shared: &mut Shared, generation: u64) {
    let Some(run) = shared.run.as_mut().filter(|run| run.generation == generation) else {
      return;
    };
    run.cancel.cancel();
    if run.attached {
      run.attached = false;
      self.store.set_stream_attached(false);
    }
  }
}

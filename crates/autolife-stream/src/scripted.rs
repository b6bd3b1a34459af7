//! A transport that replays scripted frames.
//!
//! Used for tests and for offline demo runs of the console.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use crate::error::TransportError;
use crate::sse::SseFrame;
use crate::transport::{AgentTransport, EventStream};

/// One step of a scripted stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
  /// Emit a frame.
  Frame(SseFrame),
  /// Sleep before the next step.
  Pause(Duration),
  /// End the stream with a transport error.
  Fail(String),
  /// Never produce anything again.
  Hold,
}

impl ScriptStep {
  /// A frame with a JSON payload.
  pub fn event(name: &str, data: serde_json::Value) -> Self {
    ScriptStep::Frame(SseFrame::new(name, data.to_string()))
  }

  /// A frame with a raw, possibly malformed, payload.
  pub fn raw(name: &str, data: &str) -> Self {
    ScriptStep::Frame(SseFrame::new(name, data))
  }

  pub fn pause_ms(ms: u64) -> Self {
    ScriptStep::Pause(Duration::from_millis(ms))
  }
}

/// A stream that was opened through a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedStream {
  pub task_id: String,
  pub text: String,
}

#[derive(Debug, Default)]
struct Recorded {
  scripts: VecDeque<Vec<ScriptStep>>,
  opened: Vec<OpenedStream>,
  cancelled: Vec<String>,
}

/// Replays one queued script per opened stream, in order.
///
/// Opening a stream with no script left fails with
/// [`TransportError::Interrupted`].
#[derive(Debug, Default)]
pub struct ScriptedTransport {
  recorded: Mutex<Recorded>,
  fail_cancel: bool,
}

impl ScriptedTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// A transport whose single script is `steps`.
  pub fn with_script(steps: Vec<ScriptStep>) -> Self {
    let transport = Self::new();
    transport.push_script(steps);
    transport
  }

  /// Make every cancellation request fail.
  pub fn failing_cancel(mut self) -> Self {
    self.fail_cancel = true;
    self
  }

  /// Queue a script for the next opened stream.
  pub fn push_script(&self, steps: Vec<ScriptStep>) {
    self.lock().scripts.push_back(steps);
  }

  /// Streams opened so far.
  pub fn opened(&self) -> Vec<OpenedStream> {
    self.lock().opened.clone()
  }

  /// Task ids for which cancellation was requested.
  pub fn cancelled(&self) -> Vec<String> {
    self.lock().cancelled.clone()
  }

  fn lock(&self) -> MutexGuard<'_, Recorded> {
    self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
  async fn open_stream(&self, task_id: &str, text: &str) -> Result<EventStream, TransportError> {
    let script = {
      let mut recorded = self.lock();
      recorded.opened.push(OpenedStream {
        task_id: task_id.to_string(),
        text: text.to_string(),
      });
      recorded.scripts.pop_front()
    };

    let Some(script) = script else {
      return Err(TransportError::Interrupted {
        message: format!("no script queued for task {}", task_id),
      });
    };

    let frames = stream::unfold(script.into_iter(), |mut steps| async move {
      loop {
        match steps.next()? {
          ScriptStep::Frame(frame) => return Some((Ok(frame), steps)),
          ScriptStep::Pause(duration) => tokio::time::sleep(duration).await,
          ScriptStep::Fail(message) => {
            return Some((Err(TransportError::Interrupted { message }), steps));
          }
          ScriptStep::Hold => futures::future::pending::<()>().await,
        }
      }
    });
    Ok(Box::pin(frames))
  }

  async fn cancel_task(&self, task_id: &str) -> Result<(), TransportError> {
    self.lock().cancelled.push(task_id.to_string());
    if self.fail_cancel {
      return Err(TransportError::Interrupted {
        message: "cancel endpoint unreachable".to_string(),
      });
    }
    Ok(())
  }
}

/// A canned run: send a WeChat message to a contact in five steps.
pub fn demo_script(task_id: &str) -> Vec<ScriptStep> {
  use serde_json::json;

  let steps = [
    (
      "我需要打开微信应用来发送消息",
      json!({"action": "Launch", "app": "微信", "description": "打开微信应用"}),
      "成功打开微信",
      1200,
    ),
    (
      "我需要找到联系人\"张三\"",
      json!({"action": "Tap", "target": "通讯录", "description": "点击通讯录"}),
      "进入通讯录",
      800,
    ),
    (
      "在搜索框中输入\"张三\"",
      json!({
        "action": "Type",
        "target": "搜索框",
        "text": "张三",
        "description": "输入联系人姓名"
      }),
      "找到联系人张三",
      600,
    ),
    (
      "点击搜索结果中的\"张三\"",
      json!({"action": "Tap", "target": "张三", "description": "点击联系人"}),
      "打开聊天窗口",
      700,
    ),
    (
      "输入消息并发送",
      json!({"action": "Type", "target": "输入框", "text": "你好", "description": "发送消息"}),
      "消息已发送",
      900,
    ),
  ];

  let mut script = vec![ScriptStep::event("task_start", json!({"taskId": task_id}))];
  for (index, (thinking, action, result, duration)) in steps.into_iter().enumerate() {
    let step_number = index + 1;
    script.extend([
      ScriptStep::pause_ms(300),
      ScriptStep::event("step_start", json!({"stepNumber": step_number})),
      ScriptStep::pause_ms(300),
      ScriptStep::event("thinking", json!({"stepNumber": step_number, "thinking": thinking})),
      ScriptStep::event("action", json!({"stepNumber": step_number, "action": action})),
      ScriptStep::pause_ms(400),
      ScriptStep::event(
        "step_complete",
        json!({"stepNumber": step_number, "result": result, "duration": duration}),
      ),
    ]);
  }
  script.extend([
    ScriptStep::event("task_result", json!({"report": "已通过微信向张三发送消息：你好"})),
    ScriptStep::event(
      "task_complete",
      json!({"taskId": task_id, "message": "已成功给张三发送微信消息"}),
    ),
  ]);
  script
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::StreamExt;

  #[tokio::test]
  async fn test_replays_frames_then_ends() {
    let transport = ScriptedTransport::with_script(vec![
      ScriptStep::raw("task_start", "{}"),
      ScriptStep::pause_ms(1),
      ScriptStep::raw("task_complete", "{}"),
    ]);

    let frames: Vec<_> = transport.open_stream("t1", "x").await.unwrap().collect().await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].as_ref().unwrap().event, "task_complete");
    assert_eq!(
      transport.opened(),
      vec![OpenedStream {
        task_id: "t1".to_string(),
        text: "x".to_string(),
      }]
    );
  }

  #[tokio::test]
  async fn test_fail_step_yields_error() {
    let transport = ScriptedTransport::with_script(vec![ScriptStep::Fail("reset".to_string())]);
    let mut frames = transport.open_stream("t1", "x").await.unwrap();
    assert!(matches!(
      frames.next().await,
      Some(Err(TransportError::Interrupted { .. }))
    ));
  }

  #[tokio::test]
  async fn test_open_without_script_fails() {
    let transport = ScriptedTransport::new();
    assert!(transport.open_stream("t1", "x").await.is_err());
    assert_eq!(transport.opened().len(), 1);
  }

  #[tokio::test]
  async fn test_cancel_is_recorded_even_when_failing() {
    let transport = ScriptedTransport::new().failing_cancel();
    assert!(transport.cancel_task("t1").await.is_err());
    assert_eq!(transport.cancelled(), vec!["t1".to_string()]);
  }

  #[test]
  fn test_demo_script_is_well_formed() {
    let script = demo_script("task_demo");
    let frames: Vec<&SseFrame> = script
      .iter()
      .filter_map(|step| match step {
        ScriptStep::Frame(frame) => Some(frame),
        _ => None,
      })
      .collect();

    assert_eq!(frames.first().unwrap().event, "task_start");
    assert_eq!(frames.last().unwrap().event, "task_complete");
    for frame in frames {
      assert!(
        autolife_task::TaskEvent::decode(&frame.event, &frame.data)
          .unwrap()
          .is_some()
      );
    }
  }
}

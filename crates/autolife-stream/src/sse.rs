//! Incremental `text/event-stream` decoding.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

/// Event name used when a frame has no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
  pub event: String,
  pub data: String,
  pub id: Option<String>,
}

impl SseFrame {
  pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
    Self {
      event: event.into(),
      data: data.into(),
      id: None,
    }
  }
}

/// Line-oriented SSE parser fed with arbitrary byte chunks.
///
/// Lines end with CRLF, LF or a lone CR. Bytes are buffered until a line's
/// terminator arrives, so multi-byte UTF-8 characters split across chunks
/// decode correctly. A trailing CR is held back until the next byte shows
/// whether it starts a CRLF pair. The buffer holds at most one unterminated
/// line and is not capped; a server that never ends a line grows it until the
/// connection closes.
#[derive(Debug, Default)]
pub struct SseDecoder {
  buffer: Vec<u8>,
  started: bool,
  event: Option<String>,
  data: String,
  has_data: bool,
  last_event_id: Option<String>,
  retry: Option<Duration>,
}

impl SseDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reconnection delay most recently requested by the server.
  pub fn retry(&self) -> Option<Duration> {
    self.retry
  }

  pub fn last_event_id(&self) -> Option<&str> {
    self.last_event_id.as_deref()
  }

  /// Feed a chunk, returning every frame it completes.
  pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
    self.buffer.extend_from_slice(chunk);

    let mut frames = Vec::new();
    while let Some(end) = self.buffer.iter().position(|b| matches!(b, b'\r' | b'\n')) {
      let terminator = match &self.buffer[end..] {
        [b'\r'] => break,
        [b'\r', b'\n', ..] => 2,
        _ => 1,
      };
      let mut line: Vec<u8> = self.buffer.drain(..end + terminator).collect();
      line.truncate(end);

      let mut line = String::from_utf8_lossy(&line).into_owned();
      if !self.started {
        self.started = true;
        if let Some(stripped) = line.strip_prefix('\u{feff}') {
          line = stripped.to_string();
        }
      }

      if let Some(frame) = self.process_line(&line) {
        frames.push(frame);
      }
    }
    frames
  }

  fn process_line(&mut self, line: &str) -> Option<SseFrame> {
    if line.is_empty() {
      return self.dispatch();
    }
    if line.starts_with(':') {
      return None;
    }

    let (field, value) = match line.split_once(':') {
      Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
      None => (line, ""),
    };

    match field {
      "event" => self.event = Some(value.to_string()),
      "data" => {
        if self.has_data {
          self.data.push('\n');
        }
        self.data.push_str(value);
        self.has_data = true;
      }
      "id" => {
        if !value.contains('\0') {
          self.last_event_id = Some(value.to_string());
        }
      }
      "retry" => {
        if let Ok(ms) = value.parse::<u64>() {
          self.retry = Some(Duration::from_millis(ms));
        }
      }
      _ => {}
    }
    None
  }

  fn dispatch(&mut self) -> Option<SseFrame> {
    let event = self.event.take();
    if !self.has_data {
      return None;
    }
    self.has_data = false;

    Some(SseFrame {
      event: event
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
      data: std::mem::take(&mut self.data),
      id: self.last_event_id.clone(),
    })
  }
}

/// Adapt a byte stream into a stream of frames.
///
/// A byte-stream error is forwarded and ends the frame stream. A trailing
/// frame without its terminating blank line is discarded.
pub fn decode_stream<S, E>(inner: S) -> impl Stream<Item = Result<SseFrame, E>> + Send
where
  S: Stream<Item = Result<Bytes, E>> + Send + 'static,
  E: Send + 'static,
{
  let state = (Box::pin(inner), SseDecoder::new(), VecDeque::new(), false);

  stream::unfold(
    state,
    |(mut inner, mut decoder, mut pending, mut done)| async move {
      loop {
        if let Some(frame) = pending.pop_front() {
          return Some((Ok(frame), (inner, decoder, pending, done)));
        }
        if done {
          return None;
        }
        match inner.next().await {
          Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
          Some(Err(e)) => {
            done = true;
            return Some((Err(e), (inner, decoder, pending, done)));
          }
          None => return None,
        }
      }
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_named_event() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.push(b"event: step_start\ndata: {\"stepNumber\":1}\n\n");

    assert_eq!(frames, vec![SseFrame::new("step_start", "{\"stepNumber\":1}")]);
  }

  #[test]
  fn test_default_event_name_and_multiline_data() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.push(b"data: first\ndata:second\n\n");

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, DEFAULT_EVENT);
    assert_eq!(frames[0].data, "first\nsecond");
  }

  #[test]
  fn test_crlf_and_comments() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.push(b": keep-alive\r\nevent: task_start\r\ndata: {}\r\n\r\n");

    assert_eq!(frames, vec![SseFrame::new("task_start", "{}")]);
  }

  #[test]
  fn test_lone_cr_ends_a_line() {
    let mut decoder = SseDecoder::new();
    let mut frames = decoder.push(b"event: task_start\rdata: {}\r\r");
    frames.extend(decoder.push(b"event: step_start\rdata: 1\r\r: ok\r"));

    assert_eq!(
      frames,
      vec![SseFrame::new("task_start", "{}"), SseFrame::new("step_start", "1")]
    );
  }

  #[test]
  fn test_crlf_split_across_chunks() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"data: a\r").is_empty());
    assert!(decoder.push(b"\n\r").is_empty());
    let frames = decoder.push(b"\n");

    // The split CRLF pairs count as one line end each, not two.
    assert_eq!(frames, vec![SseFrame::new(DEFAULT_EVENT, "a")]);
    assert_eq!(decoder.push(b"data: b\n\n"), vec![SseFrame::new(DEFAULT_EVENT, "b")]);
  }

  #[test]
  fn test_chunk_boundaries_inside_utf8() {
    let payload = "event: thinking\ndata: {\"thinking\":\"打开微信\"}\n\n".as_bytes();
    let mut decoder = SseDecoder::new();
    let mut frames = Vec::new();
    for chunk in payload.chunks(3) {
      frames.extend(decoder.push(chunk));
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, "{\"thinking\":\"打开微信\"}");
  }

  #[test]
  fn test_event_without_data_is_not_dispatched() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"event: task_start\n\n").is_empty());
    // The event name does not leak into the next frame.
    let frames = decoder.push(b"data: x\n\n");
    assert_eq!(frames[0].event, DEFAULT_EVENT);
  }

  #[test]
  fn test_id_and_retry_fields() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.push(b"id: 42\nretry: 3000\nevent: action\ndata: {}\n\nretry: soon\n");

    assert_eq!(frames[0].id.as_deref(), Some("42"));
    assert_eq!(decoder.last_event_id(), Some("42"));
    assert_eq!(decoder.retry(), Some(Duration::from_millis(3000)));
  }

  #[test]
  fn test_leading_bom_is_ignored() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.push("\u{feff}event: task_start\ndata: {}\n\n".as_bytes());
    assert_eq!(frames[0].event, "task_start");
  }

  #[test]
  fn test_incomplete_frame_waits_for_blank_line() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"event: task_complete\ndata: {}").is_empty());
    assert!(decoder.push(b"\n").is_empty());
    assert_eq!(decoder.push(b"\n").len(), 1);
  }

  #[tokio::test]
  async fn test_decode_stream_forwards_errors() {
    let chunks: Vec<Result<Bytes, String>> = vec![
      Ok(Bytes::from_static(b"event: step_start\ndata: {\"stepNumber\":1}\n")),
      Ok(Bytes::from_static(b"\nevent: step_start\ndata: {\"stepNumber\":2}\n\n")),
      Err("reset".to_string()),
      Ok(Bytes::from_static(b"event: never\ndata: {}\n\n")),
    ];

    let items: Vec<_> = decode_stream(stream::iter(chunks)).collect().await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap().data, "{\"stepNumber\":1}");
    assert_eq!(items[1].as_ref().unwrap().data, "{\"stepNumber\":2}");
    assert_eq!(items[2].as_ref().unwrap_err(), "reset");
  }
}

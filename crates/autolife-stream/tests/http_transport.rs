//! Integration tests for HttpTransport against a minimal local HTTP server.

use std::sync::Arc;

use autolife_config::ConsoleConfig;
use autolife_store::MemoryStore;
use autolife_stream::{AgentTransport, HttpTransport, TaskStreamController, TransportError};
use autolife_task::TaskStatus;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve exactly one request with a canned response.
///
/// Resolves to the raw request (head and body) once the response is written.
async fn serve_once(response: String) -> (ConsoleConfig, oneshot::Receiver<String>) {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let (tx, rx) = oneshot::channel();

  tokio::spawn(async move {
    let (mut socket, _) = listener.accept().await.unwrap();
    let request = read_request(&mut socket).await;
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.unwrap();
    let _ = tx.send(request);
  });

  let config = ConsoleConfig {
    api_base_url: format!("http://{}/api", addr),
    health_url: format!("http://{}/health", addr),
    ..ConsoleConfig::default()
  };
  (config, rx)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 1024];
  loop {
    let n = socket.read(&mut chunk).await.unwrap();
    if n == 0 {
      break;
    }
    buf.extend_from_slice(&chunk[..n]);

    let text = String::from_utf8_lossy(&buf);
    if let Some(head_end) = text.find("\r\n\r\n") {
      let content_length = text[..head_end]
        .lines()
        .find_map(|line| {
          let (name, value) = line.split_once(':')?;
          name
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);
      if buf.len() >= head_end + 4 + content_length {
        break;
      }
    }
  }
  String::from_utf8_lossy(&buf).into_owned()
}

fn sse_response(body: &str) -> String {
  format!(
    concat!(
      "HTTP/1.1 200 OK\r\n",
      "Content-Type: text/event-stream\r\n",
      "Cache-Control: no-cache\r\n",
      "Connection: close\r\n\r\n{}",
    ),
    body
  )
}

fn plain_response(status: &str, content_type: &str, body: &str) -> String {
  format!(
    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
    status,
    content_type,
    body.len(),
    body
  )
}

#[tokio::test]
async fn test_stream_request_and_frames() {
  let body = concat!(
    ": connected\n\n",
    "event: task_start\ndata: {\"taskId\":\"t1\"}\n\n",
    "event: step_start\r\ndata: {\"stepNumber\":1}\r\n\r\n",
    "event: task_complete\ndata: {\"message\":\"好了\"}\n\n",
  );
  let (config, request) = serve_once(sse_response(body)).await;
  let transport = HttpTransport::new(&config).unwrap();

  let frames: Vec<_> = transport
    .open_stream("t1", "帮我点外卖")
    .await
    .unwrap()
    .collect()
    .await;
  let events: Vec<String> = frames
    .into_iter()
    .map(|frame| frame.unwrap().event)
    .collect();
  assert_eq!(events, vec!["task_start", "step_start", "task_complete"]);

  let request = request.await.unwrap();
  assert!(
    request.starts_with("GET /api/agent/stream?taskId=t1&text=%E5%B8%AE"),
    "unexpected request: {}",
    request
  );
  assert!(request.to_ascii_lowercase().contains("accept: text/event-stream"));
}

#[tokio::test]
async fn test_cancel_posts_task_id() {
  let (config, request) = serve_once(plain_response("200 OK", "application/json", "{}")).await;
  let transport = HttpTransport::new(&config).unwrap();

  transport.cancel_task("t1").await.unwrap();

  let request = request.await.unwrap();
  assert!(request.starts_with("POST /api/agent/cancel"));
  assert!(request.ends_with(r#"{"taskId":"t1"}"#));
}

#[tokio::test]
async fn test_error_status_is_rejected() {
  let (config, _request) =
    serve_once(plain_response("500 Internal Server Error", "text/plain", "boom")).await;
  let transport = HttpTransport::new(&config).unwrap();

  let err = transport.open_stream("t1", "x").await.err().unwrap();
  assert!(matches!(err, TransportError::Status { status: 500 }));
}

#[tokio::test]
async fn test_wrong_content_type_is_rejected() {
  let (config, _request) = serve_once(plain_response("200 OK", "application/json", "{}")).await;
  let transport = HttpTransport::new(&config).unwrap();

  let err = transport.open_stream("t1", "x").await.err().unwrap();
  assert!(matches!(err, TransportError::ContentType { .. }));
}

#[tokio::test]
async fn test_health_check() {
  let (config, request) = serve_once(plain_response("200 OK", "text/plain", "ok")).await;
  let transport = HttpTransport::new(&config).unwrap();

  assert!(transport.health_check().await);
  assert!(request.await.unwrap().starts_with("GET /health"));
}

#[tokio::test]
async fn test_health_check_unreachable() {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  drop(listener);

  let config = ConsoleConfig {
    health_url: format!("http://{}/health", addr),
    ..ConsoleConfig::default()
  };
  let transport = HttpTransport::new(&config).unwrap();
  assert!(!transport.health_check().await);
}

#[tokio::test]
async fn test_controller_over_http() {
  let body = concat!(
    "event: step_start\n",
    "data: {\"stepNumber\":1,\"action\":{\"action\":\"Launch\",\"app\":\"美团\"}}\n\n",
    "event: thinking\ndata: {\"stepNumber\":1,\"thinking\":\"打开美团\"}\n\n",
    "event: step_complete\ndata: {\"stepNumber\":1,\"result\":\"ok\",\"duration\":1200}\n\n",
    "event: task_result\ndata: {\"report\":\"已下单\"}\n\n",
    "event: task_complete\ndata: {\"result\":\"外卖已下单\"}\n\n",
  );
  let (config, _request) = serve_once(sse_response(body)).await;
  let store = Arc::new(MemoryStore::new());
  let transport = Arc::new(HttpTransport::new(&config).unwrap());
  let controller = TaskStreamController::new(transport, store.clone());

  controller.start("t1", "帮我点外卖");
  controller.wait_idle().await;

  let task = store.current_task().unwrap();
  assert_eq!(task.status, TaskStatus::Completed);
  assert_eq!(task.final_message.as_deref(), Some("外卖已下单"));
  assert_eq!(task.task_report.as_deref(), Some("已下单"));
  assert_eq!(task.steps[0].thinking.as_deref(), Some("打开美团"));
  assert_eq!(task.steps[0].duration, Some(1200));
  assert_eq!(store.activities().len(), 1);
  assert_eq!(store.messages().len(), 1);
}

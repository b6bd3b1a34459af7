//! The transport seam and its HTTP implementation.

use std::pin::Pin;

use async_trait::async_trait;
use autolife_config::ConsoleConfig;
use futures::{Stream, TryStreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::error::TransportError;
use crate::sse::{SseFrame, decode_stream};

/// A stream of decoded server-sent frames for one task.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseFrame, TransportError>> + Send>>;

/// Connection to the agent backend.
///
/// Implement this trait to feed the task stream controller from somewhere
/// other than HTTP (tests, recorded sessions, an in-process agent).
#[async_trait]
pub trait AgentTransport: Send + Sync {
  /// Open the event stream for a task.
  async fn open_stream(&self, task_id: &str, text: &str) -> Result<EventStream, TransportError>;

  /// Ask the backend to stop a task.
  async fn cancel_task(&self, task_id: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelRequest<'a> {
  task_id: &'a str,
}

/// Talks to the agent backend over HTTP and server-sent events.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: Client,
  stream_url: Url,
  cancel_url: Url,
  health_url: Url,
}

impl HttpTransport {
  /// Create a transport with a client built from the config.
  pub fn new(config: &ConsoleConfig) -> Result<Self, TransportError> {
    let client = Client::builder()
      .connect_timeout(config.connect_timeout())
      .build()?;
    Self::with_client(config, client)
  }

  /// Create a transport with a pre-configured `reqwest::Client`.
  pub fn with_client(config: &ConsoleConfig, client: Client) -> Result<Self, TransportError> {
    Ok(Self {
      client,
      stream_url: config.stream_url()?,
      cancel_url: config.cancel_url()?,
      health_url: config.health_endpoint()?,
    })
  }

  /// The stream URL for a task, with `taskId` and `text` URL-encoded.
  pub fn stream_request_url(&self, task_id: &str, text: &str) -> Url {
    let mut url = self.stream_url.clone();
    url
      .query_pairs_mut()
      .append_pair("taskId", task_id)
      .append_pair("text", text);
    url
  }

  /// Probe the backend health endpoint.
  pub async fn health_check(&self) -> bool {
    match self.client.get(self.health_url.clone()).send().await {
      Ok(response) => response.status().is_success(),
      Err(e) => {
        debug!(error = %e, url = %self.health_url, "health check failed");
        false
      }
    }
  }
}

#[async_trait]
impl AgentTransport for HttpTransport {
  #[instrument(name = "stream_open", skip_all, fields(task_id = %task_id))]
  async fn open_stream(&self, task_id: &str, text: &str) -> Result<EventStream, TransportError> {
    let url = self.stream_request_url(task_id, text);
    debug!(%url, "opening task stream");

    let response = self
      .client
      .get(url)
      .header(ACCEPT, "text/event-stream")
      .header(CACHE_CONTROL, "no-cache")
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(TransportError::Status {
        status: status.as_u16(),
      });
    }

    let content_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .unwrap_or("")
      .to_string();
    if !content_type.starts_with("text/event-stream") {
      return Err(TransportError::ContentType { content_type });
    }

    let bytes = response.bytes_stream().map_err(TransportError::from);
    Ok(Box::pin(decode_stream(bytes)))
  }

  #[instrument(name = "stream_cancel", skip_all, fields(task_id = %task_id))]
  async fn cancel_task(&self, task_id: &str) -> Result<(), TransportError> {
    let response = self
      .client
      .post(self.cancel_url.clone())
      .json(&CancelRequest { task_id })
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(TransportError::Status {
        status: status.as_u16(),
      });
    }
    Ok(())
  }
}

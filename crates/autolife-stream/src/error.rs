//! Transport errors.

use autolife_config::ConfigError;

/// Errors raised by a task stream transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  /// The HTTP request could not be sent or the body could not be read.
  #[error("http error: {0}")]
  Request(#[from] reqwest::Error),

  /// The server answered with a non-success status.
  #[error("server returned HTTP {status}")]
  Status { status: u16 },

  /// The stream endpoint did not answer with `text/event-stream`.
  #[error("unexpected content type '{content_type}', expected text/event-stream")]
  ContentType { content_type: String },

  /// Endpoint configuration is invalid.
  #[error("invalid transport configuration: {0}")]
  Config(#[from] ConfigError),

  /// The channel was interrupted by something other than an HTTP error.
  #[error("stream interrupted: {message}")]
  Interrupted { message: String },
}

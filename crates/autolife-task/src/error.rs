//! Event decoding errors.

/// Errors that can occur while decoding a named stream event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
  /// The payload of a named event is not valid JSON for that event.
  #[error("malformed '{event}' payload: {message}")]
  Malformed { event: String, message: String },

  /// An `error` event arrived without a JSON payload.
  ///
  /// This is how a broken connection surfaces on some transports, so callers
  /// treat it as a transport-level failure rather than a server error.
  #[error("error event carried no structured payload")]
  UnstructuredError,
}

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Connection settings for the agent backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ConsoleConfig {
  /// Base URL of the agent API, e.g. `http://localhost:8000/api`.
  pub api_base_url: String,
  /// Path of the task event stream, relative to `api_base_url`.
  pub stream_path: String,
  /// Path of the cancellation endpoint, relative to `api_base_url`.
  pub cancel_path: String,
  /// Absolute URL of the backend health probe.
  pub health_url: String,
  /// Timeout for establishing the stream connection.
  pub connect_timeout_ms: u64,
}

impl Default for ConsoleConfig {
  fn default() -> Self {
    Self {
      api_base_url: "http://localhost:8000/api".to_string(),
      stream_path: "agent/stream".to_string(),
      cancel_path: "agent/cancel".to_string(),
      health_url: "http://localhost:8000/health".to_string(),
      connect_timeout_ms: 10_000,
    }
  }
}

impl ConsoleConfig {
  /// Parse a config from a JSON document.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::Parse {
      message: e.to_string(),
    })
  }

  /// Load a config from a JSON file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&content)
  }

  /// Load a config from a JSON file, using defaults if the file does not exist.
  pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    if path.exists() {
      Self::load(path)
    } else {
      Ok(Self::default())
    }
  }

  /// Override the API base URL (builder style).
  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.api_base_url = base_url.into();
    self
  }

  /// Full URL of the task event stream, without query parameters.
  pub fn stream_url(&self) -> Result<Url, ConfigError> {
    parse_url(&join_url(&self.api_base_url, &self.stream_path))
  }

  /// Full URL of the cancellation endpoint.
  pub fn cancel_url(&self) -> Result<Url, ConfigError> {
    parse_url(&join_url(&self.api_base_url, &self.cancel_path))
  }

  /// Full URL of the health probe.
  pub fn health_endpoint(&self) -> Result<Url, ConfigError> {
    parse_url(&self.health_url)
  }

  /// Connect timeout as a `Duration`.
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }
}

fn join_url(base: &str, path: &str) -> String {
  format!(
    "{}/{}",
    base.trim_end_matches('/'),
    path.trim_start_matches('/')
  )
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
  Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
    url: raw.to_string(),
    message: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults_point_at_local_backend() {
    let config = ConsoleConfig::default();
    assert_eq!(
      config.stream_url().unwrap().as_str(),
      "http://localhost:8000/api/agent/stream"
    );
    assert_eq!(
      config.cancel_url().unwrap().as_str(),
      "http://localhost:8000/api/agent/cancel"
    );
  }

  #[test]
  fn test_partial_json_keeps_defaults() {
    let config = ConsoleConfig::from_json(r#"{"api_base_url": "http://agent.lan:9000/api/"}"#)
      .expect("partial config should parse");

    assert_eq!(config.api_base_url, "http://agent.lan:9000/api/");
    assert_eq!(config.stream_path, "agent/stream");
    assert_eq!(config.connect_timeout_ms, 10_000);
    assert_eq!(
      config.stream_url().unwrap().as_str(),
      "http://agent.lan:9000/api/agent/stream"
    );
  }

  #[test]
  fn test_join_url_single_slash() {
    assert_eq!(join_url("http://h/api/", "/agent/cancel"), "http://h/api/agent/cancel");
    assert_eq!(join_url("http://h/api", "agent/cancel"), "http://h/api/agent/cancel");
  }

  #[test]
  fn test_invalid_json_is_parse_error() {
    let err = ConsoleConfig::from_json("{not json").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }

  #[test]
  fn test_invalid_base_url() {
    let config = ConsoleConfig::default().with_base_url("not a url");
    let err = config.stream_url().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidUrl { .. }));
  }

  #[test]
  fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"cancel_path": "tasks/cancel", "connect_timeout_ms": 500}}"#).unwrap();

    let config = ConsoleConfig::load(file.path()).unwrap();
    assert_eq!(config.cancel_path, "tasks/cancel");
    assert_eq!(config.connect_timeout(), Duration::from_millis(500));
  }

  #[test]
  fn test_load_or_default_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConsoleConfig::load_or_default(dir.path().join("missing.json")).unwrap();
    assert_eq!(config, ConsoleConfig::default());
  }

  #[test]
  fn test_load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConsoleConfig::load(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
  }
}

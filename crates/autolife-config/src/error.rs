use std::path::PathBuf;

/// Errors that can occur while loading console configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// The config file could not be read.
  #[error("failed to read config file {path}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The config file is not valid JSON for `ConsoleConfig`.
  #[error("invalid config: {message}")]
  Parse { message: String },

  /// A configured URL could not be parsed.
  #[error("invalid url '{url}': {message}")]
  InvalidUrl { url: String, message: String },
}

//! Autolife Config
//!
//! This crate contains the serializable configuration for the autolife console:
//! where the agent backend lives and how the task stream is reached.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `--config=config.json`)
//! - Built-in defaults matching the development backend on `localhost:8000`
//!
//! Every field is optional in the file; missing fields fall back to defaults.

mod console;
mod error;

pub use console::ConsoleConfig;
pub use error::ConfigError;

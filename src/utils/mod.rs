//! Configuration loading and shared helpers for remote calls.

pub mod deadline;
pub mod retry;
pub mod toml_config;

pub use deadline::with_deadline;
pub use retry::RetryPolicy;
pub use toml_config::{ConfigError, FolioConfig};

use std::path::PathBuf;

use thiserror::Error;

/// Problems with the configuration file. Always fatal: no updater runs.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("configuration file {0} not found")]
  NotFound(PathBuf),
  #[error("could not read configuration file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("could not parse configuration: {0}")]
  Parse(#[from] serde_yaml::Error),
  #[error("configuration must be a mapping from updater name to settings")]
  NotAMapping,
  #[error("configuration section '{updater}' is invalid: {reason}")]
  InvalidSection { updater: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
  #[error("unknown updater '{name}', available: {}", .available.join(", "))]
  NotFound { name: String, available: Vec<String> },
}

/// Everything that can go wrong inside a single updater run.
/// These never leave the updater; they are logged and turned into a skip.
#[derive(Debug, Error)]
pub enum UpdateError {
  #[error("configuration: {0}")]
  Config(String),
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("unexpected response: {0}")]
  Parse(String),
  #[error("source reported an error: {0}")]
  Source(String),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("YAML error: {0}")]
  Yaml(#[from] serde_yaml::Error),
  #[error("external command failed: {0}")]
  Command(String),
}

impl From<serde_json::Error> for UpdateError {
  fn from(error: serde_json::Error) -> Self {
    Self::Parse(error.to_string())
  }
}

#[derive(Debug, Error)]
pub enum DispatchError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Registry(#[from] RegistryError),
}

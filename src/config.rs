//! The `config.yml` file: one section per updater, each a flat mapping of
//! scalar settings.
//!
//! ```yaml
//! scholar:
//!   user_id: "ABC123"
//!   output_file: "data/scholar_citations.yml"
//! ```
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{ConfigError, UpdateError};

pub const DEFAULT_CONFIG_FILEPATH: &str = "config.yml";

/// The settings of a single updater, as written in the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSlice {
  values: BTreeMap<String, Value>,
}

impl ConfigSlice {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder used mostly by tests and standalone callers.
  pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
    self.values.insert(key.to_string(), value.into());
    self
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.values.get(key)
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Convert the loose mapping into an updater's typed settings record.
  /// Missing required fields surface as `UpdateError::Config`.
  pub fn settings<T: DeserializeOwned>(&self) -> Result<T, UpdateError> {
    let mapping: Mapping = self
      .values
      .iter()
      .map(|(key, value)| (Value::String(key.clone()), value.clone()))
      .collect();
    serde_yaml::from_value(Value::Mapping(mapping)).map_err(|e| UpdateError::Config(e.to_string()))
  }
}

/// The whole configuration file, loaded once per run and never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
  sections: BTreeMap<String, ConfigSlice>,
}

impl Config {
  pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| match source.kind() {
      ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
      _ => ConfigError::Io {
        path: path.to_path_buf(),
        source,
      },
    })?;
    Config::from_yaml_str(&contents)
  }

  pub fn from_yaml_str(contents: &str) -> Result<Config, ConfigError> {
    let root = match serde_yaml::from_str::<Value>(contents)? {
      Value::Null => return Ok(Config::default()),
      Value::Mapping(root) => root,
      _ => return Err(ConfigError::NotAMapping),
    };

    let mut sections = BTreeMap::new();
    for (key, value) in root {
      let updater = match key {
        Value::String(name) => name,
        other => {
          return Err(ConfigError::InvalidSection {
            updater: format!("{:?}", other),
            reason: "section names must be strings".to_string(),
          })
        }
      };
      let slice = parse_section(&updater, value)?;
      sections.insert(updater, slice);
    }
    Ok(Config { sections })
  }

  /// The slice for `name`, or an empty one if the file has no such section.
  pub fn slice(&self, name: &str) -> ConfigSlice {
    self.sections.get(name).cloned().unwrap_or_default()
  }

  pub fn section_names(&self) -> impl Iterator<Item = &str> {
    self.sections.keys().map(String::as_str)
  }
}

/// `deserialize_with` helper for identifiers that people write either quoted
/// or bare (`mid: 494163254` and `mid: "494163254"` mean the same thing).
pub fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  match Value::deserialize(deserializer)? {
    Value::String(value) => Ok(value),
    Value::Number(value) => Ok(value.to_string()),
    Value::Bool(value) => Ok(value.to_string()),
    _ => Err(de::Error::custom("expected a string or a number")),
  }
}

fn parse_section(updater: &str, value: Value) -> Result<ConfigSlice, ConfigError> {
  let invalid = |reason: String| ConfigError::InvalidSection {
    updater: updater.to_string(),
    reason,
  };
  let mapping = match value {
    // `scholar:` with nothing under it
    Value::Null => return Ok(ConfigSlice::default()),
    Value::Mapping(mapping) => mapping,
    _ => return Err(invalid("expected a mapping of settings".to_string())),
  };

  let mut values = BTreeMap::new();
  for (key, value) in mapping {
    let key = match key {
      Value::String(key) => key,
      other => return Err(invalid(format!("setting names must be strings, found {:?}", other))),
    };
    match value {
      Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
        values.insert(key, value);
      }
      _ => return Err(invalid(format!("setting '{}' must be a scalar", key))),
    }
  }
  Ok(ConfigSlice { values })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Deserialize)]
  struct Settings {
    #[serde(deserialize_with = "scalar_string")]
    user_id: String,
    #[serde(default = "default_output")]
    output_file: String,
  }

  fn default_output() -> String {
    "data/out.yml".to_string()
  }

  #[test]
  fn loads_sections_and_defaults_missing_ones_to_empty() {
    let config = Config::from_yaml_str(
      "scholar:\n  user_id: ABC123\n  output_file: data/s.yml\nbilibili:\n  mid: 494163254\n",
    )
    .unwrap();

    let scholar = config.slice("scholar");
    assert_eq!(scholar.get("user_id"), Some(&Value::from("ABC123")));
    assert!(config.slice("youtube").is_empty());
    assert_eq!(config.section_names().collect::<Vec<_>>(), vec!["bilibili", "scholar"]);
  }

  #[test]
  fn empty_file_is_an_empty_config() {
    assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
  }

  #[test]
  fn bare_section_is_an_empty_slice() {
    let config = Config::from_yaml_str("youtube:\n").unwrap();
    assert!(config.slice("youtube").is_empty());
  }

  #[test]
  fn rejects_nested_settings() {
    let error = Config::from_yaml_str("scholar:\n  user_id:\n    nested: 1\n").unwrap_err();
    assert!(matches!(error, ConfigError::InvalidSection { ref updater, .. } if updater == "scholar"));
  }

  #[test]
  fn rejects_non_mapping_root() {
    assert!(matches!(Config::from_yaml_str("- a\n- b\n"), Err(ConfigError::NotAMapping)));
  }

  #[test]
  fn malformed_yaml_is_a_parse_error() {
    assert!(matches!(Config::from_yaml_str("scholar: [unclosed"), Err(ConfigError::Parse(_))));
  }

  #[test]
  fn missing_file_is_reported_by_path() {
    let error = Config::load("/definitely/not/here/config.yml").unwrap_err();
    assert!(matches!(error, ConfigError::NotFound(_)));
  }

  #[test]
  fn typed_settings_apply_defaults_and_require_fields() {
    let slice = ConfigSlice::new().with("user_id", "ABC123");
    let settings: Settings = slice.settings().unwrap();
    assert_eq!(settings.user_id, "ABC123");
    assert_eq!(settings.output_file, "data/out.yml");

    let missing = ConfigSlice::new().settings::<Settings>().unwrap_err();
    assert!(matches!(missing, UpdateError::Config(ref message) if message.contains("user_id")));
  }

  #[test]
  fn numeric_identifiers_read_as_strings() {
    let config = Config::from_yaml_str("scholar:\n  user_id: 494163254\n").unwrap();
    let settings: Settings = config.slice("scholar").settings().unwrap();
    assert_eq!(settings.user_id, "494163254");
  }
}

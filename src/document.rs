//! Output documents: one YAML file per updater, `metadata` first, then a
//! keyed collection of items. Every successful run rewrites the file whole.
use std::fs;
use std::path::Path;

use chrono::{Local, NaiveDate};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::Value;

use crate::error::UpdateError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Source of "today", swappable so tests can pin the date.
pub type Clock = fn() -> NaiveDate;

pub fn local_today() -> NaiveDate {
  Local::now().date_naive()
}

/// Serialize `document` and overwrite `path`, creating parent directories.
pub fn write<T: Serialize>(path: &Path, document: &T) -> Result<(), UpdateError> {
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent)?;
    }
  }
  let yaml = serde_yaml::to_string(document)?;
  fs::write(path, yaml)?;
  Ok(())
}

/// The previous document at `path`, if there is one and it still parses.
/// A document that does not parse is treated as absent.
pub fn read_existing<T: DeserializeOwned>(path: &Path) -> Option<T> {
  if !path.exists() {
    return None;
  }
  let parsed = fs::read_to_string(path)
    .map_err(UpdateError::from)
    .and_then(|contents| serde_yaml::from_str(&contents).map_err(UpdateError::from));
  match parsed {
    Ok(document) => Some(document),
    Err(e) => {
      warn!("could not read existing data in {}: {}", path.display(), e);
      None
    }
  }
}

/// `metadata.last_updated` of the document at `path`.
pub fn read_last_updated(path: &Path) -> Option<NaiveDate> {
  let document: Value = read_existing(path)?;
  let last_updated = document.get("metadata")?.get("last_updated")?.as_str()?;
  NaiveDate::parse_from_str(last_updated, DATE_FORMAT).ok()
}

/// Whether the document at `path` was already written on `today`.
pub fn is_fresh(path: &Path, today: NaiveDate) -> bool {
  read_last_updated(path) == Some(today)
}

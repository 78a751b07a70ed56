//! The concrete updaters. Each one owns exactly one external source and one
//! output document, and turns every failure into a logged skip.
use log::error;

use crate::error::UpdateError;

pub mod bilibili;
pub mod scholar;
pub mod youtube;

/// Collapse an updater's internal result into the `bool` the dispatcher sees.
pub(crate) fn settle(name: &str, result: Result<bool, UpdateError>) -> bool {
  match result {
    Ok(updated) => updated,
    Err(e) => {
      error!("{}: {}", name, e);
      false
    }
  }
}

/// First `max` characters of `text`, for log lines.
pub(crate) fn shorten(text: &str, max: usize) -> String {
  let mut short: String = text.chars().take(max).collect();
  if short.len() < text.len() {
    short.push_str("...");
  }
  short
}

use once_cell::sync::Lazy;

use crate::config::ConfigSlice;
use crate::error::RegistryError;
use crate::updaters::{bilibili::BilibiliUpdater, scholar::ScholarUpdater, youtube::YoutubeUpdater};

/// A self-contained routine that fetches one external source and rewrites
/// one output document.
///
/// Returns `true` when the document was written, `false` when the updater
/// skipped (already fresh, misconfigured, source unavailable, ...). Failures
/// are logged by the updater itself and never returned.
pub trait Updater: Send + Sync {
  fn update(&self, slice: &ConfigSlice) -> bool;
}

impl<F> Updater for F
where
  F: Fn(&ConfigSlice) -> bool + Send + Sync,
{
  fn update(&self, slice: &ConfigSlice) -> bool {
    self(slice)
  }
}

struct Entry {
  name: &'static str,
  updater: Box<dyn Updater>,
}

/// Static mapping from updater name to implementation, in registration order.
#[derive(Default)]
pub struct Registry {
  entries: Vec<Entry>,
}

static BUILTIN: Lazy<Registry> = Lazy::new(|| {
  Registry::new()
    .register("scholar", ScholarUpdater::default())
    .register("bilibili", BilibiliUpdater::default())
    .register("youtube", YoutubeUpdater::default())
});

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// The updaters this binary ships with; built once per process.
  pub fn builtin() -> &'static Registry {
    &BUILTIN
  }

  /// Panics on a duplicate name: two updaters sharing an identifier is a
  /// programming error, not something to recover from.
  pub fn register(mut self, name: &'static str, updater: impl Updater + 'static) -> Self {
    assert!(!self.contains(name), "updater '{}' registered twice", name);
    self.entries.push(Entry {
      name,
      updater: Box::new(updater),
    });
    self
  }

  pub fn lookup(&self, name: &str) -> Result<&dyn Updater, RegistryError> {
    self
      .entries
      .iter()
      .find(|entry| entry.name == name)
      .map(|entry| entry.updater.as_ref())
      .ok_or_else(|| RegistryError::NotFound {
        name: name.to_string(),
        available: self.names().map(str::to_string).collect(),
      })
  }

  pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.entries.iter().map(|entry| entry.name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.entries.iter().any(|entry| entry.name == name)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

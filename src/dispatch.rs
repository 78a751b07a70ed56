use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use log::{error, info, warn};

use crate::config::Config;
use crate::error::DispatchError;
use crate::registry::{Registry, Updater};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
  /// The output document was rewritten.
  Updated,
  /// The updater returned `false`: nothing to do, or a failure it handled.
  Skipped,
  /// The updater panicked; the dispatcher caught it and moved on.
  Errored,
}

impl fmt::Display for UpdateStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      UpdateStatus::Updated => write!(f, "OK"),
      UpdateStatus::Skipped => write!(f, "SKIPPED/FAILED"),
      UpdateStatus::Errored => write!(f, "ERROR"),
    }
  }
}

/// Per-updater outcome of one run, in the order the updaters ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
  results: Vec<(String, UpdateStatus)>,
}

impl RunReport {
  pub fn get(&self, name: &str) -> Option<UpdateStatus> {
    self
      .results
      .iter()
      .find(|(ran, _)| ran == name)
      .map(|(_, status)| *status)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.results.iter().map(|(name, _)| name.as_str())
  }

  pub fn len(&self) -> usize {
    self.results.len()
  }

  pub fn is_empty(&self) -> bool {
    self.results.is_empty()
  }

  /// True when at least one updater ran and every one of them panicked.
  pub fn all_errored(&self) -> bool {
    !self.results.is_empty()
      && self
        .results
        .iter()
        .all(|(_, status)| *status == UpdateStatus::Errored)
  }

  /// Skips count as success; only a run where everything blew up does not.
  pub fn is_success(&self) -> bool {
    !self.all_errored()
  }

  pub fn summary_lines(&self) -> Vec<String> {
    self
      .results
      .iter()
      .map(|(name, status)| format!("  {}: {}", name, status))
      .collect()
  }
}

pub struct Dispatcher<'a> {
  registry: &'a Registry,
  config: &'a Config,
}

impl<'a> Dispatcher<'a> {
  pub fn new(registry: &'a Registry, config: &'a Config) -> Self {
    Dispatcher { registry, config }
  }

  /// Run every registered updater, or only `requested` (in the given order,
  /// duplicates collapsed). All requested names are validated before any
  /// updater starts, so an unknown name means nothing runs.
  pub fn run(&self, requested: Option<&[String]>) -> Result<RunReport, DispatchError> {
    let selected: Vec<(&str, &dyn Updater)> = match requested {
      None | Some([]) => self
        .registry
        .names()
        .map(|name| self.registry.lookup(name).map(|updater| (name, updater)))
        .collect::<Result<_, _>>()?,
      Some(names) => {
        let mut selected: Vec<(&str, &dyn Updater)> = Vec::with_capacity(names.len());
        for name in names {
          let updater = self.registry.lookup(name)?;
          if !selected.iter().any(|(seen, _)| *seen == name.as_str()) {
            selected.push((name.as_str(), updater));
          }
        }
        selected
      }
    };

    for section in self.config.section_names() {
      if !self.registry.contains(section) {
        warn!("config.yml has a section for unknown updater '{}', ignoring it", section);
      }
    }

    let mut report = RunReport::default();
    for (name, updater) in selected {
      let status = self.run_one(name, updater);
      report.results.push((name.to_string(), status));
    }
    Ok(report)
  }

  fn run_one(&self, name: &str, updater: &dyn Updater) -> UpdateStatus {
    let slice = self.config.slice(name);
    if slice.is_empty() {
      warn!("no settings for '{}' in the configuration", name);
    }

    info!("{}", "=".repeat(50));
    info!("Running: {}", name);
    info!("{}", "=".repeat(50));

    match panic::catch_unwind(AssertUnwindSafe(|| updater.update(&slice))) {
      Ok(true) => UpdateStatus::Updated,
      Ok(false) => UpdateStatus::Skipped,
      Err(payload) => {
        let reason = payload
          .downcast_ref::<&str>()
          .map(|s| s.to_string())
          .or_else(|| payload.downcast_ref::<String>().cloned())
          .unwrap_or_else(|| "unknown panic".to_string());
        error!("updater '{}' crashed: {}", name, reason);
        UpdateStatus::Errored
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  use super::*;
  use crate::config::ConfigSlice;
  use crate::error::RegistryError;

  struct Counting {
    calls: Arc<AtomicUsize>,
    result: bool,
  }

  impl Updater for Counting {
    fn update(&self, _slice: &ConfigSlice) -> bool {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.result
    }
  }

  fn counting(result: bool) -> (Counting, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
      Counting {
        calls: calls.clone(),
        result,
      },
      calls,
    )
  }

  #[test]
  fn empty_request_runs_everything_once() {
    let (a, a_calls) = counting(true);
    let (b, b_calls) = counting(false);
    let registry = Registry::new().register("a", a).register("b", b);
    let config = Config::default();

    let report = Dispatcher::new(&registry, &config).run(None).unwrap();

    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.names().collect::<Vec<_>>(), registry.names().collect::<Vec<_>>());
    assert_eq!(report.get("a"), Some(UpdateStatus::Updated));
    assert_eq!(report.get("b"), Some(UpdateStatus::Skipped));
    assert!(report.is_success());
  }

  #[test]
  fn single_request_runs_only_that_updater() {
    let (a, a_calls) = counting(true);
    let (b, b_calls) = counting(true);
    let registry = Registry::new().register("a", a).register("b", b);
    let config = Config::default();

    let requested = vec!["b".to_string(), "b".to_string()];
    let report = Dispatcher::new(&registry, &config)
      .run(Some(requested.as_slice()))
      .unwrap();

    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.len(), 1);
  }

  #[test]
  fn unknown_name_fails_before_anything_runs() {
    let (a, a_calls) = counting(true);
    let registry = Registry::new().register("a", a);
    let config = Config::default();

    let requested = vec!["a".to_string(), "nonexistent".to_string()];
    let error = Dispatcher::new(&registry, &config)
      .run(Some(requested.as_slice()))
      .unwrap_err();

    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    match error {
      DispatchError::Registry(RegistryError::NotFound { name, available }) => {
        assert_eq!(name, "nonexistent");
        assert_eq!(available, vec!["a".to_string()]);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn panicking_updater_does_not_stop_the_run() {
    let (b, b_calls) = counting(true);
    let registry = Registry::new()
      .register("boom", |_: &ConfigSlice| -> bool { panic!("source exploded") })
      .register("b", b);
    let config = Config::default();

    let report = Dispatcher::new(&registry, &config).run(None).unwrap();

    assert_eq!(report.get("boom"), Some(UpdateStatus::Errored));
    assert_eq!(report.get("b"), Some(UpdateStatus::Updated));
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert!(report.is_success());
  }

  #[test]
  fn run_fails_only_when_every_updater_errored() {
    let registry = Registry::new()
      .register("boom", |_: &ConfigSlice| -> bool { panic!("first") })
      .register("bang", |_: &ConfigSlice| -> bool { panic!("second") });
    let config = Config::default();

    let report = Dispatcher::new(&registry, &config).run(None).unwrap();
    assert!(report.all_errored());
    assert!(!report.is_success());
  }

  #[test]
  fn updater_receives_its_own_slice() {
    let registry = Registry::new().register("a", |slice: &ConfigSlice| {
      slice.get("user_id").and_then(|v| v.as_str()) == Some("ABC123")
    });
    let config = Config::from_yaml_str("a:\n  user_id: ABC123\nb:\n  user_id: other\n").unwrap();

    let report = Dispatcher::new(&registry, &config).run(None).unwrap();
    assert_eq!(report.get("a"), Some(UpdateStatus::Updated));
  }

  #[test]
  fn summary_lines_name_each_status() {
    let registry = Registry::new()
      .register("a", |_: &ConfigSlice| true)
      .register("b", |_: &ConfigSlice| false);
    let config = Config::default();

    let report = Dispatcher::new(&registry, &config).run(None).unwrap();
    assert_eq!(report.summary_lines(), vec!["  a: OK", "  b: SKIPPED/FAILED"]);
  }
}

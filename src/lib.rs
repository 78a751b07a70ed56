//! Daily data updaters: each registered updater fetches one external source
//! and rewrites one YAML document. `bin/run_updaters.rs` is the entry point
//! a daily cron job calls.
pub mod config;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod http;
pub mod registry;
pub mod updaters;

pub use config::{Config, ConfigSlice};
pub use dispatch::{Dispatcher, RunReport, UpdateStatus};
pub use error::{ConfigError, DispatchError, RegistryError, UpdateError};
pub use registry::{Registry, Updater};

//! scriptrun - named script runner
//!
//! Runs shell commands and interpreter files declared in `scripts.yml` by
//! name, alone or in parallel/sequential groups, with an optional watch mode
//! that restarts the script when its files change.

pub mod app;
pub mod command;
pub mod config;
pub mod core;
pub mod env;
pub mod error;
pub mod init;
pub mod report;

// Re-exports
pub use app::App;
pub use command::{CommandAssembler, ScriptPlan};
pub use config::{Catalog, Config, ConcurrentGroup, GroupMode, ScriptDefinition, ScriptTarget};
pub use core::{Coordinator, RunResult, Supervisor, WatchSpec, Watcher};
pub use error::{ConfigError, SpawnError, WatcherError};
pub use report::Reporter;

/// Result type alias
pub type Result<T> = anyhow::Result<T>;

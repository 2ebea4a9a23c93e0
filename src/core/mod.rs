//! Core engine - file watching, process supervision, group coordination

mod coordinator;
mod format;
mod process;
mod supervisor;
mod watcher;

#[cfg(test)]
pub(crate) mod fake;

pub use coordinator::{Coordinator, PARALLEL_FAILURE_CODE};
pub use format::{Formatter, FORMAT_SETTLE_DELAY};
pub use process::{ChildProcess, Invocation, NativeChild, NativeHost, ProcessHost, RunResult};
pub use supervisor::{Execution, Supervisor, WatchLoop};
pub use watcher::{
    ChangeBatch, ChangeKind, FileChangeEvent, FilesystemEventSource, NotifySource, RawEvent,
    Subscription, WatchFilter, WatchItem, WatchSpec, Watcher, DEFAULT_INTERVAL_MS, VCS_SKIP_GLOB,
};

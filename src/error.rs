//! Error types for configuration, spawning and watching

use std::path::PathBuf;
use thiserror::Error;

/// Problems found before anything is spawned
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("script \"{0}\" not found!")]
    UnknownScript(String),

    #[error("group \"{group}\" references unknown script \"{member}\"")]
    UnknownMember { group: String, member: String },

    #[error(
        "You can't repeat group names with script names, and {0} exists in both"
    )]
    NamespaceCollision(String),

    #[error("Specify at least 1 script for {0}")]
    EmptyGroup(String),

    #[error("group \"{group}\" lists \"{member}\" more than once")]
    DuplicateMember { group: String, member: String },

    #[error("script \"{0}\" must define exactly one of `run` or `file`")]
    AmbiguousTarget(String),

    #[error("File {} not found!", .0.display())]
    MissingFile(PathBuf),

    #[error("script \"{0}\" resolves to an empty command")]
    EmptyCommand(String),

    #[error("invalid glob \"{pattern}\": {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("watch interval must be greater than zero")]
    ZeroInterval,

    #[error("failed to read env file {}: {source}", .path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// A child process could not be started
#[derive(Debug, Error)]
#[error("failed to spawn `{program}`: {source}")]
pub struct SpawnError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// The filesystem event source reported a problem with a watched root
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("failed to watch {}: {message}", .path.display())]
    Subscribe { path: PathBuf, message: String },

    #[error("watch source error: {0}")]
    Source(String),
}

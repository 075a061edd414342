//! Error types for the runtime crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while setting up or driving a monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A configured ready or error pattern did not compile.
    #[error("invalid log pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The server command could not be spawned.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// No tokio runtime is available to drive background work.
    #[error("no async runtime available")]
    NoRuntime,

    /// The branch directory could not be created.
    #[error("branch directory error: {0}")]
    BranchDir(#[from] std::io::Error),
}

/// Errors reported by an HTTP probe.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// No response within the timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or protocol failure.
    #[error("{0}")]
    Request(String),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

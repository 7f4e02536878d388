use thiserror::Error;

/// Errors surfaced by executors and reporters.
///
/// Failures of the system under test are never errors here: they are data,
/// recorded in the metrics an action returns.
#[derive(Debug, Error)]
pub enum Error {
    /// A background task (governor or stop timer) could not be joined.
    #[error("executor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// Writing a report to its sink failed.
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    /// A report could not be serialized.
    #[cfg(feature = "builtins")]
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

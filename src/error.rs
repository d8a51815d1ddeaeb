//! Error types for backend supervision.

use std::path::PathBuf;

/// Errors that can occur while starting the agent backend.
///
/// All of these are fatal to the current start attempt but never to the
/// host: the supervisor converts them into a boolean result plus a log
/// entry at its public boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend entry-point script does not exist on disk.
    #[error("backend entry point not found: {path}")]
    ScriptNotFound {
        /// The path that was checked.
        path: PathBuf,
    },

    /// The OS failed to create the backend process.
    #[error("failed to spawn backend process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The backend process spawned but never became healthy in time.
    #[error("backend did not become ready within {timeout_secs}s")]
    ReadinessTimeout {
        /// The startup timeout in seconds.
        timeout_secs: u64,
    },

    /// The backend process exited before it became ready.
    #[error("backend process exited during startup (exit code: {code:?})")]
    ExitedDuringStartup {
        /// The exit code, if available.
        code: Option<i32>,
    },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BackendError>;

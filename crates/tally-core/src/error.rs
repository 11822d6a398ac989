//! Error types for tally-core

use thiserror::Error;

/// Result type alias using tally-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tally-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local persistence could not be opened or committed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote request failed before a response arrived
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote answered with a non-2xx status
    #[error("Remote rejected request: {message} ({status})")]
    RemoteRejected { status: u16, message: String },

    /// Sync was requested but no remote endpoint is configured
    #[error("No remote endpoint configured")]
    RemoteNotConfigured,
}

impl Error {
    /// Failures of the remote system itself; never abort a sync pass.
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RemoteRejected { .. } | Self::RemoteNotConfigured
        )
    }
}

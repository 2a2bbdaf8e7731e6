//! Error types shared across the workspace.

use thiserror::Error;

/// Storage-layer failures.
///
/// Backend faults are surfaced to the operator but never converted into a
/// job failure by callers; in-flight workers keep their in-memory state and
/// reconcile when the store returns.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying database I/O failure.
    #[error("storage backend: {0}")]
    Backend(String),

    /// A row that was expected to exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique or check constraint violation.
    #[error("constraint: {0}")]
    Constraint(String),
}

/// Failures from the chat capability.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Provider credentials or target channel are missing.
    #[error("chat provider not configured")]
    NotConfigured,

    /// Single download attempt failed; the worker retry loop handles these.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Session-level failure (disconnect, auth expiry).
    #[error("session: {0}")]
    Session(String),
}

/// Top-level core error.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

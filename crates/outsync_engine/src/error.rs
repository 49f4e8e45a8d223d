//! Error types for the sync engine.

use outsync_protocol::{ProtocolError, RecordId, ZoneId};
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote store asked the client to back off.
    #[error("throttled by remote store, retry after {retry_after:?}")]
    Throttled {
        /// Suggested delay before the next attempt.
        retry_after: Duration,
    },

    /// The zone no longer exists on the remote store.
    #[error("zone {0} was deleted")]
    ZoneDeleted(ZoneId),

    /// A save kept conflicting with newer server state.
    #[error("record {record} still conflicts after {attempts} attempts")]
    ConflictRetriesExhausted {
        /// The record that could not be saved.
        record: RecordId,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Malformed identifiers or records.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local file system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding of local state failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A remote call did not finish in time.
    #[error("operation timed out")]
    Timeout,

    /// The network is not reachable.
    #[error("remote store not reachable")]
    NotReachable,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Another process holds the sync directory.
    #[error("sync directory is locked by another process")]
    DirectoryLocked,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl ToString) -> Self {
        Self::Codec(message.to_string())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Throttled { .. } | SyncError::Timeout => true,
            _ => false,
        }
    }

    /// Returns the delay the remote store asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::Throttled { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

//! Error types for the record server.

use outsync_protocol::ZoneId;
use std::time::Duration;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the record server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A change token the server did not issue.
    #[error("invalid change token")]
    InvalidToken,

    /// The zone was deleted.
    #[error("zone {0} was deleted")]
    ZoneDeleted(ZoneId),

    /// Too many requests.
    #[error("throttled, retry after {retry_after:?}")]
    Throttled {
        /// Suggested delay.
        retry_after: Duration,
    },

    /// The server cannot handle requests right now.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_) | ServerError::InvalidToken | ServerError::ZoneDeleted(_)
        )
    }

    /// Returns true if the request may succeed when repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServerError::Throttled { .. } | ServerError::Unavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidToken.is_client_error());
        assert!(ServerError::ZoneDeleted(ZoneId::default_zone()).is_client_error());
        assert!(ServerError::Unavailable("maintenance".into()).is_retryable());
        assert!(!ServerError::InvalidRequest("bad".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ServerError::Throttled {
            retry_after: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("10s"));
    }
}

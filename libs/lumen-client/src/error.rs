//! Failure taxonomy for outbound calls
//!
//! Four terminal classes: transport failure (no response, the "status 0"
//! case, including timeouts), auth failure (401/403), other client errors
//! (4xx) and server errors (5xx). Observational stages log and re-raise
//! these unchanged; no stage substitutes a different error for the caller.

use lumen_resilience::Retryable;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response was received: offline, DNS failure, timeout.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// Authentication or authorization was rejected (401/403).
    #[error("authentication failed with status {status}")]
    Auth { status: u16 },

    /// The request itself was rejected (other 4xx).
    #[error("request rejected with status {status}")]
    Client { status: u16 },

    /// The backend failed (5xx).
    #[error("server error with status {status}")]
    Server { status: u16 },
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Classify a received non-success status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth { status },
            500.. => Self::Server { status },
            _ => Self::Client { status },
        }
    }

    /// HTTP status of the failure; `None` for a transport failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transport { .. } => None,
            Self::Auth { status } | Self::Client { status } | Self::Server { status } => {
                Some(*status)
            }
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl Retryable for ApiError {
    fn status_code(&self) -> Option<u16> {
        ApiError::status_code(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_status() {
        assert!(matches!(
            ApiError::from_status(401),
            ApiError::Auth { status: 401 }
        ));
        assert!(matches!(
            ApiError::from_status(403),
            ApiError::Auth { status: 403 }
        ));
        assert!(matches!(
            ApiError::from_status(404),
            ApiError::Client { status: 404 }
        ));
        assert!(matches!(
            ApiError::from_status(500),
            ApiError::Server { status: 500 }
        ));
        assert!(matches!(
            ApiError::from_status(503),
            ApiError::Server { status: 503 }
        ));
    }

    #[test]
    fn test_transport_failure_has_no_status() {
        let err = ApiError::transport("connection refused");
        assert_eq!(err.status_code(), None);
        assert_eq!(Retryable::status_code(&err), None);
    }
}

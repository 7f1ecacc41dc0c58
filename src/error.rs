//! Error types for leasehold.
//!
//! Contention is deliberately absent from the library-level variants: stores
//! and the acquire protocol report "somebody else holds it" through outcome
//! enums. Only the CLI boundary turns that outcome into [`LeaseError::Unavailable`].

use crate::exit_codes;
use thiserror::Error;

/// Main error type for leasehold operations.
#[derive(Error, Debug)]
pub enum LeaseError {
    /// Input rejected before touching storage (malformed lock id, bad options).
    #[error("invalid request: {0}")]
    Validation(String),

    /// The storage backend failed (I/O, corrupted record, serialization).
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A wait was aborted through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Storage writes are fenced because the process is shutting down.
    #[error("lock storage is terminating; write operations disabled")]
    Terminating,

    /// A peer sent a line the server could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// CLI only: the lock could not be obtained.
    #[error("lock unavailable: {0}")]
    Unavailable(String),
}

impl LeaseError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LeaseError::Validation(_) | LeaseError::Config(_) => exit_codes::VALIDATION_FAILURE,
            LeaseError::Unavailable(_) => exit_codes::LOCK_UNAVAILABLE,
            LeaseError::Backend(_)
            | LeaseError::Cancelled
            | LeaseError::Terminating
            | LeaseError::Protocol(_) => exit_codes::UNEXPECTED_ERROR,
        }
    }

    /// Whether the CLI should stay silent when reporting this error.
    pub fn is_silent(&self) -> bool {
        matches!(self, LeaseError::Unavailable(_))
    }
}

impl From<serde_json::Error> for LeaseError {
    fn from(err: serde_json::Error) -> Self {
        LeaseError::Backend(format!("serialization error: {}", err))
    }
}

/// Result type alias for leasehold operations.
pub type Result<T> = std::result::Result<T, LeaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_has_correct_exit_code() {
        let err = LeaseError::Validation("empty lock id".to_string());
        assert_eq!(err.exit_code(), exit_codes::VALIDATION_FAILURE);
    }

    #[test]
    fn backend_error_has_correct_exit_code() {
        let err = LeaseError::Backend("disk full".to_string());
        assert_eq!(err.exit_code(), exit_codes::UNEXPECTED_ERROR);
    }

    #[test]
    fn unavailable_maps_to_contention_code() {
        let err = LeaseError::Unavailable("job-7".to_string());
        assert_eq!(err.exit_code(), exit_codes::LOCK_UNAVAILABLE);
        assert!(err.is_silent());
    }

    #[test]
    fn cancellation_is_not_contention() {
        let err = LeaseError::Cancelled;
        assert_ne!(err.exit_code(), exit_codes::LOCK_UNAVAILABLE);
        assert!(!err.is_silent());
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = LeaseError::Validation("lock id must not be empty".to_string());
        assert_eq!(err.to_string(), "invalid request: lock id must not be empty");

        let err = LeaseError::Backend("record truncated".to_string());
        assert_eq!(err.to_string(), "storage backend failure: record truncated");
    }
}

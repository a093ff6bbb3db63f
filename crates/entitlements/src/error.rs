//! Error types for entitlement operations.

use database::{DatabaseError, ValidationError};
use thiserror::Error;

/// Errors that can occur while resolving premium status or metering usage.
#[derive(Debug, Error)]
pub enum EntitlementError {
    /// Storage failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Rejected client input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No session with this id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The heartbeat came from a different device than the one that started the session.
    #[error("device fingerprint does not match session {session_id}")]
    FingerprintMismatch { session_id: String },

    /// No signed-in user with this id.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Usage was reported before the free daily hour was activated.
    #[error("daily limit not activated for {device_fingerprint} on {usage_date}")]
    NotActivated {
        device_fingerprint: String,
        usage_date: String,
    },

    /// Negative or otherwise unusable amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

impl From<sqlx::Error> for EntitlementError {
    fn from(err: sqlx::Error) -> Self {
        EntitlementError::Database(DatabaseError::Sqlx(err))
    }
}

/// Result type for entitlement operations.
pub type Result<T> = std::result::Result<T, EntitlementError>;

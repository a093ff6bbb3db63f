//! Error types for billing operations.

use thiserror::Error;

/// Errors that can occur while talking to Stripe or applying its events.
#[derive(Debug, Error)]
pub enum BillingError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the Stripe API.
    #[error("Stripe error {status}: {message}")]
    Stripe { status: u16, message: String },

    /// The `Stripe-Signature` header is missing, malformed or does not match.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// The signed timestamp is outside the tolerance window.
    #[error("Webhook timestamp outside tolerance ({age_secs}s old)")]
    TimestampOutOfTolerance { age_secs: i64 },

    /// A required field was absent from an event payload.
    #[error("Event {event_id} is missing {field}")]
    MissingField {
        event_id: String,
        field: &'static str,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Storage failure.
    #[error(transparent)]
    Database(#[from] database::DatabaseError),

    /// Premium status update failed.
    #[error(transparent)]
    Entitlement(#[from] entitlements::EntitlementError),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(database::DatabaseError::Sqlx(err))
    }
}

/// Result type for billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

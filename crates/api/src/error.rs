//! Error types for the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use billing::BillingError;
use database::DatabaseError;
use entitlements::EntitlementError;
use thiserror::Error;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, invalid or expired credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Rejected request.
    #[error("{0}")]
    BadRequest(String),

    /// Requested record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A feature the server was started without.
    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Entitlement(#[from] EntitlementError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status and stable machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            ApiError::Entitlement(err) => entitlement_status(err),
            ApiError::Billing(err) => billing_status(err),
            ApiError::Database(err) => database_status(err),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

fn database_status(err: &DatabaseError) -> (StatusCode, &'static str) {
    match err {
        DatabaseError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        DatabaseError::AlreadyExists { .. } => (StatusCode::CONFLICT, "already_exists"),
        DatabaseError::InvalidValue(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        DatabaseError::Sqlx(_) | DatabaseError::Migration(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    }
}

fn entitlement_status(err: &EntitlementError) -> (StatusCode, &'static str) {
    match err {
        EntitlementError::Database(err) => database_status(err),
        EntitlementError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        EntitlementError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
        EntitlementError::FingerprintMismatch { .. } => {
            (StatusCode::FORBIDDEN, "fingerprint_mismatch")
        }
        EntitlementError::UserNotFound(_) => (StatusCode::NOT_FOUND, "user_not_found"),
        EntitlementError::NotActivated { .. } => (StatusCode::CONFLICT, "daily_limit_not_activated"),
        EntitlementError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
    }
}

fn billing_status(err: &BillingError) -> (StatusCode, &'static str) {
    match err {
        BillingError::InvalidSignature(_) | BillingError::TimestampOutOfTolerance { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_signature")
        }
        BillingError::Json(_) | BillingError::MissingField { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_event")
        }
        BillingError::Http(_) | BillingError::Stripe { .. } => {
            (StatusCode::BAD_GATEWAY, "billing_provider_error")
        }
        BillingError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        BillingError::Database(err) => database_status(err),
        BillingError::Entitlement(err) => entitlement_status(err),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status.is_server_error() {
            tracing::error!(code, "Request failed: {}", self);
            match status {
                StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
                _ => self.to_string(),
            }
        } else {
            if status == StatusCode::UNAUTHORIZED {
                tracing::warn!("Unauthorized request: {}", self);
            }
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entitlement_errors_map_to_client_statuses() {
        let err = ApiError::from(EntitlementError::SessionNotFound("s1".to_string()));
        assert_eq!(err.status_and_code(), (StatusCode::NOT_FOUND, "session_not_found"));

        let err = ApiError::from(EntitlementError::NotActivated {
            device_fingerprint: "fp".to_string(),
            usage_date: "2025-03-03".to_string(),
        });
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);

        let err = ApiError::from(EntitlementError::Database(DatabaseError::NotFound {
            entity: "User",
            id: "u1".to_string(),
        }));
        assert_eq!(err.status_and_code().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_billing_errors_map_to_statuses() {
        let err = ApiError::from(BillingError::InvalidSignature("bad".to_string()));
        assert_eq!(err.status_and_code(), (StatusCode::BAD_REQUEST, "invalid_signature"));

        let err = ApiError::from(BillingError::Stripe {
            status: 402,
            message: "card declined".to_string(),
        });
        assert_eq!(err.status_and_code().0, StatusCode::BAD_GATEWAY);
    }
}

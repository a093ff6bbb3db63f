//! Route handlers for the HTTP API.

pub mod admin;
pub mod auth;
pub mod billing;
pub mod daily_limit;
pub mod health;
pub mod premium;
pub mod session;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health::health))
        // Auth
        .route("/api/auth/token", post(auth::exchange_token))
        .route("/api/auth/me", get(auth::me))
        // Premium status
        .route("/api/premium/status", get(premium::status))
        // Usage sessions
        .route("/api/session/start", post(session::start))
        .route("/api/session/heartbeat", post(session::heartbeat))
        .route("/api/session/end", post(session::end))
        // Free daily hour
        .route("/api/daily-limit/activate", post(daily_limit::activate))
        .route("/api/daily-limit/status", get(daily_limit::status))
        .route("/api/daily-limit/usage", post(daily_limit::record_usage))
        // Billing
        .route("/api/billing/checkout", post(billing::checkout))
        .route("/api/billing/portal", post(billing::portal))
        .route("/api/billing/webhook", post(billing::webhook))
        // Admin
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/:id/premium", get(admin::premium_report))
        .route("/api/admin/users/:id/reconcile", post(admin::reconcile))
        .route("/api/admin/users/:id/reset-usage", post(admin::reset_usage))
        .route("/api/admin/sessions/sweep", post(admin::sweep_sessions))
        .route("/api/admin/daily-limit/override", post(admin::daily_limit_override))
}

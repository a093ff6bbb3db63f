//! HTTP API for the browser extension and web front end.
//!
//! Serves sign-in, premium status, usage sessions, the free daily hour,
//! Stripe billing and admin housekeeping over JSON.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod sweeper;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use crate::config::{Config, ConfigError};
pub use crate::error::ApiError;
pub use crate::state::AppState;

/// Build the application with all routes and middleware.
pub fn app(state: AppState, cors_origins: &[String]) -> Router {
    routes::router()
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(auth::ADMIN_KEY_HEADER),
        ]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}

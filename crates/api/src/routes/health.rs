//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: String,
    pub database: String,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let database = match sqlx::query("SELECT 1").execute(state.pool()).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!("Health check query failed: {}", e);
            "unavailable"
        }
    };

    Json(Health {
        status: "ok".to_string(),
        database: database.to_string(),
    })
}

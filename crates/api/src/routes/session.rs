//! Usage session routes.

use axum::extract::State;
use axum::Json;
use database::Session;
use entitlements::session::{self, HeartbeatOutcome, SessionStarted, StartSession};
use entitlements::unix_now;
use serde::{Deserialize, Serialize};

use crate::auth::OptionalAuthUser;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub device_fingerprint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub session_id: String,
    pub device_fingerprint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct EndResponse {
    pub session: Session,
}

/// Start a session. Signed-in users are metered per user, others per device.
pub async fn start(
    State(state): State<AppState>,
    user: OptionalAuthUser,
    Json(request): Json<StartRequest>,
) -> Result<Json<SessionStarted>> {
    let started = session::start_session(
        state.pool(),
        &state.policy,
        StartSession {
            user_id: user.user_id(),
            device_fingerprint: &request.device_fingerprint,
        },
        unix_now(),
    )
    .await?;

    Ok(Json(started))
}

/// Credit usage since the last heartbeat and report whether to stop.
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatOutcome>> {
    let outcome = session::heartbeat(
        state.pool(),
        &state.policy,
        &request.session_id,
        &request.device_fingerprint,
        unix_now(),
    )
    .await?;

    Ok(Json(outcome))
}

/// End a session. Ending an already closed session is a no-op.
pub async fn end(
    State(state): State<AppState>,
    Json(request): Json<EndRequest>,
) -> Result<Json<EndResponse>> {
    let session = session::end_session(state.pool(), &request.session_id, unix_now()).await?;
    Ok(Json(EndResponse { session }))
}

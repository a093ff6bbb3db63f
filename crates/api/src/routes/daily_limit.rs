//! Free daily hour routes.

use axum::extract::{Query, State};
use axum::Json;
use entitlements::daily_limit::{self, DailyLimitStatus};
use entitlements::unix_now;
use serde::Deserialize;

use crate::auth::OptionalAuthUser;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRequest {
    pub device_fingerprint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRequest {
    pub device_fingerprint: String,
    pub seconds: i64,
}

/// Activate today's free hour for a device.
pub async fn activate(
    State(state): State<AppState>,
    user: OptionalAuthUser,
    Json(request): Json<DeviceRequest>,
) -> Result<Json<DailyLimitStatus>> {
    let status = daily_limit::activate(
        state.pool(),
        &state.policy,
        &request.device_fingerprint,
        user.user_id(),
        unix_now(),
    )
    .await?;

    Ok(Json(status))
}

/// Today's free hour state for a device.
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<DeviceRequest>,
) -> Result<Json<DailyLimitStatus>> {
    let status =
        daily_limit::status(state.pool(), &state.policy, &query.device_fingerprint, unix_now())
            .await?;

    Ok(Json(status))
}

/// Report seconds consumed from today's free hour.
///
/// A single report never counts for more than one day's quota.
pub async fn record_usage(
    State(state): State<AppState>,
    Json(request): Json<UsageRequest>,
) -> Result<Json<DailyLimitStatus>> {
    let status = daily_limit::record_usage(
        state.pool(),
        &request.device_fingerprint,
        request.seconds.min(state.policy.daily_quota_secs),
        unix_now(),
    )
    .await?;

    Ok(Json(status))
}

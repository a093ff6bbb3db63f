//! Admin routes. Every handler requires the `X-Admin-Key` header.

use axum::extract::{Path, Query, State};
use axum::Json;
use database::{device, premium_user, session as session_store, usage_counter, user};
use database::{SessionStatus, SubscriptionTier, User};
use entitlements::daily_limit::{self, DailyLimitOverride, DailyLimitStatus};
use entitlements::premium::{reconcile as reconcile_premium, PremiumResolution, ReconcileOutcome};
use entitlements::{session, unix_now, usage_date};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AdminKey;
use crate::error::Result;
use crate::routes::premium::resolve;
use crate::state::AppState;

/// Service statistics.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub user_count: i64,
    pub premium_count: i64,
    pub users_by_tier: Vec<TierStats>,
    pub sessions_by_status: Vec<SessionStats>,
}

/// Users in one tier.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub tier: SubscriptionTier,
    pub user_count: i64,
}

/// Sessions in one state.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub status: SessionStatus,
    pub session_count: i64,
}

/// Most users returned by one listing.
const MAX_USER_LIST: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default = "default_user_limit")]
    pub limit: i64,
}

fn default_user_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetUsageResponse {
    pub user_id: String,
    pub usage_date: String,
    /// Counters that existed and were cleared.
    pub cleared: u64,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub swept: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub device_fingerprint: String,
    /// Defaults to today.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "override")]
    pub action: DailyLimitOverride,
    #[serde(default)]
    pub note: Option<String>,
}

/// Get service statistics.
pub async fn stats(State(state): State<AppState>, _admin: AdminKey) -> Result<Json<Stats>> {
    let pool = state.pool();

    let user_count = user::count_users(pool).await?;
    let premium_count = premium_user::count_premium(pool).await?;

    let users_by_tier = user::count_users_by_tier(pool)
        .await?
        .into_iter()
        .map(|(tier, count)| TierStats {
            tier,
            user_count: count,
        })
        .collect();

    let sessions_by_status = session_store::count_sessions_by_status(pool)
        .await?
        .into_iter()
        .map(|(status, count)| SessionStats {
            status,
            session_count: count,
        })
        .collect();

    Ok(Json(Stats {
        user_count,
        premium_count,
        users_by_tier,
        sessions_by_status,
    }))
}

/// Users ordered by last sign-in, newest first.
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminKey,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UserList>> {
    let limit = query.limit.clamp(1, MAX_USER_LIST);
    let users = user::list_users(state.pool(), limit).await?;
    Ok(Json(UserList { users }))
}

/// Full resolver report for a user: every source, rejections and conflicts.
pub async fn premium_report(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(user_id): Path<String>,
) -> Result<Json<PremiumResolution>> {
    Ok(Json(resolve(&state, &user_id).await?))
}

/// Write the resolved status back to every stored copy.
pub async fn reconcile(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(user_id): Path<String>,
) -> Result<Json<ReconcileOutcome>> {
    let outcome = reconcile_premium(state.pool(), &user_id, unix_now()).await?;
    Ok(Json(outcome))
}

/// Clear today's usage counters for a user and their devices.
pub async fn reset_usage(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(user_id): Path<String>,
) -> Result<Json<ResetUsageResponse>> {
    let date = usage_date(unix_now());

    let mut subjects = vec![usage_counter::user_subject(&user_id)];
    subjects.extend(
        device::list_devices(state.pool(), &user_id)
            .await?
            .iter()
            .map(|d| usage_counter::device_subject(&d.device_fingerprint)),
    );

    let mut cleared = 0;
    for subject in &subjects {
        if usage_counter::reset_usage(state.pool(), subject, &date).await? {
            cleared += 1;
        }
    }

    info!(user_id = %user_id, usage_date = %date, cleared, "Reset usage");

    Ok(Json(ResetUsageResponse {
        user_id,
        usage_date: date,
        cleared,
    }))
}

/// Time out silent sessions now instead of waiting for the sweeper.
pub async fn sweep_sessions(
    State(state): State<AppState>,
    _admin: AdminKey,
) -> Result<Json<SweepResponse>> {
    let swept = session::sweep_timeouts(state.pool(), &state.policy, unix_now()).await?;
    Ok(Json(SweepResponse { swept }))
}

/// Apply a manual override to a device's free daily hour.
pub async fn daily_limit_override(
    State(state): State<AppState>,
    _admin: AdminKey,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<DailyLimitStatus>> {
    let status = daily_limit::apply_override(
        state.pool(),
        &state.policy,
        &request.device_fingerprint,
        request.date.as_deref(),
        request.action,
        request.note.as_deref(),
        unix_now(),
    )
    .await?;

    Ok(Json(status))
}

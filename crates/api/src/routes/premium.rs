//! Premium status routes.

use axum::extract::State;
use axum::Json;
use database::{DatabaseError, SubscriptionTier};
use entitlements::premium::{resolve_for_user, PremiumResolution, PremiumSource};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::state::AppState;

/// Resolved premium status as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumStatus {
    pub is_premium: bool,
    pub tier: SubscriptionTier,
    pub source: Option<PremiumSource>,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub current_period_end: Option<i64>,
    /// False when stored copies disagree or carry unverifiable claims.
    pub consistent: bool,
}

impl From<&PremiumResolution> for PremiumStatus {
    fn from(resolution: &PremiumResolution) -> Self {
        Self {
            is_premium: resolution.is_premium,
            tier: resolution.tier(),
            source: resolution.authoritative,
            subscription_id: resolution.subscription_id.clone(),
            subscription_status: resolution.subscription_status.clone(),
            current_period_end: resolution.current_period_end,
            consistent: resolution.is_consistent(),
        }
    }
}

/// Resolve a user's premium status on a pooled connection.
pub(crate) async fn resolve(state: &AppState, user_id: &str) -> Result<PremiumResolution> {
    let mut conn = state.pool().acquire().await.map_err(DatabaseError::from)?;
    Ok(resolve_for_user(&mut conn, user_id).await?)
}

/// Get the signed-in user's premium status.
pub async fn status(State(state): State<AppState>, user: AuthUser) -> Result<Json<PremiumStatus>> {
    let resolution = resolve(&state, user.user_id()).await?;
    Ok(Json(PremiumStatus::from(&resolution)))
}

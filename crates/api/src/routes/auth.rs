//! Sign-in routes.

use axum::extract::State;
use axum::Json;
use database::validation::{validate_email, validate_fingerprint};
use database::user::UserIdentity;
use database::{auth_claims, device, usage_counter, user, AuthClaims, DatabaseError, SubscriptionTier, User};
use entitlements::premium::{resolve_for_user, PremiumResolution};
use entitlements::session::{usage_snapshot, UsageSnapshot};
use entitlements::unix_now;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::routes::premium::{resolve, PremiumStatus};
use crate::state::AppState;

/// Exchange request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    /// Identity-provider ID token.
    pub id_token: String,
    /// Device the user is signing in from, if known.
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

/// Public profile fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub tier: SubscriptionTier,
    pub total_usage_seconds: i64,
    pub created_at: i64,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            tier: user.subscription_tier,
            total_usage_seconds: user.total_usage_seconds,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserProfile,
    pub premium: PremiumStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: UserProfile,
    pub premium: PremiumStatus,
    pub usage: UsageSnapshot,
}

/// Verify an identity-provider ID token and issue an app token.
///
/// Creates the user on first sign-in and brings the claims mirror in line
/// with the resolved premium status.
pub async fn exchange_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>> {
    let identity = state.verifier.verify(&request.id_token).await?;
    let now = unix_now();

    if let Some(fingerprint) = request.device_fingerprint.as_deref() {
        validate_fingerprint(fingerprint).map_err(DatabaseError::from)?;
    }

    let email = match identity.email.as_deref() {
        Some(email) if validate_email(email).is_err() => {
            warn!(user_id = %identity.uid, "Ignoring malformed email from identity provider");
            None
        }
        email => email,
    };

    let mut tx = database::begin_write(state.pool()).await?;

    user::upsert_user(
        &mut *tx,
        &UserIdentity {
            id: &identity.uid,
            email,
            display_name: identity.display_name.as_deref(),
        },
        now,
    )
    .await?;

    if let Some(fingerprint) = request.device_fingerprint.as_deref() {
        device::touch_device(&mut *tx, &identity.uid, fingerprint, now).await?;
    }

    let resolution = resolve_for_user(&mut tx, &identity.uid).await?;
    mirror_claims(&mut tx, &identity.uid, &resolution, now).await?;
    let profile = user::get_user(&mut *tx, &identity.uid).await?;

    tx.commit().await.map_err(DatabaseError::from)?;

    let token = state.tokens.issue(
        &identity.uid,
        email,
        resolution.is_premium,
        now,
    )?;

    info!(
        user_id = %identity.uid,
        verifier = state.verifier.name(),
        is_premium = resolution.is_premium,
        "Issued app token"
    );

    Ok(Json(TokenResponse {
        token,
        token_type: "Bearer",
        expires_in: state.tokens.ttl_secs(),
        user: UserProfile::from(&profile),
        premium: PremiumStatus::from(&resolution),
    }))
}

/// Rewrite the claims mirror when it differs from the resolved status.
async fn mirror_claims(
    conn: &mut SqliteConnection,
    user_id: &str,
    resolution: &PremiumResolution,
    now: i64,
) -> Result<()> {
    let current = auth_claims::get_claims(&mut *conn, user_id).await?;
    let in_sync = current.as_ref().is_some_and(|claims| {
        claims.premium == resolution.is_premium
            && claims.stripe_subscription_id == resolution.subscription_id
    });
    if in_sync {
        return Ok(());
    }

    auth_claims::upsert_claims(
        &mut *conn,
        &AuthClaims {
            user_id: user_id.to_string(),
            premium: resolution.is_premium,
            stripe_role: resolution.is_premium.then(|| "premium".to_string()),
            stripe_subscription_id: resolution.subscription_id.clone(),
            updated_at: now,
        },
    )
    .await?;

    debug!(user_id = %user_id, premium = resolution.is_premium, "Updated claims mirror");
    Ok(())
}

/// Profile, premium status and today's usage for the signed-in user.
pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<MeResponse>> {
    let profile = user::find_user(state.pool(), user.user_id())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {}", user.user_id())))?;

    let resolution = resolve(&state, user.user_id()).await?;
    let usage = usage_snapshot(
        state.pool(),
        &state.policy,
        &usage_counter::user_subject(user.user_id()),
        resolution.is_premium,
        unix_now(),
    )
    .await?;

    Ok(Json(MeResponse {
        user: UserProfile::from(&profile),
        premium: PremiumStatus::from(&resolution),
        usage,
    }))
}

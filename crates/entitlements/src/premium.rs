//! Premium status resolution.
//!
//! The same "is this user premium" fact is stored in four places:
//!
//! 1. the canonical `premium_users` table,
//! 2. the mirrored identity-provider custom claims,
//! 3. the billing customer/subscription tables fed by the payment provider,
//! 4. the legacy flag on the user row.
//!
//! They can disagree. [`resolve`] picks the highest-priority source that is
//! present, after discarding any premium claim that does not carry a
//! verifiable subscription id.

use database::{
    auth_claims, billing, premium_user, user, AuthClaims, PremiumUser, SubscriptionTier,
};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::Result;

/// Where a premium report came from. Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PremiumSource {
    PremiumUsers,
    CustomClaims,
    BillingCustomer,
    LegacyUser,
}

impl PremiumSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PremiumSource::PremiumUsers => "premium_users",
            PremiumSource::CustomClaims => "custom_claims",
            PremiumSource::BillingCustomer => "billing_customer",
            PremiumSource::LegacyUser => "legacy_user",
        }
    }
}

/// One source's view of a user's premium status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source: PremiumSource,
    pub is_premium: bool,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub current_period_end: Option<i64>,
}

impl SourceReport {
    fn new(source: PremiumSource, is_premium: bool, subscription_id: Option<String>) -> Self {
        Self {
            source,
            is_premium,
            subscription_id,
            subscription_status: None,
            current_period_end: None,
        }
    }

    /// A premium report must carry a verifiable subscription id to be trusted.
    fn is_trusted(&self) -> bool {
        !self.is_premium
            || self
                .subscription_id
                .as_deref()
                .is_some_and(is_verifiable_subscription_id)
    }
}

/// The outcome of reconciling every available source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumResolution {
    pub is_premium: bool,
    /// Source the answer was taken from; `None` when no usable source exists.
    pub authoritative: Option<PremiumSource>,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub current_period_end: Option<i64>,
    /// Sources claiming premium without a verifiable subscription id.
    pub rejected: Vec<PremiumSource>,
    /// Trusted sources that disagree with the authoritative answer.
    pub conflicts: Vec<PremiumSource>,
    /// Every report considered, in priority order.
    pub reports: Vec<SourceReport>,
}

impl PremiumResolution {
    /// Tier for a signed-in user with this resolution.
    pub fn tier(&self) -> SubscriptionTier {
        tier_for(true, self.is_premium)
    }

    /// True when every present source agrees and none was rejected.
    pub fn is_consistent(&self) -> bool {
        self.rejected.is_empty() && self.conflicts.is_empty()
    }
}

/// A premium fact to write to every copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PremiumUpdate {
    pub is_premium: bool,
    pub email: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub current_period_end: Option<i64>,
    /// Recorded on the canonical row (e.g., "webhook", "reconcile").
    pub source: String,
}

/// Result of an admin reconcile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub before: PremiumResolution,
    pub after: PremiumResolution,
}

/// Markers that identify placeholder or test subscription ids.
const TEST_MARKERS: [&str; 5] = ["test", "fake", "mock", "manual", "debug"];

/// Minimum length of the part after `sub_`.
const MIN_SUBSCRIPTION_BODY_LEN: usize = 8;

/// Check that a subscription id looks like a real billing-provider id.
///
/// Accepts `sub_` followed by at least eight ASCII alphanumerics, with no
/// test marker anywhere in the id.
pub fn is_verifiable_subscription_id(id: &str) -> bool {
    let Some(body) = id.strip_prefix("sub_") else {
        return false;
    };

    if body.len() < MIN_SUBSCRIPTION_BODY_LEN || !body.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }

    let lower = id.to_ascii_lowercase();
    !TEST_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Tier for a subject given whether a user is signed in and premium.
pub fn tier_for(signed_in: bool, is_premium: bool) -> SubscriptionTier {
    match (signed_in, is_premium) {
        (false, _) => SubscriptionTier::Anonymous,
        (true, false) => SubscriptionTier::Limited,
        (true, true) => SubscriptionTier::Premium,
    }
}

/// Billing statuses that grant premium.
pub fn status_grants_premium(status: &str) -> bool {
    matches!(status, "active" | "trialing")
}

/// Pick the authoritative answer from a set of reports.
pub fn resolve(mut reports: Vec<SourceReport>) -> PremiumResolution {
    reports.sort_by_key(|report| report.source);

    let rejected: Vec<PremiumSource> = reports
        .iter()
        .filter(|report| !report.is_trusted())
        .map(|report| report.source)
        .collect();

    let authoritative = reports.iter().find(|report| report.is_trusted()).cloned();

    let Some(winner) = authoritative else {
        return PremiumResolution {
            is_premium: false,
            authoritative: None,
            subscription_id: None,
            subscription_status: None,
            current_period_end: None,
            rejected,
            conflicts: Vec::new(),
            reports,
        };
    };

    let conflicts = reports
        .iter()
        .filter(|report| report.is_trusted() && report.is_premium != winner.is_premium)
        .map(|report| report.source)
        .collect();

    PremiumResolution {
        is_premium: winner.is_premium,
        authoritative: Some(winner.source),
        subscription_id: winner.subscription_id,
        subscription_status: winner.subscription_status,
        current_period_end: winner.current_period_end,
        rejected,
        conflicts,
        reports,
    }
}

/// Read every source's report for a user.
pub async fn gather_reports(conn: &mut SqliteConnection, user_id: &str) -> Result<Vec<SourceReport>> {
    let mut reports = Vec::with_capacity(4);

    if let Some(record) = premium_user::get_premium_user(&mut *conn, user_id).await? {
        reports.push(SourceReport {
            subscription_status: record.subscription_status,
            current_period_end: record.current_period_end,
            ..SourceReport::new(
                PremiumSource::PremiumUsers,
                record.is_premium,
                record.stripe_subscription_id,
            )
        });
    }

    if let Some(claims) = auth_claims::get_claims(&mut *conn, user_id).await? {
        let premium = claims.premium || claims.stripe_role.as_deref() == Some("premium");
        reports.push(SourceReport::new(
            PremiumSource::CustomClaims,
            premium,
            claims.stripe_subscription_id,
        ));
    }

    let subscriptions = billing::list_subscriptions_for_user(&mut *conn, user_id).await?;
    let current = subscriptions
        .iter()
        .find(|sub| status_grants_premium(&sub.status))
        .or_else(|| subscriptions.first());
    match current {
        Some(sub) => reports.push(SourceReport {
            subscription_status: Some(sub.status.clone()),
            current_period_end: sub.current_period_end,
            ..SourceReport::new(
                PremiumSource::BillingCustomer,
                status_grants_premium(&sub.status),
                Some(sub.id.clone()),
            )
        }),
        None => {
            if billing::find_customer_by_user(&mut *conn, user_id).await?.is_some() {
                reports.push(SourceReport::new(PremiumSource::BillingCustomer, false, None));
            }
        }
    }

    if let Some(record) = user::find_user(&mut *conn, user_id).await? {
        reports.push(SourceReport::new(
            PremiumSource::LegacyUser,
            record.is_premium,
            record.stripe_subscription_id,
        ));
    }

    Ok(reports)
}

/// Resolve a user's premium status from the database.
pub async fn resolve_for_user(conn: &mut SqliteConnection, user_id: &str) -> Result<PremiumResolution> {
    let reports = gather_reports(conn, user_id).await?;
    let resolution = resolve(reports);

    if !resolution.rejected.is_empty() {
        warn!(
            user_id = %user_id,
            rejected = ?resolution.rejected,
            "Ignoring premium claims without a verifiable subscription id"
        );
    }
    if !resolution.conflicts.is_empty() {
        debug!(
            user_id = %user_id,
            authoritative = ?resolution.authoritative,
            conflicts = ?resolution.conflicts,
            "Premium sources disagree"
        );
    }

    Ok(resolution)
}

/// Write one premium fact to the canonical record, the claims mirror and
/// the legacy user row.
///
/// Run this inside a transaction. A missing user row is skipped, since
/// billing events can arrive before the user's first sign-in here.
pub async fn apply_premium_update(
    conn: &mut SqliteConnection,
    user_id: &str,
    update: &PremiumUpdate,
    now: i64,
) -> Result<()> {
    let record = PremiumUser {
        user_id: user_id.to_string(),
        email: update.email.clone(),
        is_premium: update.is_premium,
        stripe_customer_id: update.customer_id.clone(),
        stripe_subscription_id: update.subscription_id.clone(),
        subscription_status: update.subscription_status.clone(),
        current_period_end: update.current_period_end,
        source: update.source.clone(),
        updated_at: now,
    };
    premium_user::upsert_premium_user(&mut *conn, &record).await?;

    let claims = AuthClaims {
        user_id: user_id.to_string(),
        premium: update.is_premium,
        stripe_role: update.is_premium.then(|| "premium".to_string()),
        stripe_subscription_id: update.subscription_id.clone(),
        updated_at: now,
    };
    auth_claims::upsert_claims(&mut *conn, &claims).await?;

    if user::find_user(&mut *conn, user_id).await?.is_some() {
        user::set_legacy_premium(
            &mut *conn,
            user_id,
            update.is_premium,
            update.subscription_id.as_deref(),
            now,
        )
        .await?;
    } else {
        debug!(user_id = %user_id, "No user row yet, skipping legacy premium flag");
    }

    info!(
        user_id = %user_id,
        is_premium = update.is_premium,
        source = %update.source,
        "Applied premium update"
    );

    Ok(())
}

/// Resolve a user's status and write the authoritative answer back to every
/// copy the service owns. Billing tables are left as the provider reported them.
pub async fn reconcile(pool: &SqlitePool, user_id: &str, now: i64) -> Result<ReconcileOutcome> {
    let mut tx = database::begin_write(pool).await?;

    let before = resolve_for_user(&mut tx, user_id).await?;
    let update = PremiumUpdate {
        is_premium: before.is_premium,
        email: None,
        customer_id: None,
        subscription_id: before.subscription_id.clone(),
        subscription_status: before.subscription_status.clone(),
        current_period_end: before.current_period_end,
        source: "reconcile".to_string(),
    };
    apply_premium_update(&mut tx, user_id, &update, now).await?;
    let after = resolve_for_user(&mut tx, user_id).await?;

    tx.commit().await?;

    info!(
        user_id = %user_id,
        is_premium = after.is_premium,
        was_consistent = before.is_consistent(),
        "Reconciled premium status"
    );

    Ok(ReconcileOutcome { before, after })
}

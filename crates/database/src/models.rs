//! Database models.
//!
//! Timestamps are Unix seconds. Calendar dates are UTC `YYYY-MM-DD` strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Access tier a user or session is operating under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// No signed-in user, identified by device fingerprint only.
    Anonymous,
    /// Signed in without an active subscription.
    Limited,
    /// Signed in with an active subscription.
    Premium,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Anonymous => "anonymous",
            SubscriptionTier::Limited => "limited",
            SubscriptionTier::Premium => "premium",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a usage session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Timeout,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed-in user, identified by the identity provider's uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Identity provider uid.
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub subscription_tier: SubscriptionTier,
    /// Legacy premium flag kept on the user row.
    pub is_premium: bool,
    /// Legacy copy of the billing subscription id.
    pub stripe_subscription_id: Option<String>,
    /// Cumulative credited usage across all days.
    pub total_usage_seconds: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen_at: i64,
}

/// A device fingerprint observed for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserDevice {
    pub user_id: String,
    pub device_fingerprint: String,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
}

/// Canonical premium status record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PremiumUser {
    pub user_id: String,
    pub email: Option<String>,
    pub is_premium: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    /// Billing provider status (e.g., "active", "canceled").
    pub subscription_status: Option<String>,
    pub current_period_end: Option<i64>,
    /// What last wrote this record (e.g., "webhook", "reconcile").
    pub source: String,
    pub updated_at: i64,
}

/// Locally mirrored identity-provider custom claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AuthClaims {
    pub user_id: String,
    pub premium: bool,
    pub stripe_role: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub updated_at: i64,
}

/// Mapping between a user and their billing customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BillingCustomer {
    pub user_id: String,
    pub stripe_customer_id: String,
    pub email: Option<String>,
    pub created_at: i64,
}

/// A billing subscription as last reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BillingSubscription {
    /// Provider subscription id (e.g., "sub_1Nx...").
    pub id: String,
    pub user_id: String,
    pub stripe_customer_id: String,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A usage session for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: Option<String>,
    pub device_fingerprint: String,
    /// Tier at the time the session was created.
    pub subscription_tier: SubscriptionTier,
    /// Premium status at the time the session was created.
    pub is_premium: bool,
    pub status: SessionStatus,
    pub heartbeat_count: i64,
    pub usage_seconds: i64,
    pub created_at: i64,
    pub last_heartbeat_at: i64,
    pub ended_at: Option<i64>,
    pub end_reason: Option<String>,
}

/// Per-subject usage for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UsageCounter {
    /// `user:<uid>` or `device:<fingerprint>`.
    pub subject: String,
    pub usage_date: String,
    pub seconds: i64,
    pub updated_at: i64,
}

/// Free daily hour state for one device on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DailyLimit {
    /// `<fingerprint>_<YYYY-MM-DD>`.
    pub id: String,
    pub device_fingerprint: String,
    pub usage_date: String,
    pub user_id: Option<String>,
    pub activated: bool,
    pub activated_at: Option<i64>,
    pub used_seconds: i64,
    pub limit_seconds: i64,
    /// Note left by the last manual override.
    pub override_note: Option<String>,
    pub updated_at: i64,
}

impl DailyLimit {
    /// Build the record key for a device and date.
    pub fn key(device_fingerprint: &str, usage_date: &str) -> String {
        format!("{}_{}", device_fingerprint, usage_date)
    }

    pub fn remaining_seconds(&self) -> i64 {
        (self.limit_seconds - self.used_seconds).max(0)
    }
}

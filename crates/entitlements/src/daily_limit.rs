//! Free daily hour per device.
//!
//! Independent of the session tracker: a device activates its free hour for
//! the current UTC day and reports consumed time against it. Records are
//! keyed `<fingerprint>_<YYYY-MM-DD>`.

use database::validation::{validate_fingerprint, validate_usage_date};
use database::{daily_limit, DailyLimit};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{usage_date, EntitlementError, Result, UsagePolicy};

/// Current state of a device's free daily hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLimitStatus {
    pub device_fingerprint: String,
    pub usage_date: String,
    pub activated: bool,
    pub activated_at: Option<i64>,
    pub used_seconds: i64,
    pub limit_seconds: i64,
    pub remaining_seconds: i64,
    pub exhausted: bool,
    pub override_note: Option<String>,
}

impl From<&DailyLimit> for DailyLimitStatus {
    fn from(record: &DailyLimit) -> Self {
        let remaining_seconds = record.remaining_seconds();
        Self {
            device_fingerprint: record.device_fingerprint.clone(),
            usage_date: record.usage_date.clone(),
            activated: record.activated,
            activated_at: record.activated_at,
            used_seconds: record.used_seconds,
            limit_seconds: record.limit_seconds,
            remaining_seconds,
            exhausted: record.activated && remaining_seconds == 0,
            override_note: record.override_note.clone(),
        }
    }
}

/// Manual debug override of a daily-limit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "seconds", rename_all = "snake_case")]
pub enum DailyLimitOverride {
    /// Delete the record, as if the device never activated today.
    Reset,
    /// Mark the free hour as activated.
    Activate,
    /// Force the consumed seconds.
    SetUsed(i64),
    /// Change the allowance for this record only.
    SetLimit(i64),
}

impl DailyLimitOverride {
    pub fn name(&self) -> &'static str {
        match self {
            DailyLimitOverride::Reset => "reset",
            DailyLimitOverride::Activate => "activate",
            DailyLimitOverride::SetUsed(_) => "set_used",
            DailyLimitOverride::SetLimit(_) => "set_limit",
        }
    }
}

fn blank(policy: &UsagePolicy, device_fingerprint: &str, date: &str, now: i64) -> DailyLimit {
    DailyLimit {
        id: DailyLimit::key(device_fingerprint, date),
        device_fingerprint: device_fingerprint.to_string(),
        usage_date: date.to_string(),
        user_id: None,
        activated: false,
        activated_at: None,
        used_seconds: 0,
        limit_seconds: policy.daily_quota_secs,
        override_note: None,
        updated_at: now,
    }
}

/// Activate today's free hour for a device. Activating twice is a no-op.
pub async fn activate(
    pool: &SqlitePool,
    policy: &UsagePolicy,
    device_fingerprint: &str,
    user_id: Option<&str>,
    now: i64,
) -> Result<DailyLimitStatus> {
    validate_fingerprint(device_fingerprint)?;
    let date = usage_date(now);
    let mut tx = database::begin_write(pool).await?;

    daily_limit::insert_if_missing(&mut *tx, &blank(policy, device_fingerprint, &date, now)).await?;
    let mut record = load(&mut tx, device_fingerprint, &date).await?;

    if !record.activated {
        record.activated = true;
        record.activated_at = Some(now);
        record.updated_at = now;
        if record.user_id.is_none() {
            record.user_id = user_id.map(str::to_string);
        }
        daily_limit::save_daily_limit(&mut *tx, &record).await?;

        info!(
            device_fingerprint = %device_fingerprint,
            usage_date = %date,
            "Activated free daily hour"
        );
    }

    tx.commit().await?;
    Ok(DailyLimitStatus::from(&record))
}

/// Today's state for a device. A device with no record is reported as not
/// activated with nothing used.
pub async fn status(
    pool: &SqlitePool,
    policy: &UsagePolicy,
    device_fingerprint: &str,
    now: i64,
) -> Result<DailyLimitStatus> {
    validate_fingerprint(device_fingerprint)?;
    let date = usage_date(now);

    let record = daily_limit::find_daily_limit(pool, &DailyLimit::key(device_fingerprint, &date))
        .await?
        .unwrap_or_else(|| blank(policy, device_fingerprint, &date, now));

    Ok(DailyLimitStatus::from(&record))
}

/// Add consumed seconds to today's activated free hour.
///
/// Usage is capped at the record's limit.
pub async fn record_usage(
    pool: &SqlitePool,
    device_fingerprint: &str,
    seconds: i64,
    now: i64,
) -> Result<DailyLimitStatus> {
    validate_fingerprint(device_fingerprint)?;
    if seconds < 0 {
        return Err(EntitlementError::InvalidAmount(format!(
            "usage seconds must not be negative, got {}",
            seconds
        )));
    }

    let date = usage_date(now);
    let mut tx = database::begin_write(pool).await?;

    let mut record = daily_limit::find_daily_limit(&mut *tx, &DailyLimit::key(device_fingerprint, &date))
        .await?
        .filter(|record| record.activated)
        .ok_or_else(|| EntitlementError::NotActivated {
            device_fingerprint: device_fingerprint.to_string(),
            usage_date: date.clone(),
        })?;

    record.used_seconds = record
        .used_seconds
        .saturating_add(seconds)
        .min(record.limit_seconds);
    record.updated_at = now;
    daily_limit::save_daily_limit(&mut *tx, &record).await?;

    tx.commit().await?;
    Ok(DailyLimitStatus::from(&record))
}

/// Apply a manual override to a device's record for a date (default today).
pub async fn apply_override(
    pool: &SqlitePool,
    policy: &UsagePolicy,
    device_fingerprint: &str,
    date: Option<&str>,
    action: DailyLimitOverride,
    note: Option<&str>,
    now: i64,
) -> Result<DailyLimitStatus> {
    validate_fingerprint(device_fingerprint)?;
    let date = match date {
        Some(date) => {
            validate_usage_date(date)?;
            date.to_string()
        }
        None => usage_date(now),
    };

    if let DailyLimitOverride::SetUsed(secs) | DailyLimitOverride::SetLimit(secs) = action {
        if secs < 0 {
            return Err(EntitlementError::InvalidAmount(format!(
                "{} must not be negative, got {}",
                action.name(),
                secs
            )));
        }
    }

    warn!(
        device_fingerprint = %device_fingerprint,
        usage_date = %date,
        action = action.name(),
        "Applying daily limit override"
    );

    let mut tx = database::begin_write(pool).await?;

    if action == DailyLimitOverride::Reset {
        daily_limit::delete_daily_limit(&mut *tx, &DailyLimit::key(device_fingerprint, &date)).await?;
        tx.commit().await?;
        return Ok(DailyLimitStatus::from(&blank(policy, device_fingerprint, &date, now)));
    }

    daily_limit::insert_if_missing(&mut *tx, &blank(policy, device_fingerprint, &date, now)).await?;
    let mut record = load(&mut tx, device_fingerprint, &date).await?;

    match action {
        DailyLimitOverride::Reset => {}
        DailyLimitOverride::Activate => {
            record.activated = true;
            record.activated_at.get_or_insert(now);
        }
        DailyLimitOverride::SetUsed(secs) => {
            record.used_seconds = secs.min(record.limit_seconds);
        }
        DailyLimitOverride::SetLimit(secs) => {
            record.limit_seconds = secs;
            record.used_seconds = record.used_seconds.min(secs);
        }
    }
    record.override_note = Some(
        note.map(str::to_string)
            .unwrap_or_else(|| format!("manual override: {}", action.name())),
    );
    record.updated_at = now;
    daily_limit::save_daily_limit(&mut *tx, &record).await?;

    tx.commit().await?;
    Ok(DailyLimitStatus::from(&record))
}

/// Delete records older than `keep_days` days before `now`.
pub async fn purge_expired(pool: &SqlitePool, keep_days: i64, now: i64) -> Result<u64> {
    if keep_days < 1 {
        return Err(EntitlementError::InvalidAmount(format!(
            "retention must be at least one day, got {}",
            keep_days
        )));
    }
    let cutoff = usage_date(now.saturating_sub(keep_days.saturating_mul(86_400)));
    let purged = daily_limit::purge_before(pool, &cutoff).await?;

    if purged > 0 {
        info!(purged, cutoff = %cutoff, "Purged old daily limit records");
    }

    Ok(purged)
}

async fn load(
    conn: &mut sqlx::SqliteConnection,
    device_fingerprint: &str,
    date: &str,
) -> Result<DailyLimit> {
    let key = DailyLimit::key(device_fingerprint, date);
    daily_limit::find_daily_limit(conn, &key)
        .await?
        .ok_or_else(|| {
            EntitlementError::Database(database::DatabaseError::NotFound {
                entity: "DailyLimit",
                id: key.clone(),
            })
        })
}

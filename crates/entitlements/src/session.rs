//! Session and heartbeat tracking.
//!
//! A session is opened per device (optionally tied to a signed-in user). The
//! client sends a heartbeat every [`UsagePolicy::heartbeat_interval_secs`];
//! each one credits the elapsed time to the session and to the subject's
//! usage for the day. Non-premium subjects are told to stop once the daily
//! quota is used up.

use database::validation::validate_fingerprint;
use database::{device, session, usage_counter, user, Session, SessionStatus};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::premium::{resolve_for_user, tier_for};
use crate::{usage_date, EntitlementError, Result, UsagePolicy};

/// Why a client was told to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The daily quota is used up.
    DailyLimit,
    /// Heartbeats stopped arriving for longer than the session timeout.
    Timeout,
    /// The client ended the session.
    EndedByClient,
    /// A newer session was started on the same device.
    Superseded,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::DailyLimit => "daily_limit",
            StopReason::Timeout => "timeout",
            StopReason::EndedByClient => "ended_by_client",
            StopReason::Superseded => "superseded",
        }
    }

    /// Map a stored end reason back to a stop reason.
    pub fn from_end_reason(reason: Option<&str>) -> Self {
        match reason {
            Some("daily_limit") => StopReason::DailyLimit,
            Some("timeout") => StopReason::Timeout,
            Some("superseded") => StopReason::Superseded,
            _ => StopReason::EndedByClient,
        }
    }
}

/// Usage for a subject on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub usage_date: String,
    pub used_seconds: i64,
    /// `None` for premium subjects.
    pub limit_seconds: Option<i64>,
    pub remaining_seconds: Option<i64>,
}

impl UsageSnapshot {
    fn new(policy: &UsagePolicy, usage_date: String, used_seconds: i64, is_premium: bool) -> Self {
        let limit_seconds = (!is_premium).then_some(policy.daily_quota_secs);
        Self {
            usage_date,
            used_seconds,
            limit_seconds,
            remaining_seconds: limit_seconds.map(|limit| (limit - used_seconds).max(0)),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_seconds == Some(0)
    }
}

/// Request to open a session.
#[derive(Debug, Clone, Copy)]
pub struct StartSession<'a> {
    pub user_id: Option<&'a str>,
    pub device_fingerprint: &'a str,
}

/// A newly opened session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub session: Session,
    pub usage: UsageSnapshot,
    pub heartbeat_interval_secs: i64,
    /// Set when the quota was already used up before the session started.
    pub should_stop: bool,
    pub stop_reason: Option<StopReason>,
}

/// Result of one heartbeat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    pub credited_seconds: i64,
    pub usage: UsageSnapshot,
    pub heartbeat_interval_secs: i64,
    pub should_stop: bool,
    pub stop_reason: Option<StopReason>,
}

/// Usage counter key for a session's subject.
pub fn subject_for(user_id: Option<&str>, device_fingerprint: &str) -> String {
    match user_id {
        Some(id) => usage_counter::user_subject(id),
        None => usage_counter::device_subject(device_fingerprint),
    }
}

/// Open a session for a device, closing any session still active on it.
pub async fn start_session(
    pool: &SqlitePool,
    policy: &UsagePolicy,
    request: StartSession<'_>,
    now: i64,
) -> Result<SessionStarted> {
    validate_fingerprint(request.device_fingerprint)?;

    let mut tx = database::begin_write(pool).await?;

    let is_premium = match request.user_id {
        Some(user_id) => {
            if user::find_user(&mut *tx, user_id).await?.is_none() {
                return Err(EntitlementError::UserNotFound(user_id.to_string()));
            }
            device::touch_device(&mut *tx, user_id, request.device_fingerprint, now).await?;
            resolve_for_user(&mut tx, user_id).await?.is_premium
        }
        None => false,
    };

    let superseded = session::close_active_for_device(
        &mut *tx,
        request.device_fingerprint,
        StopReason::Superseded.as_str(),
        now,
    )
    .await?;
    if superseded > 0 {
        debug!(
            device_fingerprint = %request.device_fingerprint,
            superseded,
            "Closed previous sessions on device"
        );
    }

    let record = Session {
        id: Uuid::new_v4().to_string(),
        user_id: request.user_id.map(str::to_string),
        device_fingerprint: request.device_fingerprint.to_string(),
        subscription_tier: tier_for(request.user_id.is_some(), is_premium),
        is_premium,
        status: SessionStatus::Active,
        heartbeat_count: 0,
        usage_seconds: 0,
        created_at: now,
        last_heartbeat_at: now,
        ended_at: None,
        end_reason: None,
    };
    session::create_session(&mut *tx, &record).await?;

    let date = usage_date(now);
    let subject = subject_for(request.user_id, request.device_fingerprint);
    let used = usage_counter::get_usage(&mut *tx, &subject, &date).await?;

    tx.commit().await?;

    let usage = UsageSnapshot::new(policy, date, used, is_premium);
    let should_stop = usage.is_exhausted();

    info!(
        session_id = %record.id,
        tier = %record.subscription_tier,
        used_seconds = used,
        should_stop,
        "Session started"
    );

    Ok(SessionStarted {
        session: record,
        usage,
        heartbeat_interval_secs: policy.heartbeat_interval_secs,
        should_stop,
        stop_reason: should_stop.then_some(StopReason::DailyLimit),
    })
}

/// Process a heartbeat for a session.
pub async fn heartbeat(
    pool: &SqlitePool,
    policy: &UsagePolicy,
    session_id: &str,
    device_fingerprint: &str,
    now: i64,
) -> Result<HeartbeatOutcome> {
    let mut tx = database::begin_write(pool).await?;

    let record = session::find_session(&mut *tx, session_id)
        .await?
        .ok_or_else(|| EntitlementError::SessionNotFound(session_id.to_string()))?;

    if record.device_fingerprint != device_fingerprint {
        return Err(EntitlementError::FingerprintMismatch {
            session_id: session_id.to_string(),
        });
    }

    let date = usage_date(now);
    let subject = subject_for(record.user_id.as_deref(), &record.device_fingerprint);
    let mut is_premium = record.is_premium;

    if record.status != SessionStatus::Active {
        let used = usage_counter::get_usage(&mut *tx, &subject, &date).await?;
        return Ok(stopped(
            policy,
            &record,
            record.status,
            StopReason::from_end_reason(record.end_reason.as_deref()),
            UsageSnapshot::new(policy, date, used, is_premium),
        ));
    }

    let elapsed = now - record.last_heartbeat_at;
    if elapsed > policy.session_timeout_secs {
        close(&mut tx, &record.id, SessionStatus::Timeout, StopReason::Timeout, now).await?;
        let used = usage_counter::get_usage(&mut *tx, &subject, &date).await?;
        tx.commit().await?;

        info!(session_id = %record.id, elapsed, "Session timed out between heartbeats");
        return Ok(stopped(
            policy,
            &record,
            SessionStatus::Timeout,
            StopReason::Timeout,
            UsageSnapshot::new(policy, date, used, is_premium),
        ));
    }

    let used_before = usage_counter::get_usage(&mut *tx, &subject, &date).await?;
    if !is_premium && used_before >= policy.daily_quota_secs {
        is_premium = upgraded_since_start(&mut tx, &record).await?;
        if !is_premium {
            let outcome = expire_for_quota(&mut tx, policy, &record, date, used_before, now).await?;
            tx.commit().await?;
            return Ok(outcome);
        }
    }

    let credited = elapsed.clamp(0, policy.max_credit_secs);
    session::record_heartbeat(&mut *tx, &record.id, credited, now).await?;
    let used = usage_counter::add_usage(&mut *tx, &subject, &date, credited, now).await?;
    if let Some(user_id) = record.user_id.as_deref() {
        user::add_total_usage(&mut *tx, user_id, credited, now).await?;
    }

    if !is_premium && used >= policy.daily_quota_secs {
        is_premium = upgraded_since_start(&mut tx, &record).await?;
        if !is_premium {
            let mut outcome = expire_for_quota(&mut tx, policy, &record, date, used, now).await?;
            outcome.credited_seconds = credited;
            tx.commit().await?;
            return Ok(outcome);
        }
    }

    tx.commit().await?;

    debug!(
        session_id = %record.id,
        credited,
        used_seconds = used,
        "Heartbeat recorded"
    );

    Ok(HeartbeatOutcome {
        session_id: record.id,
        status: SessionStatus::Active,
        credited_seconds: credited,
        usage: UsageSnapshot::new(policy, date, used, is_premium),
        heartbeat_interval_secs: policy.heartbeat_interval_secs,
        should_stop: false,
        stop_reason: None,
    })
}

/// End a session at the client's request. Ending a closed session is a no-op.
pub async fn end_session(pool: &SqlitePool, session_id: &str, now: i64) -> Result<Session> {
    let mut tx = database::begin_write(pool).await?;

    if session::find_session(&mut *tx, session_id).await?.is_none() {
        return Err(EntitlementError::SessionNotFound(session_id.to_string()));
    }

    let closed = close(
        &mut tx,
        session_id,
        SessionStatus::Expired,
        StopReason::EndedByClient,
        now,
    )
    .await?;

    let record = session::find_session(&mut *tx, session_id)
        .await?
        .ok_or_else(|| EntitlementError::SessionNotFound(session_id.to_string()))?;

    tx.commit().await?;

    if closed {
        info!(session_id = %session_id, usage_seconds = record.usage_seconds, "Session ended");
    }

    Ok(record)
}

/// Time out every active session whose last heartbeat is too old.
pub async fn sweep_timeouts(pool: &SqlitePool, policy: &UsagePolicy, now: i64) -> Result<u64> {
    let cutoff = now - policy.session_timeout_secs;
    let swept = session::timeout_stale_sessions(pool, cutoff, now).await?;

    if swept > 0 {
        info!(swept, cutoff, "Timed out stale sessions");
    }

    Ok(swept)
}

/// Current usage for a subject.
pub async fn usage_snapshot(
    pool: &SqlitePool,
    policy: &UsagePolicy,
    subject: &str,
    is_premium: bool,
    now: i64,
) -> Result<UsageSnapshot> {
    let date = usage_date(now);
    let used = usage_counter::get_usage(pool, subject, &date).await?;
    Ok(UsageSnapshot::new(policy, date, used, is_premium))
}

async fn close(
    conn: &mut SqliteConnection,
    session_id: &str,
    status: SessionStatus,
    reason: StopReason,
    now: i64,
) -> Result<bool> {
    Ok(session::close_session(conn, session_id, status, reason.as_str(), now).await?)
}

/// A signed-in user may have subscribed after the session started.
async fn upgraded_since_start(conn: &mut SqliteConnection, record: &Session) -> Result<bool> {
    match record.user_id.as_deref() {
        Some(user_id) => Ok(resolve_for_user(conn, user_id).await?.is_premium),
        None => Ok(false),
    }
}

async fn expire_for_quota(
    conn: &mut SqliteConnection,
    policy: &UsagePolicy,
    record: &Session,
    date: String,
    used: i64,
    now: i64,
) -> Result<HeartbeatOutcome> {
    close(conn, &record.id, SessionStatus::Expired, StopReason::DailyLimit, now).await?;

    info!(
        session_id = %record.id,
        used_seconds = used,
        quota = policy.daily_quota_secs,
        "Daily quota reached, stopping session"
    );

    Ok(stopped(
        policy,
        record,
        SessionStatus::Expired,
        StopReason::DailyLimit,
        UsageSnapshot::new(policy, date, used, false),
    ))
}

fn stopped(
    policy: &UsagePolicy,
    record: &Session,
    status: SessionStatus,
    reason: StopReason,
    usage: UsageSnapshot,
) -> HeartbeatOutcome {
    HeartbeatOutcome {
        session_id: record.id.clone(),
        status,
        credited_seconds: 0,
        usage,
        heartbeat_interval_secs: policy.heartbeat_interval_secs,
        should_stop: true,
        stop_reason: Some(reason),
    }
}

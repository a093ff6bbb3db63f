//! Usage session storage.

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{Session, SessionStatus};

/// Insert a new session.
pub async fn create_session<'e, E>(executor: E, session: &Session) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO sessions (
            id, user_id, device_fingerprint, subscription_tier, is_premium, status,
            heartbeat_count, usage_seconds, created_at, last_heartbeat_at, ended_at, end_reason
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(&session.device_fingerprint)
    .bind(session.subscription_tier)
    .bind(session.is_premium)
    .bind(session.status)
    .bind(session.heartbeat_count)
    .bind(session.usage_seconds)
    .bind(session.created_at)
    .bind(session.last_heartbeat_at)
    .bind(session.ended_at)
    .bind(&session.end_reason)
    .execute(executor)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "Session",
                    id: session.id.clone(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    Ok(())
}

/// Get a session by ID.
pub async fn find_session<'e, E>(executor: E, id: &str) -> Result<Option<Session>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let session = sqlx::query_as::<_, Session>(
        r#"
        SELECT id, user_id, device_fingerprint, subscription_tier, is_premium, status,
               heartbeat_count, usage_seconds, created_at, last_heartbeat_at, ended_at, end_reason
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(session)
}

/// Count a heartbeat and credit usage to an active session.
pub async fn record_heartbeat<'e, E>(
    executor: E,
    id: &str,
    credited_seconds: i64,
    now: i64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET heartbeat_count = heartbeat_count + 1,
            usage_seconds = usage_seconds + ?,
            last_heartbeat_at = ?
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(credited_seconds)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Active session",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Close an active session. Returns false if it was not active.
pub async fn close_session<'e, E>(
    executor: E,
    id: &str,
    status: SessionStatus,
    reason: &str,
    now: i64,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET status = ?, ended_at = ?, end_reason = ?
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(status)
    .bind(now)
    .bind(reason)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Expire every active session on a device. Returns the number closed.
pub async fn close_active_for_device<'e, E>(
    executor: E,
    device_fingerprint: &str,
    reason: &str,
    now: i64,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET status = 'expired', ended_at = ?, end_reason = ?
        WHERE device_fingerprint = ? AND status = 'active'
        "#,
    )
    .bind(now)
    .bind(reason)
    .bind(device_fingerprint)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Mark active sessions whose last heartbeat is older than `cutoff` as timed out.
pub async fn timeout_stale_sessions<'e, E>(executor: E, cutoff: i64, now: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET status = 'timeout', ended_at = ?, end_reason = 'timeout'
        WHERE status = 'active' AND last_heartbeat_at < ?
        "#,
    )
    .bind(now)
    .bind(cutoff)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Count sessions grouped by status.
pub async fn count_sessions_by_status(pool: &SqlitePool) -> Result<Vec<(SessionStatus, i64)>> {
    let rows = sqlx::query_as::<_, (SessionStatus, i64)>(
        r#"
        SELECT status, COUNT(*) as count
        FROM sessions
        GROUP BY status
        ORDER BY status
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

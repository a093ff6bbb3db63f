//! Daily-limit records keyed by device fingerprint and date.

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::models::DailyLimit;
use crate::Result;

/// Get a daily-limit record by key.
pub async fn find_daily_limit<'e, E>(executor: E, id: &str) -> Result<Option<DailyLimit>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let record = sqlx::query_as::<_, DailyLimit>(
        r#"
        SELECT id, device_fingerprint, usage_date, user_id, activated, activated_at,
               used_seconds, limit_seconds, override_note, updated_at
        FROM daily_limits
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(record)
}

/// Insert a record unless one already exists for the key.
pub async fn insert_if_missing<'e, E>(executor: E, record: &DailyLimit) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO daily_limits (
            id, device_fingerprint, usage_date, user_id, activated, activated_at,
            used_seconds, limit_seconds, override_note, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.device_fingerprint)
    .bind(&record.usage_date)
    .bind(&record.user_id)
    .bind(record.activated)
    .bind(record.activated_at)
    .bind(record.used_seconds)
    .bind(record.limit_seconds)
    .bind(&record.override_note)
    .bind(record.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Overwrite the mutable fields of an existing record.
pub async fn save_daily_limit<'e, E>(executor: E, record: &DailyLimit) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE daily_limits
        SET user_id = ?, activated = ?, activated_at = ?, used_seconds = ?,
            limit_seconds = ?, override_note = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&record.user_id)
    .bind(record.activated)
    .bind(record.activated_at)
    .bind(record.used_seconds)
    .bind(record.limit_seconds)
    .bind(&record.override_note)
    .bind(record.updated_at)
    .bind(&record.id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Delete a record. Returns true if one existed.
pub async fn delete_daily_limit<'e, E>(executor: E, id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        DELETE FROM daily_limits
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete records for dates strictly before `usage_date`.
pub async fn purge_before(pool: &SqlitePool, usage_date: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM daily_limits
        WHERE usage_date < ?
        "#,
    )
    .bind(usage_date)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

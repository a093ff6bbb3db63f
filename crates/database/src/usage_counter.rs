//! Daily usage counters per subject.

use sqlx::{Executor, Sqlite};

use crate::Result;

/// Subject key for a signed-in user.
pub fn user_subject(user_id: &str) -> String {
    format!("user:{}", user_id)
}

/// Subject key for an anonymous device.
pub fn device_subject(device_fingerprint: &str) -> String {
    format!("device:{}", device_fingerprint)
}

/// Add seconds to a subject's counter for a day and return the new total.
pub async fn add_usage<'e, E>(
    executor: E,
    subject: &str,
    usage_date: &str,
    seconds: i64,
    now: i64,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let total = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO usage_counters (subject, usage_date, seconds, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(subject, usage_date) DO UPDATE SET
            seconds = usage_counters.seconds + excluded.seconds,
            updated_at = excluded.updated_at
        RETURNING seconds
        "#,
    )
    .bind(subject)
    .bind(usage_date)
    .bind(seconds)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(total)
}

/// Get a subject's usage for a day (zero when nothing was recorded).
pub async fn get_usage<'e, E>(executor: E, subject: &str, usage_date: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let seconds = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT seconds
        FROM usage_counters
        WHERE subject = ? AND usage_date = ?
        "#,
    )
    .bind(subject)
    .bind(usage_date)
    .fetch_optional(executor)
    .await?;

    Ok(seconds.unwrap_or(0))
}

/// Clear a subject's usage for a day. Returns true if a counter existed.
pub async fn reset_usage<'e, E>(executor: E, subject: &str, usage_date: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        DELETE FROM usage_counters
        WHERE subject = ? AND usage_date = ?
        "#,
    )
    .bind(subject)
    .bind(usage_date)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

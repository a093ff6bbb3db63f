//! Processed webhook event ids, for idempotent delivery handling.

use sqlx::{Executor, Sqlite};

use crate::Result;

/// Record an event id. Returns false if it was already recorded.
pub async fn record_event<'e, E>(executor: E, event_id: &str, event_type: &str, now: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO webhook_events (event_id, event_type, processed_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(event_id)
    .bind(event_type)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

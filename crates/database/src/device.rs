//! Device fingerprints observed per user.

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::models::UserDevice;
use crate::Result;

/// Record that a user was seen on a device.
pub async fn touch_device<'e, E>(
    executor: E,
    user_id: &str,
    device_fingerprint: &str,
    now: i64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO user_devices (user_id, device_fingerprint, first_seen_at, last_seen_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id, device_fingerprint) DO UPDATE SET
            last_seen_at = excluded.last_seen_at
        "#,
    )
    .bind(user_id)
    .bind(device_fingerprint)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

/// List a user's devices, most recently seen first.
pub async fn list_devices(pool: &SqlitePool, user_id: &str) -> Result<Vec<UserDevice>> {
    let devices = sqlx::query_as::<_, UserDevice>(
        r#"
        SELECT user_id, device_fingerprint, first_seen_at, last_seen_at
        FROM user_devices
        WHERE user_id = ?
        ORDER BY last_seen_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(devices)
}

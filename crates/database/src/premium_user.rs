//! Canonical premium status records.

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::models::PremiumUser;
use crate::Result;

/// Get the canonical premium record for a user.
pub async fn get_premium_user<'e, E>(executor: E, user_id: &str) -> Result<Option<PremiumUser>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let record = sqlx::query_as::<_, PremiumUser>(
        r#"
        SELECT user_id, email, is_premium, stripe_customer_id, stripe_subscription_id,
               subscription_status, current_period_end, source, updated_at
        FROM premium_users
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(record)
}

/// Create or replace the canonical premium record.
///
/// `email` and `stripe_customer_id` keep their stored values when `None` is
/// passed; the subscription fields are always overwritten.
pub async fn upsert_premium_user<'e, E>(executor: E, record: &PremiumUser) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO premium_users (
            user_id, email, is_premium, stripe_customer_id, stripe_subscription_id,
            subscription_status, current_period_end, source, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            email = COALESCE(excluded.email, premium_users.email),
            is_premium = excluded.is_premium,
            stripe_customer_id = COALESCE(excluded.stripe_customer_id, premium_users.stripe_customer_id),
            stripe_subscription_id = excluded.stripe_subscription_id,
            subscription_status = excluded.subscription_status,
            current_period_end = excluded.current_period_end,
            source = excluded.source,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.user_id)
    .bind(&record.email)
    .bind(record.is_premium)
    .bind(&record.stripe_customer_id)
    .bind(&record.stripe_subscription_id)
    .bind(&record.subscription_status)
    .bind(record.current_period_end)
    .bind(&record.source)
    .bind(record.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Count users whose canonical record says premium.
pub async fn count_premium(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM premium_users WHERE is_premium = 1
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}

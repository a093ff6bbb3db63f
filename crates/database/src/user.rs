//! User CRUD operations.

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{SubscriptionTier, User};

/// Profile fields taken from a verified identity.
#[derive(Debug, Clone, Default)]
pub struct UserIdentity<'a> {
    pub id: &'a str,
    pub email: Option<&'a str>,
    pub display_name: Option<&'a str>,
}

/// Create a user on first sign-in, or refresh profile fields on later ones.
///
/// Premium fields are never touched here.
pub async fn upsert_user<'e, E>(executor: E, identity: &UserIdentity<'_>, now: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO users (id, email, display_name, subscription_tier, created_at, updated_at, last_seen_at)
        VALUES (?, ?, ?, 'limited', ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            email = COALESCE(excluded.email, users.email),
            display_name = COALESCE(excluded.display_name, users.display_name),
            updated_at = excluded.updated_at,
            last_seen_at = excluded.last_seen_at
        "#,
    )
    .bind(identity.id)
    .bind(identity.email)
    .bind(identity.display_name)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

/// Get a user by ID.
pub async fn get_user<'e, E>(executor: E, id: &str) -> Result<User>
where
    E: Executor<'e, Database = Sqlite>,
{
    find_user(executor, id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "User",
            id: id.to_string(),
        })
}

/// Get a user by ID, if present.
pub async fn find_user<'e, E>(executor: E, id: &str) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, display_name, subscription_tier, is_premium, stripe_subscription_id,
               total_usage_seconds, created_at, updated_at, last_seen_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

/// Get a user by email address (case-insensitive).
pub async fn find_user_by_email<'e, E>(executor: E, email: &str) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, display_name, subscription_tier, is_premium, stripe_subscription_id,
               total_usage_seconds, created_at, updated_at, last_seen_at
        FROM users
        WHERE lower(email) = lower(?)
        ORDER BY created_at
        LIMIT 1
        "#,
    )
    .bind(email.trim())
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

/// Write the legacy premium copy kept on the user row.
pub async fn set_legacy_premium<'e, E>(
    executor: E,
    id: &str,
    is_premium: bool,
    subscription_id: Option<&str>,
    now: i64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let tier = if is_premium {
        SubscriptionTier::Premium
    } else {
        SubscriptionTier::Limited
    };

    let result = sqlx::query(
        r#"
        UPDATE users
        SET is_premium = ?, stripe_subscription_id = ?, subscription_tier = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(is_premium)
    .bind(subscription_id)
    .bind(tier)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "User",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Add credited seconds to a user's cumulative usage.
pub async fn add_total_usage<'e, E>(executor: E, id: &str, seconds: i64, now: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE users
        SET total_usage_seconds = total_usage_seconds + ?, last_seen_at = ?
        WHERE id = ?
        "#,
    )
    .bind(seconds)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Delete a user by ID.
pub async fn delete_user(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "User",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// List users, most recently seen first.
pub async fn list_users(pool: &SqlitePool, limit: i64) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, display_name, subscription_tier, is_premium, stripe_subscription_id,
               total_usage_seconds, created_at, updated_at, last_seen_at
        FROM users
        ORDER BY last_seen_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(users)
}

/// Count total users.
pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM users
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Count users grouped by subscription tier.
pub async fn count_users_by_tier(pool: &SqlitePool) -> Result<Vec<(SubscriptionTier, i64)>> {
    let rows = sqlx::query_as::<_, (SubscriptionTier, i64)>(
        r#"
        SELECT subscription_tier, COUNT(*) as count
        FROM users
        GROUP BY subscription_tier
        ORDER BY count DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

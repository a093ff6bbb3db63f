//! Mirror of identity-provider custom claims.

use sqlx::{Executor, Sqlite};

use crate::models::AuthClaims;
use crate::Result;

/// Get the mirrored claims for a user.
pub async fn get_claims<'e, E>(executor: E, user_id: &str) -> Result<Option<AuthClaims>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let claims = sqlx::query_as::<_, AuthClaims>(
        r#"
        SELECT user_id, premium, stripe_role, stripe_subscription_id, updated_at
        FROM auth_claims
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(claims)
}

/// Create or replace the mirrored claims for a user.
pub async fn upsert_claims<'e, E>(executor: E, claims: &AuthClaims) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO auth_claims (user_id, premium, stripe_role, stripe_subscription_id, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            premium = excluded.premium,
            stripe_role = excluded.stripe_role,
            stripe_subscription_id = excluded.stripe_subscription_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&claims.user_id)
    .bind(claims.premium)
    .bind(&claims.stripe_role)
    .bind(&claims.stripe_subscription_id)
    .bind(claims.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

//! Billing customers and subscriptions as reported by the payment provider.

use sqlx::{Executor, Sqlite};

use crate::error::{DatabaseError, Result};
use crate::models::{BillingCustomer, BillingSubscription};

/// Link a user to a billing customer.
pub async fn upsert_customer<'e, E>(executor: E, customer: &BillingCustomer) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO billing_customers (user_id, stripe_customer_id, email, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            stripe_customer_id = excluded.stripe_customer_id,
            email = COALESCE(excluded.email, billing_customers.email)
        "#,
    )
    .bind(&customer.user_id)
    .bind(&customer.stripe_customer_id)
    .bind(&customer.email)
    .bind(customer.created_at)
    .execute(executor)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "BillingCustomer",
                    id: customer.stripe_customer_id.clone(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    Ok(())
}

/// Find the billing customer for a user.
pub async fn find_customer_by_user<'e, E>(
    executor: E,
    user_id: &str,
) -> Result<Option<BillingCustomer>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let customer = sqlx::query_as::<_, BillingCustomer>(
        r#"
        SELECT user_id, stripe_customer_id, email, created_at
        FROM billing_customers
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(customer)
}

/// Find the billing customer by provider customer id.
pub async fn find_customer_by_stripe_id<'e, E>(
    executor: E,
    stripe_customer_id: &str,
) -> Result<Option<BillingCustomer>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let customer = sqlx::query_as::<_, BillingCustomer>(
        r#"
        SELECT user_id, stripe_customer_id, email, created_at
        FROM billing_customers
        WHERE stripe_customer_id = ?
        "#,
    )
    .bind(stripe_customer_id)
    .fetch_optional(executor)
    .await?;

    Ok(customer)
}

/// Create or update a subscription. `created_at` is kept from the first insert.
pub async fn upsert_subscription<'e, E>(executor: E, subscription: &BillingSubscription) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO billing_subscriptions (
            id, user_id, stripe_customer_id, status, price_id, current_period_end,
            cancel_at_period_end, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            stripe_customer_id = excluded.stripe_customer_id,
            status = excluded.status,
            price_id = COALESCE(excluded.price_id, billing_subscriptions.price_id),
            current_period_end = COALESCE(excluded.current_period_end, billing_subscriptions.current_period_end),
            cancel_at_period_end = excluded.cancel_at_period_end,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&subscription.id)
    .bind(&subscription.user_id)
    .bind(&subscription.stripe_customer_id)
    .bind(&subscription.status)
    .bind(&subscription.price_id)
    .bind(subscription.current_period_end)
    .bind(subscription.cancel_at_period_end)
    .bind(subscription.created_at)
    .bind(subscription.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Get a subscription by provider id.
pub async fn get_subscription<'e, E>(executor: E, id: &str) -> Result<Option<BillingSubscription>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let subscription = sqlx::query_as::<_, BillingSubscription>(
        r#"
        SELECT id, user_id, stripe_customer_id, status, price_id, current_period_end,
               cancel_at_period_end, created_at, updated_at
        FROM billing_subscriptions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(subscription)
}

/// List a user's subscriptions, most recently updated first.
pub async fn list_subscriptions_for_user<'e, E>(
    executor: E,
    user_id: &str,
) -> Result<Vec<BillingSubscription>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let subscriptions = sqlx::query_as::<_, BillingSubscription>(
        r#"
        SELECT id, user_id, stripe_customer_id, status, price_id, current_period_end,
               cancel_at_period_end, created_at, updated_at
        FROM billing_subscriptions
        WHERE user_id = ?
        ORDER BY updated_at DESC, created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;

    Ok(subscriptions)
}

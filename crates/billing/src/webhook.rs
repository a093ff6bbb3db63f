//! Apply Stripe webhook events to billing records and premium status.

use database::validation::validate_email;
use database::{billing, user, webhook_event, BillingCustomer, BillingSubscription};
use entitlements::premium::{apply_premium_update, status_grants_premium, PremiumUpdate};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::events::{CheckoutSession, Event, Invoice, Subscription, WebhookEvent};
use crate::{BillingError, Result};

/// Premium update source recorded for webhook writes.
const SOURCE: &str = "webhook";

/// What processing an event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Billing records and premium status were updated.
    Applied { user_id: String, is_premium: bool },
    /// The event id was seen before.
    Duplicate,
    /// Nothing to do for this event.
    Ignored,
    /// No user could be linked to the event.
    Unmatched,
}

/// Process one verified event.
///
/// The event id is recorded in the same transaction as its effects, so a
/// failed event can be redelivered and a successful one is applied once.
pub async fn process_event(pool: &SqlitePool, event: &Event, now: i64) -> Result<ProcessOutcome> {
    let parsed = event.parse()?;

    let mut tx = database::begin_write(pool).await?;

    if !webhook_event::record_event(&mut *tx, &event.id, &event.event_type, now).await? {
        info!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook delivery");
        return Ok(ProcessOutcome::Duplicate);
    }

    let outcome = match parsed {
        WebhookEvent::CheckoutCompleted(session) => {
            apply_checkout(&mut tx, event, &session, now).await?
        }
        WebhookEvent::SubscriptionChanged(subscription)
        | WebhookEvent::SubscriptionDeleted(subscription) => {
            apply_subscription(&mut tx, &subscription, now).await?
        }
        WebhookEvent::InvoicePaid(invoice) => apply_invoice(&mut tx, &invoice, true, now).await?,
        WebhookEvent::InvoicePaymentFailed(invoice) => {
            apply_invoice(&mut tx, &invoice, false, now).await?
        }
        WebhookEvent::Ignored(event_type) => {
            debug!(event_id = %event.id, event_type = %event_type, "Ignoring webhook event");
            ProcessOutcome::Ignored
        }
    };

    tx.commit().await?;

    match &outcome {
        ProcessOutcome::Applied {
            user_id,
            is_premium,
        } => info!(
            event_id = %event.id,
            event_type = %event.event_type,
            user_id = %user_id,
            is_premium = is_premium,
            "Applied webhook event"
        ),
        ProcessOutcome::Unmatched => warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook event matched no user"
        ),
        _ => {}
    }

    Ok(outcome)
}

async fn apply_checkout(
    conn: &mut SqliteConnection,
    event: &Event,
    session: &CheckoutSession,
    now: i64,
) -> Result<ProcessOutcome> {
    let customer_id = session
        .customer
        .clone()
        .ok_or_else(|| BillingError::MissingField {
            event_id: event.id.clone(),
            field: "customer",
        })?;

    // Malformed addresses are neither matched nor stored
    let email = session.email().filter(|email| validate_email(email).is_ok());

    let user_id = match session.user_id() {
        Some(id) => Some(id.to_string()),
        None => match user_for_customer(conn, &customer_id).await? {
            Some(id) => Some(id),
            None => match email {
                Some(email) => user::find_user_by_email(&mut *conn, email)
                    .await?
                    .map(|user| user.id),
                None => None,
            },
        },
    };
    let Some(user_id) = user_id else {
        return Ok(ProcessOutcome::Unmatched);
    };

    billing::upsert_customer(
        &mut *conn,
        &BillingCustomer {
            user_id: user_id.clone(),
            stripe_customer_id: customer_id.clone(),
            email: email.map(str::to_string),
            created_at: now,
        },
    )
    .await?;

    // The subscription event carries the real status; only seed a row here
    // when checkout is the first we hear of it.
    if let Some(subscription_id) = &session.subscription {
        if billing::get_subscription(&mut *conn, subscription_id).await?.is_none() {
            let status = if session.is_paid() { "active" } else { "incomplete" };
            billing::upsert_subscription(
                &mut *conn,
                &BillingSubscription {
                    id: subscription_id.clone(),
                    user_id: user_id.clone(),
                    stripe_customer_id: customer_id.clone(),
                    status: status.to_string(),
                    price_id: None,
                    current_period_end: None,
                    cancel_at_period_end: false,
                    created_at: now,
                    updated_at: now,
                },
            )
            .await?;
        }
    }

    sync_premium(
        conn,
        &user_id,
        email.map(str::to_string),
        &customer_id,
        now,
    )
    .await
}

async fn apply_subscription(
    conn: &mut SqliteConnection,
    subscription: &Subscription,
    now: i64,
) -> Result<ProcessOutcome> {
    let existing = billing::get_subscription(&mut *conn, &subscription.id).await?;

    let customer_id = match (&subscription.customer, &existing) {
        (Some(customer), _) => customer.clone(),
        (None, Some(stored)) => stored.stripe_customer_id.clone(),
        (None, None) => return Ok(ProcessOutcome::Unmatched),
    };

    let user_id = match subscription.user_id() {
        Some(id) => Some(id.to_string()),
        None => match user_for_customer(conn, &customer_id).await? {
            Some(id) => Some(id),
            None => existing.as_ref().map(|stored| stored.user_id.clone()),
        },
    };
    let Some(user_id) = user_id else {
        return Ok(ProcessOutcome::Unmatched);
    };

    if billing::find_customer_by_stripe_id(&mut *conn, &customer_id)
        .await?
        .is_none()
    {
        billing::upsert_customer(
            &mut *conn,
            &BillingCustomer {
                user_id: user_id.clone(),
                stripe_customer_id: customer_id.clone(),
                email: None,
                created_at: now,
            },
        )
        .await?;
    }

    billing::upsert_subscription(
        &mut *conn,
        &BillingSubscription {
            id: subscription.id.clone(),
            user_id: user_id.clone(),
            stripe_customer_id: customer_id.clone(),
            status: subscription.status.clone(),
            price_id: subscription.price_id().map(str::to_string),
            current_period_end: subscription.period_end(),
            cancel_at_period_end: subscription.cancel_at_period_end,
            created_at: existing.as_ref().map_or(now, |stored| stored.created_at),
            updated_at: now,
        },
    )
    .await?;

    sync_premium(conn, &user_id, None, &customer_id, now).await
}

async fn apply_invoice(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    paid: bool,
    now: i64,
) -> Result<ProcessOutcome> {
    let Some(subscription_id) = invoice.subscription_id() else {
        debug!(invoice_id = %invoice.id, "Invoice has no subscription");
        return Ok(ProcessOutcome::Ignored);
    };

    let mut record = match billing::get_subscription(&mut *conn, subscription_id).await? {
        Some(stored) => stored,
        None => {
            let Some(customer_id) = invoice.customer.clone() else {
                return Ok(ProcessOutcome::Unmatched);
            };
            let Some(user_id) = user_for_customer(conn, &customer_id).await? else {
                return Ok(ProcessOutcome::Unmatched);
            };
            BillingSubscription {
                id: subscription_id.to_string(),
                user_id,
                stripe_customer_id: customer_id,
                status: String::new(),
                price_id: None,
                current_period_end: None,
                cancel_at_period_end: false,
                created_at: now,
                updated_at: now,
            }
        }
    };

    // A final invoice on a cancelled subscription must not revive it.
    if record.status != "canceled" {
        record.status = if paid { "active" } else { "past_due" }.to_string();
    }
    record.updated_at = now;
    billing::upsert_subscription(&mut *conn, &record).await?;

    let user_id = record.user_id.clone();
    sync_premium(
        conn,
        &user_id,
        invoice.customer_email.clone(),
        &record.stripe_customer_id,
        now,
    )
    .await
}

async fn user_for_customer(conn: &mut SqliteConnection, customer_id: &str) -> Result<Option<String>> {
    Ok(billing::find_customer_by_stripe_id(&mut *conn, customer_id)
        .await?
        .map(|customer| customer.user_id))
}

/// Derive premium from all of a user's subscriptions and write it through.
async fn sync_premium(
    conn: &mut SqliteConnection,
    user_id: &str,
    email: Option<String>,
    customer_id: &str,
    now: i64,
) -> Result<ProcessOutcome> {
    let subscriptions = billing::list_subscriptions_for_user(&mut *conn, user_id).await?;
    let current = subscriptions
        .iter()
        .find(|sub| status_grants_premium(&sub.status))
        .or_else(|| subscriptions.first());

    let is_premium = current.is_some_and(|sub| status_grants_premium(&sub.status));
    let update = PremiumUpdate {
        is_premium,
        email,
        customer_id: Some(customer_id.to_string()),
        subscription_id: current.map(|sub| sub.id.clone()),
        subscription_status: current.map(|sub| sub.status.clone()),
        current_period_end: current.and_then(|sub| sub.current_period_end),
        source: SOURCE.to_string(),
    };
    apply_premium_update(conn, user_id, &update, now).await?;

    Ok(ProcessOutcome::Applied {
        user_id: user_id.to_string(),
        is_premium,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::{premium_user, user::UserIdentity, Database};
    use entitlements::premium::resolve_for_user;
    use serde_json::{json, Value};

    const NOW: i64 = 1_741_000_000;
    const SUB: &str = "sub_1PqR7sTuVwXyZ";

    fn event(id: &str, event_type: &str, object: Value) -> Event {
        serde_json::from_value(json!({
            "id": id,
            "type": event_type,
            "created": NOW,
            "data": { "object": object }
        }))
        .unwrap()
    }

    fn checkout(id: &str, user_id: &str) -> Event {
        event(
            id,
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "client_reference_id": user_id,
                "customer": "cus_123",
                "subscription": SUB,
                "customer_details": { "email": "a@example.com" },
                "mode": "subscription",
                "payment_status": "paid"
            }),
        )
    }

    fn subscription(id: &str, event_type: &str, status: &str) -> Event {
        event(
            id,
            event_type,
            json!({
                "id": SUB,
                "customer": "cus_123",
                "status": status,
                "current_period_end": NOW + 30 * 86_400,
                "items": { "data": [{ "price": { "id": "price_1" } }] }
            }),
        )
    }

    async fn setup() -> Database {
        let db = Database::in_memory().await.unwrap();
        user::upsert_user(
            db.pool(),
            &UserIdentity {
                id: "user-1",
                email: Some("a@example.com"),
                display_name: None,
            },
            NOW,
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_checkout_grants_premium() {
        let db = setup().await;

        let outcome = process_event(db.pool(), &checkout("evt_1", "user-1"), NOW)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ProcessOutcome::Applied {
                user_id: "user-1".to_string(),
                is_premium: true
            }
        );

        let record = premium_user::get_premium_user(db.pool(), "user-1")
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_premium);
        assert_eq!(record.stripe_subscription_id.as_deref(), Some(SUB));
        assert_eq!(record.stripe_customer_id.as_deref(), Some("cus_123"));
        assert_eq!(record.source, "webhook");

        let mut conn = db.pool().acquire().await.unwrap();
        let resolution = resolve_for_user(&mut conn, "user-1").await.unwrap();
        assert!(resolution.is_premium);
        assert!(resolution.is_consistent());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_skipped() {
        let db = setup().await;

        process_event(db.pool(), &checkout("evt_1", "user-1"), NOW)
            .await
            .unwrap();
        let outcome = process_event(db.pool(), &checkout("evt_1", "user-1"), NOW + 5)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let db = setup().await;
        process_event(db.pool(), &checkout("evt_1", "user-1"), NOW)
            .await
            .unwrap();

        // Matched through the customer mapping, not metadata
        let outcome = process_event(
            db.pool(),
            &subscription("evt_2", "customer.subscription.updated", "past_due"),
            NOW + 10,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Applied { is_premium: false, .. }));

        let stored = billing::get_subscription(db.pool(), SUB).await.unwrap().unwrap();
        assert_eq!(stored.status, "past_due");
        assert_eq!(stored.price_id.as_deref(), Some("price_1"));
        assert_eq!(stored.created_at, NOW);

        let outcome = process_event(
            db.pool(),
            &subscription("evt_3", "customer.subscription.updated", "active"),
            NOW + 20,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Applied { is_premium: true, .. }));

        let outcome = process_event(
            db.pool(),
            &subscription("evt_4", "customer.subscription.deleted", "canceled"),
            NOW + 30,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Applied { is_premium: false, .. }));

        let legacy = user::get_user(db.pool(), "user-1").await.unwrap();
        assert!(!legacy.is_premium);
    }

    #[tokio::test]
    async fn test_invoice_failure_and_recovery() {
        let db = setup().await;
        process_event(db.pool(), &checkout("evt_1", "user-1"), NOW)
            .await
            .unwrap();

        let invoice = json!({ "id": "in_1", "customer": "cus_123", "subscription": SUB });
        let outcome = process_event(
            db.pool(),
            &event("evt_2", "invoice.payment_failed", invoice.clone()),
            NOW + 10,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Applied { is_premium: false, .. }));

        let outcome = process_event(db.pool(), &event("evt_3", "invoice.paid", invoice), NOW + 20)
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Applied { is_premium: true, .. }));
    }

    #[tokio::test]
    async fn test_paid_invoice_does_not_revive_canceled_subscription() {
        let db = setup().await;
        process_event(db.pool(), &checkout("evt_1", "user-1"), NOW)
            .await
            .unwrap();
        process_event(
            db.pool(),
            &subscription("evt_2", "customer.subscription.deleted", "canceled"),
            NOW + 10,
        )
        .await
        .unwrap();

        let invoice = json!({ "id": "in_9", "customer": "cus_123", "subscription": SUB });
        let outcome = process_event(db.pool(), &event("evt_3", "invoice.paid", invoice), NOW + 20)
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Applied { is_premium: false, .. }));
    }

    #[tokio::test]
    async fn test_checkout_matches_by_email() {
        let db = setup().await;

        let event = event(
            "evt_1",
            "checkout.session.completed",
            json!({
                "id": "cs_2",
                "customer": "cus_999",
                "subscription": SUB,
                "customer_email": "a@example.com",
                "payment_status": "paid"
            }),
        );
        let outcome = process_event(db.pool(), &event, NOW).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Applied { ref user_id, .. } if user_id == "user-1"));
    }

    #[tokio::test]
    async fn test_checkout_ignores_malformed_email() {
        let db = setup().await;

        let event = event(
            "evt_1",
            "checkout.session.completed",
            json!({
                "id": "cs_3",
                "customer": "cus_999",
                "subscription": SUB,
                "customer_email": "a@example",
                "payment_status": "paid"
            }),
        );
        let outcome = process_event(db.pool(), &event, NOW).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Unmatched);
        assert!(billing::find_customer_by_stripe_id(db.pool(), "cus_999")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unmatched_event_is_recorded() {
        let db = setup().await;

        let unknown = subscription("evt_1", "customer.subscription.created", "active");
        let outcome = process_event(db.pool(), &unknown, NOW).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Unmatched);

        let again = process_event(db.pool(), &unknown, NOW).await.unwrap();
        assert_eq!(again, ProcessOutcome::Duplicate);
        assert!(billing::get_subscription(db.pool(), SUB).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_event_can_be_redelivered() {
        let db = setup().await;

        let no_customer = event(
            "evt_1",
            "checkout.session.completed",
            json!({ "id": "cs_3", "client_reference_id": "user-1" }),
        );
        let result = process_event(db.pool(), &no_customer, NOW).await;
        assert!(matches!(result, Err(BillingError::MissingField { field: "customer", .. })));

        // The event id was rolled back with the failure
        let recorded = webhook_event::record_event(db.pool(), "evt_1", "checkout.session.completed", NOW)
            .await
            .unwrap();
        assert!(recorded);
    }

    #[tokio::test]
    async fn test_ignored_event_types() {
        let db = setup().await;
        let other = event("evt_1", "customer.created", json!({ "id": "cus_1" }));
        assert_eq!(
            process_event(db.pool(), &other, NOW).await.unwrap(),
            ProcessOutcome::Ignored
        );
    }
}

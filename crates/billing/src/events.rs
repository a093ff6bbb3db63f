//! Stripe event payloads.
//!
//! Only the fields the service acts on are modelled. Expandable references
//! (`customer`, `subscription`) may arrive as a bare id or as an expanded
//! object; both deserialize to the id.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::Result;

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

impl Event {
    /// Parse a raw webhook body.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Decode the event's object according to its type.
    pub fn parse(&self) -> Result<WebhookEvent> {
        let object = self.data.object.clone();
        let event = match self.event_type.as_str() {
            "checkout.session.completed" => {
                WebhookEvent::CheckoutCompleted(serde_json::from_value(object)?)
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                WebhookEvent::SubscriptionChanged(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                WebhookEvent::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            "invoice.paid" => WebhookEvent::InvoicePaid(serde_json::from_value(object)?),
            "invoice.payment_failed" => {
                WebhookEvent::InvoicePaymentFailed(serde_json::from_value(object)?)
            }
            other => WebhookEvent::Ignored(other.to_string()),
        };
        Ok(event)
    }
}

/// The event types the service handles.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutSession),
    /// `customer.subscription.created` or `customer.subscription.updated`.
    SubscriptionChanged(Subscription),
    SubscriptionDeleted(Subscription),
    InvoicePaid(Invoice),
    InvoicePaymentFailed(Invoice),
    /// Any other type; acknowledged without side effects.
    Ignored(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

/// `checkout.session` object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub subscription: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default, deserialize_with = "metadata")]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

impl CheckoutSession {
    /// The app user this checkout was started for.
    pub fn user_id(&self) -> Option<&str> {
        non_empty(self.client_reference_id.as_deref())
            .or_else(|| non_empty(self.metadata.get("user_id").map(String::as_str)))
    }

    pub fn email(&self) -> Option<&str> {
        non_empty(self.customer_email.as_deref()).or_else(|| {
            self.customer_details
                .as_ref()
                .and_then(|details| non_empty(details.email.as_deref()))
        })
    }

    /// Whether the first payment has cleared (or none was needed, as for trials).
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// `subscription` object.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, deserialize_with = "metadata")]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl Subscription {
    pub fn user_id(&self) -> Option<&str> {
        non_empty(self.metadata.get("user_id").map(String::as_str))
    }

    /// Period end, read from the first item on API versions that moved it there.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .iter()
                .find_map(|item| item.current_period_end)
        })
    }

    pub fn price_id(&self) -> Option<&str> {
        self.items
            .data
            .iter()
            .find_map(|item| item.price.as_ref().map(|price| price.id.as_str()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionDetails {
    #[serde(default, deserialize_with = "expandable_id")]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<SubscriptionDetails>,
}

/// `invoice` object.
#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub subscription: Option<String>,
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

impl Invoice {
    /// Subscription this invoice bills, if any.
    pub fn subscription_id(&self) -> Option<&str> {
        non_empty(self.subscription.as_deref()).or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.subscription_details.as_ref())
                .and_then(|details| non_empty(details.subscription.as_deref()))
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn expandable_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(id)) => Some(id),
        Some(Value::Object(map)) => map
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

fn metadata<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, object: Value) -> Event {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1_741_000_000,
            "livemode": false,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_checkout_session_fields() {
        let event = event(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "client_reference_id": "",
                "customer": { "id": "cus_123", "object": "customer" },
                "subscription": "sub_1PqR7sTuVwXyZ",
                "customer_email": null,
                "customer_details": { "email": "a@example.com" },
                "metadata": { "user_id": "user-1" },
                "mode": "subscription",
                "payment_status": "paid"
            }),
        );

        let WebhookEvent::CheckoutCompleted(session) = event.parse().unwrap() else {
            panic!("expected checkout event");
        };
        assert_eq!(session.customer.as_deref(), Some("cus_123"));
        assert_eq!(session.subscription.as_deref(), Some("sub_1PqR7sTuVwXyZ"));
        // Blank client_reference_id falls through to metadata
        assert_eq!(session.user_id(), Some("user-1"));
        assert_eq!(session.email(), Some("a@example.com"));
        assert!(session.is_paid());
    }

    #[test]
    fn test_subscription_period_end_fallback() {
        let event = event(
            "customer.subscription.updated",
            json!({
                "id": "sub_1PqR7sTuVwXyZ",
                "customer": "cus_123",
                "status": "active",
                "metadata": null,
                "items": { "data": [
                    { "price": { "id": "price_9" }, "current_period_end": 1_743_000_000 }
                ]}
            }),
        );

        let WebhookEvent::SubscriptionChanged(sub) = event.parse().unwrap() else {
            panic!("expected subscription event");
        };
        assert_eq!(sub.period_end(), Some(1_743_000_000));
        assert_eq!(sub.price_id(), Some("price_9"));
        assert!(sub.user_id().is_none());
        assert!(!sub.cancel_at_period_end);
    }

    #[test]
    fn test_invoice_subscription_from_parent() {
        let event = event(
            "invoice.payment_failed",
            json!({
                "id": "in_1",
                "customer": "cus_123",
                "parent": { "subscription_details": { "subscription": "sub_1PqR7sTuVwXyZ" } }
            }),
        );

        let WebhookEvent::InvoicePaymentFailed(invoice) = event.parse().unwrap() else {
            panic!("expected invoice event");
        };
        assert_eq!(invoice.subscription_id(), Some("sub_1PqR7sTuVwXyZ"));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let event = event("customer.created", json!({ "id": "cus_1" }));
        assert!(matches!(event.parse().unwrap(), WebhookEvent::Ignored(t) if t == "customer.created"));
    }

    #[test]
    fn test_missing_required_field_is_an_error() {
        let event = event("customer.subscription.deleted", json!({ "id": "sub_1" }));
        assert!(event.parse().is_err());
    }
}

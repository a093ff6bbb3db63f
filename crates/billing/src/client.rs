//! Stripe REST client for checkout and billing-portal sessions.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StripeConfig;
use crate::{BillingError, Result};

/// Who a checkout session is for.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutRequest<'a> {
    pub user_id: &'a str,
    pub email: Option<&'a str>,
    /// Existing Stripe customer, reused so one user keeps one customer.
    pub customer_id: Option<&'a str>,
}

/// A hosted page the user is redirected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLink {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Client for the Stripe API.
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Start a subscription checkout for the premium price.
    pub async fn create_checkout_session(&self, request: CheckoutRequest<'_>) -> Result<CheckoutLink> {
        let params = checkout_params(&self.config, &request);
        let link: CheckoutLink = self.post_form("/v1/checkout/sessions", &params).await?;

        info!(user_id = %request.user_id, session_id = %link.id, "Created checkout session");
        Ok(link)
    }

    /// Open the billing portal for an existing customer. Returns the portal URL.
    pub async fn create_portal_session(&self, customer_id: &str) -> Result<String> {
        let params = vec![
            ("customer", customer_id.to_string()),
            ("return_url", self.config.portal_return_url.clone()),
        ];
        let link: CheckoutLink = self.post_form("/v1/billing_portal/sessions", &params).await?;

        info!(customer_id = %customer_id, "Created billing portal session");
        Ok(link.url)
    }

    async fn post_form<R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<R> {
        let url = format!("{}{}", self.config.api_base, path);
        debug!("Stripe request: POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.secret_key())
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Stripe {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response.json().await?)
    }
}

fn checkout_params(config: &StripeConfig, request: &CheckoutRequest<'_>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("mode", "subscription".to_string()),
        ("line_items[0][price]", config.price_id.clone()),
        ("line_items[0][quantity]", "1".to_string()),
        ("success_url", config.success_url.clone()),
        ("cancel_url", config.cancel_url.clone()),
        ("client_reference_id", request.user_id.to_string()),
        ("metadata[user_id]", request.user_id.to_string()),
        ("subscription_data[metadata][user_id]", request.user_id.to_string()),
        ("allow_promotion_codes", "true".to_string()),
    ];

    // Stripe rejects customer and customer_email together.
    match (request.customer_id, request.email) {
        (Some(customer), _) => params.push(("customer", customer.to_string())),
        (None, Some(email)) => params.push(("customer_email", email.to_string())),
        (None, None) => {}
    }

    params
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => match (parsed.error.kind, parsed.error.message) {
            (Some(kind), Some(message)) => format!("{}: {}", kind, message),
            (_, Some(message)) => message,
            (Some(kind), None) => kind,
            (None, None) => body.to_string(),
        },
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StripeConfig {
        StripeConfig::new("sk_test_123", "whsec_123", "price_premium", "https://app.example.com/")
    }

    fn value<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_checkout_params_for_new_customer() {
        let params = checkout_params(
            &config(),
            &CheckoutRequest {
                user_id: "user-1",
                email: Some("a@example.com"),
                customer_id: None,
            },
        );

        assert_eq!(value(&params, "mode"), Some("subscription"));
        assert_eq!(value(&params, "line_items[0][price]"), Some("price_premium"));
        assert_eq!(value(&params, "client_reference_id"), Some("user-1"));
        assert_eq!(value(&params, "subscription_data[metadata][user_id]"), Some("user-1"));
        assert_eq!(value(&params, "customer_email"), Some("a@example.com"));
        assert_eq!(value(&params, "customer"), None);
        assert_eq!(
            value(&params, "success_url"),
            Some("https://app.example.com/billing/success?session_id={CHECKOUT_SESSION_ID}")
        );
    }

    #[test]
    fn test_checkout_params_reuse_customer() {
        let params = checkout_params(
            &config(),
            &CheckoutRequest {
                user_id: "user-1",
                email: Some("a@example.com"),
                customer_id: Some("cus_123"),
            },
        );

        assert_eq!(value(&params, "customer"), Some("cus_123"));
        assert_eq!(value(&params, "customer_email"), None);
    }

    #[test]
    fn test_error_message_parsing() {
        let body = r#"{"error":{"type":"invalid_request_error","message":"No such price"}}"#;
        assert_eq!(error_message(body), "invalid_request_error: No such price");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}

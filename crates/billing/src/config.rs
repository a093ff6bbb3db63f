//! Stripe configuration.

use std::env;

use secrecy::{ExposeSecret, SecretString};

use crate::BillingError;

/// Default Stripe API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Configuration for Stripe checkout and webhooks.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe API base URL.
    pub api_base: String,
    /// Price the checkout session subscribes to.
    pub price_id: String,
    /// Where checkout sends the user after paying.
    pub success_url: String,
    /// Where checkout sends the user after cancelling.
    pub cancel_url: String,
    /// Where the billing portal returns to.
    pub portal_return_url: String,
    secret_key: SecretString,
    webhook_secret: SecretString,
}

impl StripeConfig {
    /// Create a configuration with explicit values and default URLs.
    pub fn new(
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        price_id: impl Into<String>,
        app_url: &str,
    ) -> Self {
        let app_url = app_url.trim_end_matches('/');
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            price_id: price_id.into(),
            success_url: format!("{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}", app_url),
            cancel_url: format!("{}/billing/cancelled", app_url),
            portal_return_url: format!("{}/account", app_url),
            secret_key: SecretString::from(secret_key.into()),
            webhook_secret: SecretString::from(webhook_secret.into()),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Required:
    /// - `STRIPE_SECRET_KEY` - API secret key
    /// - `STRIPE_WEBHOOK_SECRET` - Webhook endpoint signing secret (`whsec_...`)
    /// - `STRIPE_PRICE_ID` - Price for the premium subscription
    ///
    /// Optional (with defaults):
    /// - `APP_URL` - Default: http://localhost:3000
    /// - `STRIPE_API_BASE` - Default: https://api.stripe.com
    pub fn from_env() -> Result<Self, BillingError> {
        let secret_key = required("STRIPE_SECRET_KEY")?;
        let webhook_secret = required("STRIPE_WEBHOOK_SECRET")?;
        let price_id = required("STRIPE_PRICE_ID")?;
        let app_url = env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let mut config = Self::new(secret_key, webhook_secret, price_id, &app_url);
        if let Ok(api_base) = env::var("STRIPE_API_BASE") {
            config.api_base = api_base.trim_end_matches('/').to_string();
        }

        Ok(config)
    }

    /// The API secret key.
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }

    /// The webhook signing secret.
    pub fn webhook_secret(&self) -> &str {
        self.webhook_secret.expose_secret()
    }
}

fn required(key: &str) -> Result<String, BillingError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| BillingError::Config(format!("{} environment variable is required", key)))
}

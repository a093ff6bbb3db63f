//! Stripe billing for premium subscriptions.
//!
//! # Webhooks
//!
//! ```text
//! POST body + Stripe-Signature
//!     -> verify_signature()
//!     -> Event::from_slice()
//!     -> process_event()   (one transaction, idempotent by event id)
//!         -> billing_customers / billing_subscriptions
//!         -> premium_users, auth_claims, users (apply_premium_update)
//! ```
//!
//! # Checkout
//!
//! [`StripeClient`] creates checkout and billing-portal sessions with
//! form-encoded REST calls.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod signature;
pub mod webhook;

pub use client::{CheckoutLink, CheckoutRequest, StripeClient};
pub use config::StripeConfig;
pub use error::{BillingError, Result};
pub use events::{Event, WebhookEvent};
pub use signature::{sign_payload, verify_signature, DEFAULT_TOLERANCE_SECS};
pub use webhook::{process_event, ProcessOutcome};

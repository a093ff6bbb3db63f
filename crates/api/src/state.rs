//! Application state shared across handlers.

use std::sync::Arc;

use billing::StripeClient;
use database::Database;
use entitlements::UsagePolicy;
use secrecy::SecretString;
use sqlx::SqlitePool;

use crate::auth::{IdentityVerifier, TokenIssuer};
use crate::error::{ApiError, Result};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Database,
    /// Session metering policy.
    pub policy: UsagePolicy,
    /// App token issuer.
    pub tokens: TokenIssuer,
    /// Identity-provider token verifier.
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Stripe client, when billing is configured.
    pub stripe: Option<StripeClient>,
    /// Admin key, when admin routes are enabled.
    pub admin_key: Option<SecretString>,
}

impl AppState {
    /// Create new application state with billing and admin routes disabled.
    pub fn new(
        db: Database,
        policy: UsagePolicy,
        tokens: TokenIssuer,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            db,
            policy,
            tokens,
            verifier,
            stripe: None,
            admin_key: None,
        }
    }

    pub fn with_stripe(mut self, stripe: StripeClient) -> Self {
        self.stripe = Some(stripe);
        self
    }

    pub fn with_admin_key(mut self, key: SecretString) -> Self {
        self.admin_key = Some(key);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    /// The Stripe client, or 503 when billing is not configured.
    pub fn stripe(&self) -> Result<&StripeClient> {
        self.stripe
            .as_ref()
            .ok_or_else(|| ApiError::Unavailable("billing is not configured".to_string()))
    }
}

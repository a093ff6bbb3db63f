//! Billing routes: checkout, customer portal and the Stripe webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use billing::{process_event, verify_signature, CheckoutLink, CheckoutRequest, Event, ProcessOutcome};
use database::{billing as billing_store, user};
use entitlements::unix_now;
use serde::Serialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Header carrying the webhook signature.
const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: ProcessOutcome,
}

/// Start a premium subscription checkout for the signed-in user.
pub async fn checkout(State(state): State<AppState>, user: AuthUser) -> Result<Json<CheckoutLink>> {
    let stripe = state.stripe()?;

    let customer = billing_store::find_customer_by_user(state.pool(), user.user_id()).await?;
    let email = match user.0.email.clone() {
        Some(email) => Some(email),
        None => user::find_user(state.pool(), user.user_id())
            .await?
            .and_then(|record| record.email),
    };

    let link = stripe
        .create_checkout_session(CheckoutRequest {
            user_id: user.user_id(),
            email: email.as_deref(),
            customer_id: customer.as_ref().map(|c| c.stripe_customer_id.as_str()),
        })
        .await?;

    Ok(Json(link))
}

/// Open the billing portal for the signed-in user's customer.
pub async fn portal(State(state): State<AppState>, user: AuthUser) -> Result<Json<PortalResponse>> {
    let stripe = state.stripe()?;

    let customer = billing_store::find_customer_by_user(state.pool(), user.user_id())
        .await?
        .ok_or_else(|| ApiError::NotFound("no billing customer for this user".to_string()))?;

    let url = stripe.create_portal_session(&customer.stripe_customer_id).await?;
    Ok(Json(PortalResponse { url }))
}

/// Receive a Stripe webhook. The raw body is needed for signature checks.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let stripe = state.stripe()?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Stripe-Signature header".to_string()))?;

    let now = unix_now();
    verify_signature(
        &body,
        signature,
        stripe.config().webhook_secret(),
        now,
        billing::DEFAULT_TOLERANCE_SECS,
    )?;

    let event = Event::from_slice(&body)?;
    info!(event_id = %event.id, event_type = %event.event_type, livemode = event.livemode, "Received webhook");

    let outcome = process_event(state.pool(), &event, now).await?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}

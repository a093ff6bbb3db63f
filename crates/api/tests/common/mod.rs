//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use api::auth::{StaticVerifier, TokenIssuer, VerifiedIdentity, ADMIN_KEY_HEADER};
use api::AppState;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use billing::{StripeClient, StripeConfig};
use database::Database;
use entitlements::UsagePolicy;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

pub const ALICE_ID_TOKEN: &str = "id-token-alice";
pub const ALICE_UID: &str = "alice-uid";
pub const ADMIN_KEY: &str = "admin-secret";
pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub struct TestApp {
    pub router: Router,
    pub db: Database,
}

fn verifier() -> StaticVerifier {
    StaticVerifier::new().with_identity(
        ALICE_ID_TOKEN,
        VerifiedIdentity {
            uid: ALICE_UID.to_string(),
            email: Some("alice@example.com".to_string()),
            display_name: Some("Alice".to_string()),
        },
    )
}

async fn base_state() -> (AppState, Database) {
    let db = Database::in_memory().await.unwrap();
    let tokens = TokenIssuer::new(&SecretString::from("integration-secret".to_string()), 3600);
    let state = AppState::new(db.clone(), UsagePolicy::default(), tokens, Arc::new(verifier()));
    (state, db)
}

/// App with billing and admin routes enabled.
pub async fn test_app() -> TestApp {
    let (state, db) = base_state().await;

    // Nothing in the tests reaches the Stripe API.
    let mut stripe = StripeConfig::new("sk_test_123", WEBHOOK_SECRET, "price_premium", "http://localhost:3000");
    stripe.api_base = "http://127.0.0.1:9".to_string();

    let state = state
        .with_stripe(StripeClient::new(stripe).unwrap())
        .with_admin_key(SecretString::from(ADMIN_KEY.to_string()));

    TestApp {
        router: api::app(state, &[]),
        db,
    }
}

/// App started without Stripe or an admin key.
pub async fn bare_app() -> TestApp {
    let (state, db) = base_state().await;
    TestApp {
        router: api::app(state, &[]),
        db,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        // Extractor rejections answer in plain text
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, body: Value, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn admin_get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(ADMIN_KEY_HEADER, ADMIN_KEY)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn admin_post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(ADMIN_KEY_HEADER, ADMIN_KEY)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Sign in as Alice and return her app token.
    pub async fn sign_in(&self) -> String {
        let (status, body) = self
            .post(
                "/api/auth/token",
                serde_json::json!({ "idToken": ALICE_ID_TOKEN, "deviceFingerprint": "alice-laptop" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "sign-in failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }
}

mod common;

use axum::http::StatusCode;
use common::{test_app, ALICE_ID_TOKEN, ALICE_UID};
use database::{auth_claims, device, premium_user, user, AuthClaims, PremiumUser};
use entitlements::unix_now;
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, body) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn test_token_exchange_creates_user() {
    let app = test_app().await;

    let (status, body) = app
        .post(
            "/api/auth/token",
            json!({ "idToken": ALICE_ID_TOKEN, "deviceFingerprint": "alice-laptop" }),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresIn"], 3600);
    assert_eq!(body["user"]["id"], ALICE_UID);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["tier"], "limited");
    assert_eq!(body["premium"]["isPremium"], false);

    let stored = user::get_user(app.db.pool(), ALICE_UID).await.unwrap();
    assert_eq!(stored.display_name.as_deref(), Some("Alice"));

    let devices = device::list_devices(app.db.pool(), ALICE_UID).await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_fingerprint, "alice-laptop");
}

#[tokio::test]
async fn test_token_exchange_rejects_unknown_id_token() {
    let app = test_app().await;

    let (status, body) = app
        .post("/api/auth/token", json!({ "idToken": "forged" }), None)
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_token_exchange_rejects_bad_fingerprint() {
    let app = test_app().await;

    let (status, body) = app
        .post(
            "/api/auth/token",
            json!({ "idToken": ALICE_ID_TOKEN, "deviceFingerprint": "has spaces!" }),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn test_sign_in_corrects_unverifiable_claims() {
    let app = test_app().await;
    let now = unix_now();

    // A manually granted claim without a real subscription
    auth_claims::upsert_claims(
        app.db.pool(),
        &AuthClaims {
            user_id: ALICE_UID.to_string(),
            premium: true,
            stripe_role: Some("premium".to_string()),
            stripe_subscription_id: Some("sub_manual_grant".to_string()),
            updated_at: now,
        },
    )
    .await
    .unwrap();

    let token = app.sign_in().await;
    let (_, body) = app.get("/api/premium/status", Some(&token)).await;
    assert_eq!(body["isPremium"], false);
    assert_eq!(body["consistent"], true);

    let claims = auth_claims::get_claims(app.db.pool(), ALICE_UID)
        .await
        .unwrap()
        .unwrap();
    assert!(!claims.premium);
    assert!(claims.stripe_role.is_none());
}

#[tokio::test]
async fn test_me_and_premium_status() {
    let app = test_app().await;

    let (status, _) = app.get("/api/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/auth/me", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.sign_in().await;
    let (status, body) = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], ALICE_UID);
    assert_eq!(body["usage"]["usedSeconds"], 0);
    assert_eq!(body["usage"]["limitSeconds"], 3600);

    premium_user::upsert_premium_user(
        app.db.pool(),
        &PremiumUser {
            user_id: ALICE_UID.to_string(),
            email: None,
            is_premium: true,
            stripe_customer_id: Some("cus_123".to_string()),
            stripe_subscription_id: Some("sub_1PqR7sTuVwXyZ".to_string()),
            subscription_status: Some("active".to_string()),
            current_period_end: None,
            source: "webhook".to_string(),
            updated_at: unix_now(),
        },
    )
    .await
    .unwrap();

    let (status, body) = app.get("/api/premium/status", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isPremium"], true);
    assert_eq!(body["tier"], "premium");
    assert_eq!(body["source"], "premium_users");
    // Other copies have not caught up yet
    assert_eq!(body["consistent"], false);

    let (_, body) = app.get("/api/auth/me", Some(&token)).await;
    assert!(body["usage"]["limitSeconds"].is_null());
}

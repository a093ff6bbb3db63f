//! Identity-provider token verification.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{ApiError, Result};

/// Google's signing keys for Firebase ID tokens.
const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// How long fetched signing keys are reused.
const KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// A signed-in user as vouched for by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Verifies identity-provider ID tokens.
///
/// This trait is object-safe and is held as `Arc<dyn IdentityVerifier>`.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify an ID token and return the identity it asserts.
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

struct CachedKeys {
    fetched_at: Instant,
    keys: JwkSet,
}

/// Verifies Firebase Authentication ID tokens (RS256, Google-published keys).
pub struct FirebaseVerifier {
    http: Client,
    project_id: String,
    jwks_url: String,
    keys: RwLock<Option<CachedKeys>>,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            project_id: project_id.into(),
            jwks_url: FIREBASE_JWKS_URL.to_string(),
            keys: RwLock::new(None),
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation
    }

    /// Find the key for `kid`, refetching when the cache is stale or lacks it.
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        {
            let cache = self.keys.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < KEY_CACHE_TTL {
                    if let Some(jwk) = cached.keys.find(kid) {
                        return key_from_jwk(jwk);
                    }
                }
            }
        }

        let keys = self.fetch_keys().await?;
        let key = keys
            .find(kid)
            .map(key_from_jwk)
            .transpose()?
            .ok_or_else(|| ApiError::Unauthorized(format!("unknown signing key {}", kid)))?;

        *self.keys.write().await = Some(CachedKeys {
            fetched_at: Instant::now(),
            keys,
        });

        Ok(key)
    }

    async fn fetch_keys(&self) -> Result<JwkSet> {
        debug!("Fetching identity provider signing keys: {}", self.jwks_url);

        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to fetch signing keys: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Internal(format!(
                "signing key endpoint returned {}",
                response.status()
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("invalid signing key set: {}", e)))?;

        info!(keys = keys.keys.len(), "Refreshed identity provider signing keys");
        Ok(keys)
    }
}

fn key_from_jwk(jwk: &jsonwebtoken::jwk::Jwk) -> Result<DecodingKey> {
    DecodingKey::from_jwk(jwk).map_err(|e| ApiError::Internal(format!("unusable signing key: {}", e)))
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity> {
        let header = decode_header(id_token)
            .map_err(|e| ApiError::Unauthorized(format!("malformed ID token: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| ApiError::Unauthorized("ID token has no key id".to_string()))?;

        let key = self.decoding_key(&kid).await?;
        let claims = decode::<FirebaseClaims>(id_token, &key, &self.validation())
            .map_err(|e| ApiError::Unauthorized(format!("invalid ID token: {}", e)))?
            .claims;

        if claims.sub.is_empty() {
            return Err(ApiError::Unauthorized("ID token has no subject".to_string()));
        }

        Ok(VerifiedIdentity {
            uid: claims.sub,
            email: claims.email,
            display_name: claims.name,
        })
    }

    fn name(&self) -> &str {
        "firebase"
    }
}

/// Accepts a fixed set of tokens. For tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticVerifier {
    identities: HashMap<String, VerifiedIdentity>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as the given identity.
    pub fn with_identity(mut self, token: impl Into<String>, identity: VerifiedIdentity) -> Self {
        self.identities.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity> {
        self.identities
            .get(id_token)
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("unknown ID token".to_string()))
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(uid: &str) -> VerifiedIdentity {
        VerifiedIdentity {
            uid: uid.to_string(),
            email: Some(format!("{}@example.com", uid)),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticVerifier::new().with_identity("token-a", identity("alice"));

        assert_eq!(verifier.verify("token-a").await.unwrap().uid, "alice");
        assert!(matches!(
            verifier.verify("token-b").await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_firebase_rejects_malformed_tokens_without_fetching() {
        let verifier = FirebaseVerifier::new("demo-project").unwrap();
        assert!(matches!(
            verifier.verify("not.a.jwt").await,
            Err(ApiError::Unauthorized(_))
        ));
    }
}

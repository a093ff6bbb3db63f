//! App-issued HS256 bearer tokens.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Claims carried by an app token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppClaims {
    /// User id (identity provider uid).
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Premium status when the token was issued. Handlers re-resolve it.
    #[serde(default)]
    pub premium: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies app tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &SecretString, ttl_secs: i64) -> Self {
        let key = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Sign a token for a user.
    pub fn issue(&self, user_id: &str, email: Option<&str>, premium: bool, now: i64) -> Result<String> {
        let claims = AppClaims {
            sub: user_id.to_string(),
            email: email.map(str::to_string),
            premium,
            iat: now,
            exp: now + self.ttl_secs,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("failed to sign token: {}", e)))
    }

    /// Check signature and expiry.
    pub fn verify(&self, token: &str) -> Result<AppClaims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<AppClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| ApiError::Unauthorized(format!("invalid token: {}", e)))
    }
}

//! Request extractors for bearer and admin authentication.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use secrecy::ExposeSecret;

use crate::auth::token::AppClaims;
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the admin key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// A request with a valid app bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AppClaims);

impl AuthUser {
    pub fn user_id(&self) -> &str {
        &self.0.sub
    }
}

/// A request that may carry a bearer token. A token that is present must be valid.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AppClaims>);

impl OptionalAuthUser {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|claims| claims.sub.as_str())
    }
}

/// A request carrying the configured admin key.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("malformed authorization header".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("expected a bearer token".to_string()))?;

    Ok(Some(token))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        Ok(AuthUser(state.tokens.verify(token)?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(&parts.headers)? {
            Some(token) => Ok(OptionalAuthUser(Some(state.tokens.verify(token)?))),
            None => Ok(OptionalAuthUser(None)),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_key.as_ref() else {
            return Err(ApiError::Unauthorized("admin access is disabled".to_string()));
        };

        let provided = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing admin key".to_string()))?;

        if !constant_time_eq(provided.as_bytes(), expected.expose_secret().as_bytes()) {
            return Err(ApiError::Unauthorized("invalid admin key".to_string()));
        }

        Ok(AdminKey)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

//! Authentication.
//!
//! Clients exchange an identity-provider ID token for an app token at
//! `POST /api/auth/token`, then send it as `Authorization: Bearer <token>`.
//! Admin routes use the `X-Admin-Key` header instead.

pub mod extract;
pub mod token;
pub mod verifier;

pub use extract::{AdminKey, AuthUser, OptionalAuthUser, ADMIN_KEY_HEADER};
pub use token::{AppClaims, TokenIssuer};
pub use verifier::{FirebaseVerifier, IdentityVerifier, StaticVerifier, VerifiedIdentity};

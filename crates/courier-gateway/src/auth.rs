//! Bearer-token verification at the HTTP boundary.
//!
//! The gateway never issues tokens; the auth service does, over the bus.
//! Here we only check what a presented token claims: signature, expiry,
//! issuer, audience, and the user id it vouches for.

use courier_core::ids::UserId;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Scheme prefix expected on the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Claims carried by client tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated account id.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
    /// Issuer.
    pub iss: String,
    /// Audience.
    pub aud: String,
}

/// Why a presented credential was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization: Bearer …` header on the request.
    #[error("missing bearer token")]
    MissingToken,
    /// Signature, expiry, issuer, audience or claim-shape check failed.
    #[error("token is not valid or has expired")]
    InvalidToken,
}

/// Verifies bearer tokens and yields the authenticated user id.
pub trait TokenVerifier: Send + Sync {
    /// Check `token` and return the user id it vouches for.
    fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

/// HS256 verifier matching the auth service's signing setup.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Build a verifier for the shared secret and the expected issuer and
    /// audience.
    #[must_use]
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|error| {
            debug!(%error, "token rejected");
            AuthError::InvalidToken
        })?;
        Ok(UserId::from(data.claims.user_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

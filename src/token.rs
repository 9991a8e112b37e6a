//! Bearer token verification — HS256 JWT decoding with optional signature check
//!
//! Two modes, fixed at construction:
//!
//! - **Verified** (`verify_signature: true`): HS256 signature and the standard
//!   `exp` claim are validated via `jsonwebtoken`. Requires a configured secret.
//! - **Trusted-network** (`verify_signature: false`): the payload is decoded
//!   without any signature check. This is an explicit trust boundary, used only
//!   when a gateway has already authenticated the request before it reached us.

use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde::Deserialize;

use crate::config::TokenConfig;
use crate::error::{Error, Result, TokenErrorKind};

/// Claims extracted from a bearer token
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Subject — maps to `Identity.user_id`
    pub sub: String,
    /// Login name — maps to `Identity.username`
    #[serde(default)]
    pub name: Option<String>,
    /// Display name
    #[serde(default)]
    pub full_name: Option<String>,
    /// Role names
    #[serde(default)]
    pub roles: HashSet<String>,
    /// Permission strings carried in the token
    #[serde(default)]
    pub permissions: HashSet<String>,
    /// Platform administrator flag
    #[serde(default)]
    pub is_admin: bool,
    /// Expiry (Unix timestamp)
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Decodes and optionally verifies HS256 bearer tokens
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    secret: Option<String>,
    verify_signature: bool,
}

impl TokenVerifier {
    /// Create a verifier from token configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when signature verification is requested
    /// without a secret.
    pub fn new(config: &TokenConfig) -> Result<Self> {
        if config.verify_signature && config.jwt_secret.is_none() {
            return Err(Error::Config(
                "signature verification requires token.jwt_secret".into(),
            ));
        }
        Ok(Self {
            secret: config.jwt_secret.clone(),
            verify_signature: config.verify_signature,
        })
    }

    /// Decode a bearer token into claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenInvalid`] with kind `Expired`, `BadSignature`,
    /// or `Malformed`.
    pub fn decode(&self, token: &str) -> Result<TokenClaims> {
        if self.verify_signature {
            self.decode_verified(token)
        } else {
            decode_unverified(token)
        }
    }

    fn decode_verified(&self, token: &str) -> Result<TokenClaims> {
        // Reject anything other than HS256 up front; a token naming a
        // different algorithm is malformed from our point of view.
        let header = jsonwebtoken::decode_header(token)
            .map_err(|_| Error::TokenInvalid(TokenErrorKind::Malformed))?;
        if header.alg != Algorithm::HS256 {
            return Err(Error::TokenInvalid(TokenErrorKind::Malformed));
        }

        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| Error::Config("jwt_secret not configured".into()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is the only standard claim these tokens carry
        validation.required_spec_claims = std::iter::once("exp".to_string()).collect();

        let data = jsonwebtoken::decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => Error::TokenInvalid(TokenErrorKind::Expired),
            ErrorKind::InvalidSignature => Error::TokenInvalid(TokenErrorKind::BadSignature),
            _ => Error::TokenInvalid(TokenErrorKind::Malformed),
        })?;

        Ok(data.claims)
    }
}

/// Decode the payload of a JWT without verifying the signature.
fn decode_unverified(token: &str) -> Result<TokenClaims> {
    let parts: Vec<&str> = token.splitn(3, '.').collect();
    if parts.len() < 2 {
        return Err(Error::TokenInvalid(TokenErrorKind::Malformed));
    }

    let payload = base64::Engine::decode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        parts[1],
    )
    .map_err(|_| Error::TokenInvalid(TokenErrorKind::Malformed))?;

    serde_json::from_slice::<TokenClaims>(&payload)
        .map_err(|_| Error::TokenInvalid(TokenErrorKind::Malformed))
}

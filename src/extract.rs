//! Credential extraction — trust-source headers to normalized identity
//!
//! Three trust sources are recognized, in precedence order:
//!
//! 1. **Gateway headers** (`X-User-Id` and friends) — injected by the gateway
//!    after it authenticated the caller; the most trusted source.
//! 2. **Internal service token** (`X-Internal-Auth`) — base64 JSON asserted by
//!    a peer service on the internal network.
//! 3. **Bearer token** (`Authorization: Bearer ...`) — self-asserted by the
//!    caller, decoded by [`TokenVerifier`].
//!
//! Gateway-terminated traffic is trusted over self-asserted tokens, so the
//! gateway path wins whenever `X-User-Id` is present.

use std::collections::HashSet;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identity::{CredentialSource, Identity};
use crate::token::TokenVerifier;

/// Header names injected by the gateway
pub mod headers {
    /// Stable user identifier (required for the gateway path)
    pub const USER_ID: &str = "X-User-Id";
    /// Login name
    pub const USER_NAME: &str = "X-User-Name";
    /// Display name, base64-encoded UTF-8
    pub const USER_FULL_NAME: &str = "X-User-Full-Name";
    /// Comma-separated role names
    pub const USER_ROLES: &str = "X-User-Service-Roles";
    /// Comma-separated permission strings
    pub const USER_PERMISSIONS: &str = "X-User-Service-Permissions";
    /// `"true"` (case-insensitive) marks a platform administrator
    pub const USER_ADMIN: &str = "X-User-Admin";
    /// Base64 JSON internal service token
    pub const INTERNAL_AUTH: &str = "X-Internal-Auth";
    /// Standard bearer token header
    pub const AUTHORIZATION: &str = "Authorization";
}

/// Read-only view of inbound request headers with case-insensitive lookup
pub trait RequestHeaders {
    /// Get a header value by name (ASCII case-insensitive)
    fn get(&self, name: &str) -> Option<&str>;
}

impl RequestHeaders for std::collections::HashMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Payload of an `X-Internal-Auth` token
#[derive(Debug, Deserialize)]
struct InternalToken {
    user_id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    roles: HashSet<String>,
    #[serde(default)]
    permissions: HashSet<String>,
    #[serde(default)]
    is_admin: bool,
}

/// Extracts a normalized [`Identity`] from inbound request headers
pub struct CredentialExtractor {
    verifier: TokenVerifier,
}

impl CredentialExtractor {
    /// Create an extractor using the given verifier for the bearer-token path
    #[must_use]
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// Extract an identity from the request headers.
    ///
    /// `Ok(None)` means no recognized credential was presented — the request
    /// is anonymous, not in error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCredential`] for a bad internal token and
    /// [`Error::TokenInvalid`] for a rejected bearer token. Both degrade to
    /// anonymous at the request boundary.
    pub fn extract<H: RequestHeaders>(&self, headers: &H) -> Result<Option<Identity>> {
        // Gateway path wins whenever a non-empty X-User-Id is present
        if let Some(user_id) = headers.get(headers::USER_ID) {
            if !user_id.is_empty() {
                return Ok(Some(Self::from_gateway_headers(user_id, headers)));
            }
        }

        if let Some(token) = headers.get(headers::INTERNAL_AUTH) {
            return Ok(Some(Self::from_internal_token(token)?));
        }

        if let Some(auth) = headers.get(headers::AUTHORIZATION) {
            if let Some(token) = strip_bearer(auth) {
                return Ok(Some(self.from_bearer_token(token)?));
            }
        }

        Ok(None)
    }

    fn from_gateway_headers<H: RequestHeaders>(user_id: &str, headers: &H) -> Identity {
        let username = headers.get(headers::USER_NAME).unwrap_or("").to_string();

        // Decode failure here must never fail the request; the display name
        // is cosmetic. An absent header falls back to the username.
        let full_name = headers
            .get(headers::USER_FULL_NAME)
            .map_or_else(|| username.clone(), decode_base64_utf8);

        let roles = headers
            .get(headers::USER_ROLES)
            .map(split_csv)
            .unwrap_or_default();
        let permissions = headers
            .get(headers::USER_PERMISSIONS)
            .map(split_csv)
            .unwrap_or_default();

        let is_admin = headers
            .get(headers::USER_ADMIN)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Identity {
            user_id: user_id.to_string(),
            username,
            full_name,
            roles,
            permissions,
            is_admin,
            source: CredentialSource::GatewayHeaders,
        }
    }

    fn from_internal_token(token: &str) -> Result<Identity> {
        let decoded = BASE64
            .decode(token.trim())
            .map_err(|e| Error::MalformedCredential(format!("internal token base64: {e}")))?;
        let json = String::from_utf8(decoded)
            .map_err(|_| Error::MalformedCredential("internal token is not UTF-8".into()))?;
        let payload: InternalToken = serde_json::from_str(&json)
            .map_err(|e| Error::MalformedCredential(format!("internal token JSON: {e}")))?;

        debug!(user_id = %payload.user_id, "Extracted identity from internal token");

        let username = payload.username.unwrap_or_default();
        Ok(Identity {
            full_name: payload.full_name.unwrap_or_else(|| username.clone()),
            user_id: payload.user_id,
            username,
            roles: payload.roles,
            permissions: payload.permissions,
            is_admin: payload.is_admin,
            source: CredentialSource::InternalToken,
        })
    }

    fn from_bearer_token(&self, token: &str) -> Result<Identity> {
        let claims = self.verifier.decode(token)?;

        debug!(user_id = %claims.sub, "Extracted identity from bearer token");

        let username = claims.name.unwrap_or_default();
        Ok(Identity {
            full_name: claims.full_name.unwrap_or_else(|| username.clone()),
            user_id: claims.sub,
            username,
            roles: claims.roles,
            permissions: claims.permissions,
            is_admin: claims.is_admin,
            source: CredentialSource::Jwt,
        })
    }
}

/// Strip a `Bearer ` prefix (either case) from an Authorization value
fn strip_bearer(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
}

/// Base64-decode a header value to UTF-8; failures yield the empty string
fn decode_base64_utf8(value: &str) -> String {
    BASE64
        .decode(value)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

/// Split a comma-separated value, trimming segments and dropping empty ones
fn split_csv(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

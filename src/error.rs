//! Error types for the auth connector

use thiserror::Error;

/// Result type alias for the auth connector
pub type Result<T> = std::result::Result<T, Error>;

/// Sub-kind for a rejected bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorKind {
    /// Token `exp` claim is in the past
    Expired,
    /// Signature did not verify against the configured secret
    BadSignature,
    /// Structurally invalid token, or an algorithm other than HS256
    Malformed,
    /// Rejected by the remote auth service during validation
    Rejected,
}

impl std::fmt::Display for TokenErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Expired => "expired",
            Self::BadSignature => "bad signature",
            Self::Malformed => "malformed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Auth connector errors
#[derive(Error, Debug)]
pub enum Error {
    /// Bad encoding in a trust header. Callers treat the request as
    /// unauthenticated, not as a server error.
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    /// Bearer token rejected
    #[error("Invalid token: {0}")]
    TokenInvalid(TokenErrorKind),

    /// Remote auth service or registry call failed or timed out
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Authorization decision was Deny, surfaced at a request boundary
    #[error("Permission denied: {permission} for user {user_id}")]
    PermissionDenied {
        /// The permission that was required
        permission: String,
        /// The user the decision was made for
        user_id: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted on a deregistered service session
    #[error("Service session is deregistered")]
    SessionClosed,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::ServiceUnavailable(e.to_string())
    }
}

impl Error {
    /// True when the error means "proceed unauthenticated" rather than
    /// "fail the request": bad trust-header encodings and rejected tokens
    /// degrade to anonymous before the decision engine runs.
    #[must_use]
    pub fn degrades_to_anonymous(&self) -> bool {
        matches!(self, Self::MalformedCredential(_) | Self::TokenInvalid(_))
    }
}

//! Axum adapter — identity extraction middleware and decision responses
//!
//! The core consumes a header mapping and produces [`Decision`] values; this
//! module is the thin binding between those contracts and axum. Hosts layer
//! [`identity_middleware`] onto their router, read [`CurrentUser`] from
//! request extensions, and map engine decisions to responses with
//! [`decision_response`].

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::engine::{Decision, DenyReason, PermissionExpression};
use crate::extract::{CredentialExtractor, RequestHeaders};
use crate::identity::Identity;

impl RequestHeaders for http::HeaderMap {
    fn get(&self, name: &str) -> Option<&str> {
        // HeaderMap lookup is already case-insensitive
        http::HeaderMap::get(self, name).and_then(|v| v.to_str().ok())
    }
}

/// The identity extracted for the current request, stored as a request
/// extension. `None` means the request is anonymous.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<Identity>);

/// Identity extraction middleware.
///
/// Runs credential extraction on every request and stores the result as a
/// [`CurrentUser`] extension. Malformed credentials and rejected tokens
/// degrade to anonymous; they never fail the request here — the decision
/// engine denies later if the route requires authentication.
pub async fn identity_middleware(
    State(extractor): State<Arc<CredentialExtractor>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let current = match extractor.extract(request.headers()) {
        Ok(identity) => CurrentUser(identity),
        Err(e) => {
            debug_assert!(e.degrades_to_anonymous());
            warn!(error = %e, "Credential rejected; proceeding anonymous");
            CurrentUser(None)
        }
    };

    if let CurrentUser(Some(identity)) = &current {
        debug!(user_id = %identity.user_id, source = ?identity.source, "Request authenticated");
    }

    request.extensions_mut().insert(current);
    next.run(request).await
}

/// Map an engine decision to an HTTP response for `required`.
///
/// `Ok(())` when allowed; otherwise the 401/403/503 response to return.
///
/// # Errors
///
/// Returns the deny response as `Err` so handlers can use `?`.
pub fn decision_response(
    decision: Decision,
    required: &PermissionExpression,
) -> Result<(), Response> {
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(DenyReason::Unauthenticated) => Err((
            StatusCode::UNAUTHORIZED,
            [("WWW-Authenticate", "Bearer")],
            Json(json!({
                "error": "Authentication required",
                "code": "AUTH_REQUIRED"
            })),
        )
            .into_response()),
        Decision::Deny(DenyReason::PermissionMissing) => Err((
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": format!("Permission denied: {}", required.describe()),
                "code": "PERMISSION_DENIED",
                "required_permission": required.describe()
            })),
        )
            .into_response()),
        Decision::Deny(DenyReason::ServiceUnavailable) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "Authorization service unavailable",
                "code": "AUTH_UNAVAILABLE"
            })),
        )
            .into_response()),
    }
}

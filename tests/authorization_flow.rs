//! End-to-end authorization flow tests
//!
//! Drives the public API the way a host service does: inbound headers through
//! credential extraction into the decision engine, with a scripted permission
//! source standing in for the auth service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use pretty_assertions::assert_eq;

use auth_connector::config::TokenConfig;
use auth_connector::{
    AuthDecisionEngine, CredentialExtractor, Decision, DenyReason, Error, PermissionCache,
    PermissionExpression, PermissionSource, TokenVerifier, UnavailablePolicy,
};

/// Permission source with fixed per-user permission sets
struct TableSource {
    table: HashMap<String, HashSet<String>>,
    down: bool,
}

impl TableSource {
    fn new(entries: &[(&str, &[&str])]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(user, perms)| {
                    (
                        (*user).to_string(),
                        perms.iter().map(ToString::to_string).collect(),
                    )
                })
                .collect(),
            down: false,
        }
    }

    fn down() -> Self {
        Self {
            table: HashMap::new(),
            down: true,
        }
    }
}

#[async_trait]
impl PermissionSource for TableSource {
    async fn fetch_user_permissions(&self, user_id: &str) -> auth_connector::Result<HashSet<String>> {
        if self.down {
            return Err(Error::ServiceUnavailable("request timed out".into()));
        }
        Ok(self.table.get(user_id).cloned().unwrap_or_default())
    }
}

fn extractor() -> CredentialExtractor {
    CredentialExtractor::new(
        TokenVerifier::new(&TokenConfig {
            jwt_secret: None,
            verify_signature: false,
        })
        .unwrap(),
    )
}

fn engine(source: TableSource, policy: UnavailablePolicy) -> AuthDecisionEngine {
    AuthDecisionEngine::new(
        Arc::new(PermissionCache::new()),
        Arc::new(source),
        Duration::from_secs(60),
        policy,
    )
}

fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Gateway admin headers pass any requirement under allow_admin
#[tokio::test]
async fn admin_headers_bypass_permission_check() {
    let h = headers(&[("X-User-Id", "u1"), ("X-User-Admin", "true")]);
    let identity = extractor().extract(&h).unwrap();

    let engine = engine(TableSource::new(&[]), UnavailablePolicy::FailClosed);
    let decision = engine
        .authorize(
            identity.as_ref(),
            &PermissionExpression::single("svc.admin.manage"),
            true,
        )
        .await;

    assert_eq!(decision, Decision::Allow);
}

/// Internal token carrying only svc.read is denied svc.write
#[tokio::test]
async fn internal_token_missing_permission_is_denied() {
    let token = BASE64.encode(r#"{"user_id":"u2","permissions":["svc.read"]}"#);
    let h = headers(&[("X-Internal-Auth", &token)]);
    let identity = extractor().extract(&h).unwrap();

    let engine = engine(TableSource::new(&[]), UnavailablePolicy::FailClosed);
    let decision = engine
        .authorize(
            identity.as_ref(),
            &PermissionExpression::single("svc.write"),
            true,
        )
        .await;

    assert_eq!(decision, Decision::Deny(DenyReason::PermissionMissing));
}

/// No recognized credential means anonymous, which the engine denies
#[tokio::test]
async fn anonymous_request_is_unauthenticated() {
    let identity = extractor().extract(&headers(&[])).unwrap();
    assert!(identity.is_none());

    let engine = engine(TableSource::new(&[]), UnavailablePolicy::FailClosed);
    let decision = engine
        .authorize(
            identity.as_ref(),
            &PermissionExpression::single("svc.read"),
            true,
        )
        .await;

    assert_eq!(decision, Decision::Deny(DenyReason::Unauthenticated));
}

/// A malformed internal token degrades to anonymous at the boundary
#[tokio::test]
async fn malformed_internal_token_degrades_to_anonymous() {
    let h = headers(&[("X-Internal-Auth", "!!not-base64!!")]);
    let err = extractor().extract(&h).unwrap_err();
    assert!(err.degrades_to_anonymous());

    // The boundary then authorizes with no identity
    let engine = engine(TableSource::new(&[]), UnavailablePolicy::FailClosed);
    let decision = engine
        .authorize(None, &PermissionExpression::single("svc.read"), true)
        .await;
    assert_eq!(decision, Decision::Deny(DenyReason::Unauthenticated));
}

/// Gateway headers without inline permissions resolve through the remote
/// source, and the second request is served from cache
#[tokio::test]
async fn remote_permissions_resolve_and_cache() {
    let h = headers(&[("X-User-Id", "u3"), ("X-User-Name", "carol")]);
    let identity = extractor().extract(&h).unwrap();

    let cache = Arc::new(PermissionCache::new());
    let engine = AuthDecisionEngine::new(
        Arc::clone(&cache),
        Arc::new(TableSource::new(&[("u3", &["reports.view"])])),
        Duration::from_secs(60),
        UnavailablePolicy::FailClosed,
    );

    let required = PermissionExpression::single("reports.view");
    assert_eq!(
        engine.authorize(identity.as_ref(), &required, true).await,
        Decision::Allow
    );
    assert_eq!(
        engine.authorize(identity.as_ref(), &required, true).await,
        Decision::Allow
    );

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 1);
}

/// Fail-closed and fail-open behave exactly as documented when the source
/// is unreachable
#[tokio::test]
async fn unavailability_policies() {
    let h = headers(&[("X-User-Id", "u4")]);
    let identity = extractor().extract(&h).unwrap();
    let required = PermissionExpression::single("svc.read");

    let closed = engine(TableSource::down(), UnavailablePolicy::FailClosed);
    assert_eq!(
        closed.authorize(identity.as_ref(), &required, true).await,
        Decision::Deny(DenyReason::ServiceUnavailable)
    );

    // Fail-open evaluates the empty set: a non-empty requirement still denies
    let open = engine(TableSource::down(), UnavailablePolicy::FailOpen);
    assert_eq!(
        open.authorize(identity.as_ref(), &required, true).await,
        Decision::Deny(DenyReason::PermissionMissing)
    );

    // The empty disjunction is the only requirement that passes
    let open = engine(TableSource::down(), UnavailablePolicy::FailOpen);
    assert_eq!(
        open.authorize(
            identity.as_ref(),
            &PermissionExpression::any_of(Vec::<String>::new()),
            true
        )
        .await,
        Decision::Allow
    );
}

/// A cached entry outlives a source outage until its TTL passes
#[tokio::test]
async fn cache_covers_source_outage_within_ttl() {
    let h = headers(&[("X-User-Id", "u5")]);
    let identity = extractor().extract(&h).unwrap();
    let required = PermissionExpression::single("svc.read");

    let cache = Arc::new(PermissionCache::new());
    cache.put(
        "u5",
        std::iter::once("svc.read".to_string()).collect(),
        Duration::from_secs(60),
    );

    let engine = AuthDecisionEngine::new(
        Arc::clone(&cache),
        Arc::new(TableSource::down()),
        Duration::from_secs(60),
        UnavailablePolicy::FailClosed,
    );

    assert_eq!(
        engine.authorize(identity.as_ref(), &required, true).await,
        Decision::Allow
    );
}

//! Authorization decision engine
//!
//! Resolves allow/deny for a required permission expression against a
//! normalized identity. Permission sets carried inline with the credential are
//! used directly; otherwise the engine consults the [`PermissionCache`] and,
//! on a miss, the remote [`PermissionSource`]. The engine never mutates an
//! identity and holds no per-request state, so concurrent requests do not
//! interfere.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::Result;
use crate::cache::PermissionCache;
use crate::config::UnavailablePolicy;
use crate::identity::Identity;

/// A permission requirement: one permission, or any of a list.
///
/// Permission strings are free-form dotted names (`service.resource.action`);
/// the engine compares exact strings and never parses structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionExpression {
    /// Membership test for a single permission
    Single(String),
    /// True when the identity holds at least one listed permission.
    /// The empty disjunction requires nothing and evaluates to true.
    AnyOf(Vec<String>),
}

impl PermissionExpression {
    /// Build a single-permission requirement
    pub fn single(permission: impl Into<String>) -> Self {
        Self::Single(permission.into())
    }

    /// Build an any-of requirement
    pub fn any_of<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(permissions.into_iter().map(Into::into).collect())
    }

    /// Evaluate this expression against a permission set
    #[must_use]
    pub fn evaluate(&self, held: &HashSet<String>) -> bool {
        match self {
            Self::Single(p) => held.contains(p),
            Self::AnyOf(list) => list.is_empty() || list.iter().any(|p| held.contains(p)),
        }
    }

    /// Human-readable form for deny reasons and logging
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Single(p) => p.clone(),
            Self::AnyOf(list) => format!("any of [{}]", list.join(", ")),
        }
    }
}

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No identity was presented
    Unauthenticated,
    /// The identity does not hold the required permission
    PermissionMissing,
    /// The remote permission source was unreachable under fail-closed policy
    ServiceUnavailable,
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed
    Allow,
    /// The request is rejected
    Deny(DenyReason),
}

impl Decision {
    /// True when the decision is [`Decision::Allow`]
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Remote source of per-user permission sets.
///
/// Implemented by [`AuthClient`](crate::client::AuthClient); tests substitute
/// scripted fakes.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Fetch the permission set a user holds for this service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceUnavailable`](crate::Error::ServiceUnavailable)
    /// when the source cannot be reached.
    async fn fetch_user_permissions(&self, user_id: &str) -> Result<HashSet<String>>;
}

/// Resolves authorization decisions for extracted identities
pub struct AuthDecisionEngine {
    cache: Arc<PermissionCache>,
    source: Arc<dyn PermissionSource>,
    cache_ttl: Duration,
    on_unavailable: UnavailablePolicy,
}

impl AuthDecisionEngine {
    /// Create an engine over a cache and remote permission source.
    ///
    /// The unavailability policy is fixed here; it never varies per request.
    #[must_use]
    pub fn new(
        cache: Arc<PermissionCache>,
        source: Arc<dyn PermissionSource>,
        cache_ttl: Duration,
        on_unavailable: UnavailablePolicy,
    ) -> Self {
        Self {
            cache,
            source,
            cache_ttl,
            on_unavailable,
        }
    }

    /// Decide whether `identity` satisfies `required`.
    ///
    /// `allow_admin` short-circuits to `Allow` for platform administrators
    /// before any permission lookup.
    pub async fn authorize(
        &self,
        identity: Option<&Identity>,
        required: &PermissionExpression,
        allow_admin: bool,
    ) -> Decision {
        let Some(identity) = identity else {
            return Decision::Deny(DenyReason::Unauthenticated);
        };

        if allow_admin && identity.is_admin {
            debug!(user_id = %identity.user_id, "Admin bypass");
            return Decision::Allow;
        }

        // Permissions that arrived inline with the credential are
        // authoritative for this request; no lookup.
        if !identity.permissions.is_empty() {
            return evaluate(required, &identity.permissions);
        }

        if let Some(cached) = self.cache.get(&identity.user_id) {
            return evaluate(required, &cached);
        }

        match self.source.fetch_user_permissions(&identity.user_id).await {
            Ok(fetched) => {
                self.cache
                    .put(&identity.user_id, fetched.clone(), self.cache_ttl);
                evaluate(required, &fetched)
            }
            Err(e) => {
                warn!(
                    user_id = %identity.user_id,
                    error = %e,
                    policy = ?self.on_unavailable,
                    "Permission fetch failed"
                );
                match self.on_unavailable {
                    UnavailablePolicy::FailClosed => {
                        Decision::Deny(DenyReason::ServiceUnavailable)
                    }
                    UnavailablePolicy::FailOpen => evaluate(required, &HashSet::new()),
                }
            }
        }
    }
}

fn evaluate(required: &PermissionExpression, held: &HashSet<String>) -> Decision {
    if required.evaluate(held) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::PermissionMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::identity::CredentialSource;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn identity(user_id: &str, permissions: &[&str], is_admin: bool) -> Identity {
        Identity {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            full_name: user_id.to_string(),
            roles: HashSet::new(),
            permissions: permissions.iter().map(ToString::to_string).collect(),
            is_admin,
            source: CredentialSource::GatewayHeaders,
        }
    }

    /// Fake source returning a fixed set, counting calls
    struct FixedSource {
        permissions: HashSet<String>,
        calls: AtomicU64,
    }

    impl FixedSource {
        fn new(permissions: &[&str]) -> Self {
            Self {
                permissions: permissions.iter().map(ToString::to_string).collect(),
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl PermissionSource for FixedSource {
        async fn fetch_user_permissions(&self, _user_id: &str) -> Result<HashSet<String>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.permissions.clone())
        }
    }

    /// Fake source that always fails
    struct DownSource;

    #[async_trait]
    impl PermissionSource for DownSource {
        async fn fetch_user_permissions(&self, _user_id: &str) -> Result<HashSet<String>> {
            Err(Error::ServiceUnavailable("connection refused".into()))
        }
    }

    fn engine(source: Arc<dyn PermissionSource>, policy: UnavailablePolicy) -> AuthDecisionEngine {
        AuthDecisionEngine::new(
            Arc::new(PermissionCache::new()),
            source,
            Duration::from_secs(60),
            policy,
        )
    }

    #[tokio::test]
    async fn test_no_identity_is_unauthenticated() {
        let engine = engine(Arc::new(DownSource), UnavailablePolicy::FailClosed);
        let decision = engine
            .authorize(None, &PermissionExpression::single("svc.read"), true)
            .await;
        assert_eq!(decision, Decision::Deny(DenyReason::Unauthenticated));
    }

    #[tokio::test]
    async fn test_admin_bypass() {
        // Source is down; the bypass must not touch it
        let engine = engine(Arc::new(DownSource), UnavailablePolicy::FailClosed);
        let admin = identity("u1", &[], true);
        let decision = engine
            .authorize(
                Some(&admin),
                &PermissionExpression::single("svc.admin.manage"),
                true,
            )
            .await;
        assert_eq!(decision, Decision::Allow);
    }

    #[tokio::test]
    async fn test_admin_without_allow_admin_is_checked_normally() {
        let engine = engine(
            Arc::new(FixedSource::new(&[])),
            UnavailablePolicy::FailClosed,
        );
        let admin = identity("u1", &[], true);
        let decision = engine
            .authorize(Some(&admin), &PermissionExpression::single("svc.read"), false)
            .await;
        assert_eq!(decision, Decision::Deny(DenyReason::PermissionMissing));
    }

    #[tokio::test]
    async fn test_inline_permissions_skip_remote() {
        let source = Arc::new(FixedSource::new(&["ignored.perm"]));
        let engine = engine(
            Arc::clone(&source) as Arc<dyn PermissionSource>,
            UnavailablePolicy::FailClosed,
        );

        let id = identity("u2", &["svc.read"], false);
        let allow = engine
            .authorize(Some(&id), &PermissionExpression::single("svc.read"), true)
            .await;
        let deny = engine
            .authorize(Some(&id), &PermissionExpression::single("svc.write"), true)
            .await;

        assert_eq!(allow, Decision::Allow);
        assert_eq!(deny, Decision::Deny(DenyReason::PermissionMissing));
        assert_eq!(source.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_remote_fetch_populates_cache() {
        let source = Arc::new(FixedSource::new(&["svc.read"]));
        let engine = engine(
            Arc::clone(&source) as Arc<dyn PermissionSource>,
            UnavailablePolicy::FailClosed,
        );
        let id = identity("u3", &[], false);
        let required = PermissionExpression::single("svc.read");

        assert_eq!(engine.authorize(Some(&id), &required, true).await, Decision::Allow);
        assert_eq!(engine.authorize(Some(&id), &required, true).await, Decision::Allow);

        // Second call served from cache
        assert_eq!(source.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fail_closed() {
        let engine = engine(Arc::new(DownSource), UnavailablePolicy::FailClosed);
        let id = identity("u4", &[], false);
        let decision = engine
            .authorize(Some(&id), &PermissionExpression::single("svc.read"), true)
            .await;
        assert_eq!(decision, Decision::Deny(DenyReason::ServiceUnavailable));
    }

    #[tokio::test]
    async fn test_fail_open_evaluates_empty_set() {
        let engine = engine(Arc::new(DownSource), UnavailablePolicy::FailOpen);
        let id = identity("u5", &[], false);

        // Any non-empty requirement still denies
        let decision = engine
            .authorize(Some(&id), &PermissionExpression::single("svc.read"), true)
            .await;
        assert_eq!(decision, Decision::Deny(DenyReason::PermissionMissing));

        // Only the empty disjunction passes
        let decision = engine
            .authorize(Some(&id), &PermissionExpression::any_of(Vec::<String>::new()), true)
            .await;
        assert_eq!(decision, Decision::Allow);
    }

    #[tokio::test]
    async fn test_any_of_expression() {
        let engine = engine(
            Arc::new(FixedSource::new(&["svc.read"])),
            UnavailablePolicy::FailClosed,
        );
        let id = identity("u6", &[], false);

        let decision = engine
            .authorize(
                Some(&id),
                &PermissionExpression::any_of(["svc.write", "svc.read"]),
                true,
            )
            .await;
        assert_eq!(decision, Decision::Allow);

        let decision = engine
            .authorize(
                Some(&id),
                &PermissionExpression::any_of(["svc.write", "svc.delete"]),
                true,
            )
            .await;
        assert_eq!(decision, Decision::Deny(DenyReason::PermissionMissing));
    }

    #[test]
    fn test_expression_describe() {
        assert_eq!(PermissionExpression::single("a.b").describe(), "a.b");
        assert_eq!(
            PermissionExpression::any_of(["a.b", "c.d"]).describe(),
            "any of [a.b, c.d]"
        );
    }
}

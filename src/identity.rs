//! Normalized caller identity
//!
//! An [`Identity`] is the single representation of "who is calling",
//! regardless of which trust source produced it. It is constructed once per
//! request by credential extraction and never mutated or persisted afterwards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Trust source that produced an identity. Exactly one extraction path
/// constructs each identity, so the source is always unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Gateway-injected `X-User-*` headers (gateway-terminated traffic)
    GatewayHeaders,
    /// Bearer token in the `Authorization` header
    Jwt,
    /// `X-Internal-Auth` service-to-service token
    InternalToken,
}

/// Normalized caller identity extracted from an inbound request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier
    pub user_id: String,
    /// Login name
    pub username: String,
    /// Display name; falls back to the username when the source carries none
    pub full_name: String,
    /// Role names granted to the user
    pub roles: HashSet<String>,
    /// Permission strings carried inline with the credential. May be empty,
    /// in which case the decision engine resolves permissions remotely.
    pub permissions: HashSet<String>,
    /// Whether the user is a platform administrator
    pub is_admin: bool,
    /// Which trust source produced this identity
    pub source: CredentialSource,
}

impl Identity {
    /// Check whether the identity holds a specific permission
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Check whether the identity holds any of the given permissions
    #[must_use]
    pub fn has_any_permission<I, S>(&self, permissions: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        permissions
            .into_iter()
            .any(|p| self.permissions.contains(p.as_ref()))
    }

    /// Check whether the identity holds all of the given permissions
    #[must_use]
    pub fn has_all_permissions<I, S>(&self, permissions: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        permissions
            .into_iter()
            .all(|p| self.permissions.contains(p.as_ref()))
    }

    /// Check whether the identity holds a specific role
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_with(permissions: &[&str], roles: &[&str]) -> Identity {
        Identity {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            full_name: "Alice Example".to_string(),
            roles: roles.iter().map(ToString::to_string).collect(),
            permissions: permissions.iter().map(ToString::to_string).collect(),
            is_admin: false,
            source: CredentialSource::GatewayHeaders,
        }
    }

    #[test]
    fn test_has_permission() {
        let id = identity_with(&["docs.view", "docs.edit"], &[]);
        assert!(id.has_permission("docs.view"));
        assert!(!id.has_permission("docs.delete"));
    }

    #[test]
    fn test_has_any_permission() {
        let id = identity_with(&["docs.view"], &[]);
        assert!(id.has_any_permission(["docs.delete", "docs.view"]));
        assert!(!id.has_any_permission(["docs.delete", "docs.create"]));
        // Vacuously false for the empty list
        assert!(!id.has_any_permission(Vec::<String>::new()));
    }

    #[test]
    fn test_has_all_permissions() {
        let id = identity_with(&["docs.view", "docs.edit"], &[]);
        assert!(id.has_all_permissions(["docs.view", "docs.edit"]));
        assert!(!id.has_all_permissions(["docs.view", "docs.delete"]));
        // Vacuously true for the empty list
        assert!(id.has_all_permissions(Vec::<String>::new()));
    }

    #[test]
    fn test_has_role() {
        let id = identity_with(&[], &["editor"]);
        assert!(id.has_role("editor"));
        assert!(!id.has_role("admin"));
    }

    #[test]
    fn test_serializes_source_snake_case() {
        let id = identity_with(&[], &[]);
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["source"], "gateway_headers");
    }
}

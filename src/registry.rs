//! Permission registry — declarative catalog of the permissions a service exposes
//!
//! Services declare their permissions here and sync the catalog with the auth
//! service via [`AuthClient::sync_permissions`](crate::client::AuthClient::sync_permissions),
//! so the admin side can grant them without hand-typed permission strings.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};

/// A single declared permission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDef {
    /// Dotted permission string, e.g. `reports.view`
    pub name: String,
    /// Short human-readable name
    pub display_name: String,
    /// What granting this permission allows
    pub description: String,
    /// Optional grouping category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Wire payload for the permission sync endpoint
#[derive(Debug, Serialize)]
pub struct RegistryPayload {
    /// Service the permissions belong to
    pub service_key: String,
    /// Declared permissions
    pub permissions: Vec<PermissionDef>,
    /// Distinct category names used by the permissions
    pub categories: Vec<String>,
}

/// Registry of service permissions that can sync with the auth service
#[derive(Debug, Clone)]
pub struct PermissionRegistry {
    service_key: String,
    // BTreeMap keeps payload ordering stable across syncs
    permissions: BTreeMap<String, PermissionDef>,
}

impl PermissionRegistry {
    /// Create an empty registry for a service
    #[must_use]
    pub fn new(service_key: impl Into<String>) -> Self {
        Self {
            service_key: service_key.into(),
            permissions: BTreeMap::new(),
        }
    }

    /// Register a permission. Re-registering a name replaces the earlier
    /// definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty permission name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        category: Option<&str>,
    ) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Config("permission name cannot be empty".into()));
        }
        self.permissions.insert(
            name.clone(),
            PermissionDef {
                name,
                display_name: display_name.into(),
                description: description.into(),
                category: category.map(ToString::to_string),
            },
        );
        Ok(())
    }

    /// Get a permission by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PermissionDef> {
        self.permissions.get(name)
    }

    /// All registered permissions
    #[must_use]
    pub fn all(&self) -> Vec<&PermissionDef> {
        self.permissions.values().collect()
    }

    /// Permissions in a given category
    #[must_use]
    pub fn by_category(&self, category: &str) -> Vec<&PermissionDef> {
        self.permissions
            .values()
            .filter(|p| p.category.as_deref() == Some(category))
            .collect()
    }

    /// Build the sync wire payload
    #[must_use]
    pub fn to_payload(&self) -> RegistryPayload {
        let mut categories: Vec<String> = Vec::new();
        for p in self.permissions.values() {
            if let Some(c) = &p.category {
                if !categories.contains(c) {
                    categories.push(c.clone());
                }
            }
        }
        RegistryPayload {
            service_key: self.service_key.clone(),
            permissions: self.permissions.values().cloned().collect(),
            categories,
        }
    }
}

/// Standard CRUD permission tuples for a resource: `(name, display, description)`
#[must_use]
pub fn crud_permissions(resource: &str) -> Vec<(String, String, String)> {
    [
        ("view", "View", "view"),
        ("create", "Create", "create new"),
        ("edit", "Edit", "edit existing"),
        ("delete", "Delete", "delete"),
    ]
    .into_iter()
    .map(|(action, display, verb)| {
        (
            format!("{resource}.{action}"),
            format!("{display} {resource}"),
            format!("Permission to {verb} {resource}"),
        )
    })
    .collect()
}

/// Standard admin permission tuples for a service: `(name, display, description)`
#[must_use]
pub fn admin_permissions(service: &str) -> Vec<(String, String, String)> {
    [
        ("manage_users", "Manage Users", "manage service users"),
        ("view_logs", "View Logs", "view service logs"),
        ("export_data", "Export Data", "export service data"),
        ("manage_settings", "Manage Settings", "manage service settings"),
    ]
    .into_iter()
    .map(|(action, display, what)| {
        (
            format!("{service}.admin.{action}"),
            display.to_string(),
            format!("Permission to {what}"),
        )
    })
    .collect()
}

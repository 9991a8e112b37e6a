//! HTTP client for the central auth service
//!
//! Covers the remote permission source consumed by the decision engine plus
//! the auxiliary auth-service endpoints: remote token validation, user
//! documents, permission-registry sync, and health. Every request carries the
//! configured timeout; a timeout surfaces as
//! [`Error::ServiceUnavailable`], never a hang.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AuthServiceConfig;
use crate::engine::PermissionSource;
use crate::error::{Error, Result, TokenErrorKind};
use crate::registry::PermissionRegistry;

/// Client for auth-service communication
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

/// Response shape of the per-user permissions endpoint
#[derive(Debug, Deserialize)]
struct PermissionsResponse {
    #[serde(default)]
    permissions: HashSet<String>,
}

impl AuthClient {
    /// Create a client from auth service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceUnavailable`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: &AuthServiceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        })
    }

    /// Validate a token against the auth service and return the user info
    /// it reports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenInvalid`] with kind `Rejected` on a 401, and
    /// [`Error::ServiceUnavailable`] on transport or other HTTP errors.
    pub async fn validate_token(&self, token: &str) -> Result<Value> {
        let url = format!("{}/api/validate-token", self.base_url);
        let response = self.http.post(&url).bearer_auth(token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::TokenInvalid(TokenErrorKind::Rejected));
        }

        let response = response.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetch a user document, optionally filtered by type.
    ///
    /// `Ok(None)` when the auth service has no such document.
    pub async fn fetch_user_document(
        &self,
        user_id: &str,
        document_type: Option<&str>,
    ) -> Result<Option<Value>> {
        let url = format!("{}/api/users/{user_id}/documents", self.base_url);
        let mut request = self.http.get(&url);
        if let Some(doc_type) = document_type {
            request = request.query(&[("type", doc_type)]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response.error_for_status()?;
        Ok(Some(response.json().await?))
    }

    /// Push this service's declared permissions to the auth service.
    pub async fn sync_permissions(&self, registry: &PermissionRegistry) -> Result<()> {
        let url = format!(
            "{}/api/services/{}/permissions/sync",
            self.base_url, self.service_key
        );
        let payload = registry.to_payload();

        self.http
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        info!(
            service = %self.service_key,
            count = payload.permissions.len(),
            "Synced permissions with auth service"
        );
        Ok(())
    }

    /// Check whether the auth service is reachable and healthy
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }
}

#[async_trait]
impl PermissionSource for AuthClient {
    async fn fetch_user_permissions(&self, user_id: &str) -> Result<HashSet<String>> {
        let url = format!(
            "{}/api/users/{user_id}/permissions/{}",
            self.base_url, self.service_key
        );

        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!(user_id, error = %e, "Permission fetch failed");
            Error::from(e)
        })?;

        // 404 means the user simply has no permissions for this service
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(HashSet::new());
        }

        let response = response.error_for_status()?;
        let body: PermissionsResponse = response.json().await?;

        debug!(user_id, count = body.permissions.len(), "Fetched user permissions");
        Ok(body.permissions)
    }
}

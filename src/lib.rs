//! Auth Connector Library
//!
//! In-process authorization connector for services behind a central auth
//! gateway:
//!
//! - **Credential extraction**: gateway headers, internal service tokens, and
//!   bearer JWTs normalized into one [`Identity`](identity::Identity)
//! - **Permission decisions**: allow/deny against a required permission
//!   expression, with a TTL cache over the remote permission source
//! - **Service session**: registration, periodic heartbeat, and best-effort
//!   deregistration with the gateway's service registry
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use auth_connector::{
//!     AuthClient, AuthDecisionEngine, Config, CredentialExtractor,
//!     PermissionCache, PermissionExpression, TokenVerifier,
//! };
//!
//! # async fn run() -> auth_connector::Result<()> {
//! let config = Config::load(None)?;
//! let client = Arc::new(AuthClient::new(&config.auth_service)?);
//! let extractor = CredentialExtractor::new(TokenVerifier::new(&config.token)?);
//! let engine = AuthDecisionEngine::new(
//!     Arc::new(PermissionCache::new()),
//!     client,
//!     config.cache.ttl,
//!     config.engine.on_unavailable,
//! );
//!
//! let headers: std::collections::HashMap<String, String> = Default::default(); // from the request
//! let identity = extractor.extract(&headers).unwrap_or(None);
//! let decision = engine
//!     .authorize(identity.as_ref(), &PermissionExpression::single("reports.view"), true)
//!     .await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod identity;
#[cfg(feature = "axum")]
pub mod middleware;
pub mod registry;
pub mod session;
pub mod token;

pub use cache::PermissionCache;
pub use client::AuthClient;
pub use config::{Config, UnavailablePolicy};
pub use engine::{AuthDecisionEngine, Decision, DenyReason, PermissionExpression, PermissionSource};
pub use error::{Error, Result, TokenErrorKind};
pub use extract::{CredentialExtractor, RequestHeaders};
pub use identity::{CredentialSource, Identity};
pub use registry::PermissionRegistry;
pub use session::{RegistryTransport, ServiceSession, SessionStatus};
pub use token::{TokenClaims, TokenVerifier};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging for hosts that want the connector to configure it
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}

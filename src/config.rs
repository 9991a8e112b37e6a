//! Configuration management

use std::{collections::HashMap, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Auth service connection
    pub auth_service: AuthServiceConfig,
    /// Bearer token verification
    pub token: TokenConfig,
    /// Permission cache
    pub cache: CacheConfig,
    /// Decision engine policy
    pub engine: EngineConfig,
    /// Service registration and heartbeat session
    pub session: SessionConfig,
}

/// Auth service connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthServiceConfig {
    /// Base URL of the central auth service
    pub base_url: String,
    /// Unique key identifying this service in the auth service
    pub service_key: String,
    /// Request timeout for auth service calls
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AuthServiceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            service_key: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Bearer token verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HS256 secret shared with the token issuer
    pub jwt_secret: Option<String>,
    /// Verify signatures. Disabling this is an explicit trust boundary:
    /// payloads are decoded without verification, for deployments where a
    /// gateway has already authenticated the request.
    pub verify_signature: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            verify_signature: true,
        }
    }
}

/// Permission cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for cached per-user permission sets
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

/// Policy applied when the remote permission source is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UnavailablePolicy {
    /// Deny the request (the safe default)
    #[default]
    FailClosed,
    /// Evaluate against an empty permission set. Only an empty requirement
    /// passes; intended for non-critical deployments.
    FailOpen,
}

/// Decision engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// What to do when the remote permission source cannot be reached.
    /// Fixed per deployment, never varied per request.
    pub on_unavailable: UnavailablePolicy,
}

/// Service session (registration/heartbeat) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Enable registration with the service registry
    pub enabled: bool,
    /// Unique key identifying this service in the registry. Usually the same
    /// value as `auth_service.service_key`.
    pub service_key: String,
    /// URL of the service registry API
    pub registry_url: String,
    /// Internal network URL other services reach this one at
    pub internal_url: String,
    /// Health check endpoint path advertised at registration
    pub health_check_path: String,
    /// Interval between heartbeat pings
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Maximum registration attempts at startup
    pub register_max_attempts: u32,
    /// Delay between registration attempts
    #[serde(with = "humantime_serde")]
    pub register_retry_delay: Duration,
    /// Timeout for register/deregister requests
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Timeout for heartbeat pings (shorter; a slow ping is a failed ping)
    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,
    /// Additional metadata sent with registration
    pub metadata: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_key: String::new(),
            registry_url: String::new(),
            internal_url: String::new(),
            health_check_path: "/health".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            register_max_attempts: 10,
            register_retry_delay: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(5),
            metadata: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file merged with
    /// `AUTH_CONNECTOR_`-prefixed environment variables (`__` separates
    /// sections, e.g. `AUTH_CONNECTOR_CACHE__TTL=60s`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("AUTH_CONNECTOR_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.auth_service.service_key.is_empty() {
            return Err(Error::Config("auth_service.service_key is empty".into()));
        }
        if !self.auth_service.base_url.is_empty() {
            Url::parse(&self.auth_service.base_url)
                .map_err(|e| Error::Config(format!("auth_service.base_url: {e}")))?;
        }
        if self.token.verify_signature && self.token.jwt_secret.is_none() {
            return Err(Error::Config(
                "token.verify_signature is on but token.jwt_secret is not set".into(),
            ));
        }
        if self.session.enabled {
            if self.session.service_key.is_empty() {
                return Err(Error::Config("session.service_key is empty".into()));
            }
            Url::parse(&self.session.registry_url)
                .map_err(|e| Error::Config(format!("session.registry_url: {e}")))?;
            Url::parse(&self.session.internal_url)
                .map_err(|e| Error::Config(format!("session.internal_url: {e}")))?;
        }
        Ok(())
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

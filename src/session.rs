//! Service session — registration, heartbeat, and deregistration
//!
//! One [`ServiceSession`] runs per process, bound to process start/stop. It
//! registers with the central service registry at startup, keeps the
//! registration alive with periodic heartbeats from a cancellable background
//! task, and deregisters best-effort at shutdown.
//!
//! # State machine
//!
//! ```text
//! Unregistered ──register ok──▶ Registered ──tick fails──▶ Failed
//!      │                            │                        │  ▲
//!      │ register fails             │                        │  │ re-register ok
//!      ▼                            │                        │  │ (next tick)
//!    Failed                         ▼                        ▼  │
//!      └────────deregister────▶ Deregistered ◀───deregister──┘
//! ```
//!
//! `Deregistered` is terminal. Transitions go through a single guarded
//! `transition_to`, so the heartbeat task and concurrent register/deregister
//! calls never race on status.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not yet registered with the registry
    Unregistered,
    /// Registered; heartbeats keep the registration alive
    Registered,
    /// The last registration attempt or heartbeat failed; retried on schedule
    Failed,
    /// Shut down; no further transitions
    Deregistered,
}

/// Registration request sent to the registry
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    /// Unique key identifying the service
    pub service_key: String,
    /// Internal network URL the service is reachable at
    pub internal_url: String,
    /// Health check endpoint path
    pub health_check_path: String,
    /// Additional service metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Transport to the service registry.
///
/// All three calls are idempotent from the caller's perspective — safe to
/// retry. Implemented over HTTP by [`HttpRegistryClient`]; tests use
/// scripted fakes.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Register the service
    async fn register(&self, request: &RegistrationRequest) -> Result<()>;
    /// Send a liveness ping
    async fn heartbeat(&self, service_key: &str) -> Result<()>;
    /// Remove the service registration
    async fn deregister(&self, service_key: &str) -> Result<()>;
}

/// HTTP transport to the service registry
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: std::time::Duration,
    heartbeat_timeout: std::time::Duration,
}

impl HttpRegistryClient {
    /// Create a registry client from session configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceUnavailable`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: config.registry_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            heartbeat_timeout: config.heartbeat_timeout,
        })
    }

    async fn post(
        &self,
        path: &str,
        body: &impl Serialize,
        timeout: std::time::Duration,
    ) -> Result<()> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::ServiceUnavailable(format!(
                "{path} returned {}",
                response.status()
            )))
        }
    }
}

#[derive(Serialize)]
struct ServiceKeyBody<'a> {
    service_key: &'a str,
}

#[async_trait]
impl RegistryTransport for HttpRegistryClient {
    async fn register(&self, request: &RegistrationRequest) -> Result<()> {
        self.post("register", request, self.request_timeout).await
    }

    async fn heartbeat(&self, service_key: &str) -> Result<()> {
        self.post("heartbeat", &ServiceKeyBody { service_key }, self.heartbeat_timeout)
            .await
    }

    async fn deregister(&self, service_key: &str) -> Result<()> {
        self.post("deregister", &ServiceKeyBody { service_key }, self.request_timeout)
            .await
    }
}

/// Registration/heartbeat session with the service registry
pub struct ServiceSession {
    config: SessionConfig,
    transport: Arc<dyn RegistryTransport>,
    status: RwLock<SessionStatus>,
    /// Set on the first successful registration; deregistration skips the
    /// remote call when the session never made it into the registry.
    ever_registered: AtomicBool,
    cancel: CancellationToken,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceSession {
    /// Create a session over a transport. No remote calls are made until
    /// [`register`](Self::register) or [`start`](Self::start).
    #[must_use]
    pub fn new(config: SessionConfig, transport: Arc<dyn RegistryTransport>) -> Self {
        Self {
            config,
            transport,
            status: RwLock::new(SessionStatus::Unregistered),
            ever_registered: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            heartbeat_task: Mutex::new(None),
        }
    }

    /// Current session status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    /// Serialized, legality-checked status transition. Illegal transitions
    /// (anything out of `Deregistered`) are refused.
    fn transition_to(&self, new: SessionStatus) -> bool {
        let mut status = self.status.write();
        let old = *status;

        let legal = match (old, new) {
            _ if old == new => return true,
            (SessionStatus::Deregistered, _) => false,
            (_, SessionStatus::Deregistered)
            | (SessionStatus::Unregistered | SessionStatus::Failed, SessionStatus::Registered)
            | (SessionStatus::Unregistered | SessionStatus::Registered, SessionStatus::Failed) => {
                true
            }
            _ => false,
        };

        if legal {
            *status = new;
            debug!(service = %self.config.service_key, ?old, ?new, "Session status changed");
        } else {
            debug!(service = %self.config.service_key, ?old, ?new, "Refused illegal transition");
        }
        legal
    }

    fn registration_request(&self) -> RegistrationRequest {
        RegistrationRequest {
            service_key: self.config.service_key.clone(),
            internal_url: self.config.internal_url.clone(),
            health_check_path: self.config.health_check_path.clone(),
            metadata: self.config.metadata.clone(),
        }
    }

    /// Attempt registration once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] once deregistered, or the transport
    /// error on failure; the session moves to `Failed` and the caller decides
    /// whether startup proceeds without registration.
    pub async fn register(&self) -> Result<()> {
        if self.status() == SessionStatus::Deregistered {
            return Err(Error::SessionClosed);
        }

        match self.transport.register(&self.registration_request()).await {
            Ok(()) => {
                self.ever_registered.store(true, Ordering::Relaxed);
                self.transition_to(SessionStatus::Registered);
                info!(
                    service = %self.config.service_key,
                    url = %self.config.internal_url,
                    "Service registered"
                );
                Ok(())
            }
            Err(e) => {
                self.transition_to(SessionStatus::Failed);
                Err(e)
            }
        }
    }

    /// Attempt registration up to `register_max_attempts` times with a fixed
    /// delay between attempts. Returns whether registration succeeded.
    pub async fn register_with_retry(&self) -> bool {
        let max_attempts = self.config.register_max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.register().await {
                Ok(()) => return true,
                Err(Error::SessionClosed) => return false,
                Err(e) => {
                    warn!(
                        service = %self.config.service_key,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Registration attempt failed"
                    );
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.config.register_retry_delay).await;
            }
        }
        error!(
            service = %self.config.service_key,
            attempts = max_attempts,
            "Failed to register service"
        );
        false
    }

    /// One heartbeat tick: ping while registered, otherwise re-attempt
    /// registration. A failed ping moves `Registered → Failed`; the next tick
    /// retries on the same schedule.
    pub async fn heartbeat(&self) {
        match self.status() {
            SessionStatus::Registered => {
                match self
                    .transport
                    .heartbeat(&self.config.service_key)
                    .await
                {
                    Ok(()) => {
                        debug!(service = %self.config.service_key, "Heartbeat sent");
                    }
                    Err(e) => {
                        warn!(service = %self.config.service_key, error = %e, "Heartbeat failed");
                        self.transition_to(SessionStatus::Failed);
                    }
                }
            }
            SessionStatus::Unregistered | SessionStatus::Failed => {
                if let Err(e) = self.register().await {
                    warn!(service = %self.config.service_key, error = %e, "Re-registration failed");
                }
            }
            SessionStatus::Deregistered => {}
        }
    }

    /// Register (with retry) and start the background heartbeat task.
    /// Returns whether the initial registration succeeded; the heartbeat task
    /// runs either way and keeps retrying registration on its schedule.
    pub async fn start(self: &Arc<Self>) -> bool {
        let registered = self.register_with_retry().await;
        self.spawn_heartbeat();
        registered
    }

    /// Spawn the heartbeat task if not already running. The task ticks every
    /// `heartbeat_interval` and exits when the session is cancelled, dropping
    /// the interval with it.
    pub fn spawn_heartbeat(self: &Arc<Self>) {
        let mut slot = self.heartbeat_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!(service = %self.config.service_key, "Heartbeat task already running");
            return;
        }

        let session = Arc::clone(self);
        let cancel = self.cancel.clone();
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(session.config.heartbeat_interval);
            // The first tick fires immediately; registration just happened,
            // so skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        session.heartbeat().await;
                    }
                    () = cancel.cancelled() => {
                        debug!(service = %session.config.service_key, "Heartbeat task stopped");
                        break;
                    }
                }
            }
        }));
    }

    /// Cancel the heartbeat task. Immediate and idempotent.
    pub fn stop_heartbeat(&self) {
        self.cancel.cancel();
    }

    /// Deregister from the registry and end the session.
    ///
    /// Stops the heartbeat task, sends the removal request best-effort (a
    /// failure is logged, never propagated), and moves to `Deregistered`
    /// regardless of the remote outcome. Safe to call more than once; the
    /// remote call is skipped when the session never registered.
    pub async fn deregister(&self) {
        if self.status() == SessionStatus::Deregistered {
            return;
        }

        self.stop_heartbeat();
        let task = self.heartbeat_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        if self.ever_registered.load(Ordering::Relaxed) {
            match self.transport.deregister(&self.config.service_key).await {
                Ok(()) => {
                    info!(service = %self.config.service_key, "Service deregistered");
                }
                Err(e) => {
                    warn!(
                        service = %self.config.service_key,
                        error = %e,
                        "Deregistration failed; shutting down anyway"
                    );
                }
            }
        }

        self.transition_to(SessionStatus::Deregistered);
    }
}

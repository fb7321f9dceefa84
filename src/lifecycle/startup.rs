//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Bind the proxy and admin listeners
//! - Start background tasks (sweeper, admin API)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind before background tasks spawn, so a bind failure
//!   leaves nothing running
//! - Traffic is only accepted once `Gateway::run` is called

use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::GatekeeperConfig;
use crate::http::{GatekeeperServer, UpstreamError, UpstreamForwarder};
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::observability::access_log::{AccessSink, FileAccessLog, NoopAccessLog};
use crate::pipeline::{Gatekeeper, GatekeeperError};
use crate::security::Sweeper;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Gatekeeper(#[from] GatekeeperError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("failed to bind admin listener: {0}")]
    Admin(#[source] std::io::Error),
}

/// A fully wired gatekeeper that has not started accepting yet.
pub struct Gateway {
    gatekeeper: Arc<Gatekeeper>,
    server: GatekeeperServer,
    listener: Listener,
    local_addr: SocketAddr,
    sweeper: Sweeper,
    admin: Option<(SocketAddr, JoinHandle<()>)>,
}

impl Gateway {
    /// Build every subsystem and bind listeners. Must run inside a Tokio runtime.
    pub async fn start(config: &GatekeeperConfig, shutdown: &Shutdown) -> Result<Self, StartupError> {
        let access_log: Arc<dyn AccessSink> = if config.access_log.enabled {
            Arc::new(FileAccessLog::spawn(&config.access_log.path, config.access_log.queue_capacity))
        } else {
            Arc::new(NoopAccessLog)
        };

        let gatekeeper = Arc::new(Gatekeeper::from_config(config, access_log)?);
        let upstream = UpstreamForwarder::from_config(&config.upstream)?;
        let server = GatekeeperServer::new(
            gatekeeper.clone(),
            upstream.into_router(),
            Duration::from_secs(config.listener.drain_timeout_secs),
        );

        let listener = Listener::bind(&config.listener).await?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        let admin_listener = if config.admin.enabled {
            Some(
                TcpListener::bind(&config.admin.bind_address)
                    .await
                    .map_err(StartupError::Admin)?,
            )
        } else {
            None
        };

        let sweeper = Sweeper::spawn(
            gatekeeper.reputation().clone(),
            gatekeeper.rate_limiter().clone(),
            config.reputation.sweep_interval(),
            shutdown.subscribe(),
        );

        let admin = match admin_listener {
            Some(admin_listener) => {
                let state = AdminState {
                    reputation: gatekeeper.reputation().clone(),
                    rate_limiter: gatekeeper.rate_limiter().clone(),
                    access_log_path: config
                        .access_log
                        .enabled
                        .then(|| PathBuf::from(&config.access_log.path)),
                    api_key: Arc::from(config.admin.api_key.as_str()),
                    started_at: Instant::now(),
                };
                Some(spawn_admin(admin_listener, setup_admin_router(state), shutdown.clone())?)
            }
            None => None,
        };

        tracing::info!(
            address = %local_addr,
            upstream = %config.upstream.address,
            admin = ?admin.as_ref().map(|(addr, _)| *addr),
            "Gatekeeper ready"
        );

        Ok(Self {
            gatekeeper,
            server,
            listener,
            local_addr,
            sweeper,
            admin,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin.as_ref().map(|(addr, _)| *addr)
    }

    pub fn gatekeeper(&self) -> &Arc<Gatekeeper> {
        &self.gatekeeper
    }

    /// Serve until `shutdown` fires, then drain and stop background tasks.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let result = self.server.run(self.listener, shutdown.clone()).await;

        // Background tasks only exit on the signal; make sure they get it.
        shutdown.trigger();
        self.sweeper.join().await;
        if let Some((_, handle)) = self.admin {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Admin server task failed");
            }
        }
        result
    }
}

fn spawn_admin(
    listener: TcpListener,
    router: Router,
    shutdown: Shutdown,
) -> Result<(SocketAddr, JoinHandle<()>), StartupError> {
    let addr = listener.local_addr().map_err(StartupError::Admin)?;
    let handle = tokio::spawn(async move {
        tracing::info!(address = %addr, "Admin API listening");
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move { shutdown.wait().await });
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "Admin server failed");
        }
    });
    Ok((addr, handle))
}

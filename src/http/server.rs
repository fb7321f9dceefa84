//! HTTP serving with the gatekeeper in front of the application.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Serve HTTP/1.1 and HTTP/2 on each connection
//! - Attach the peer address for client resolution
//! - Drop connections whose request the gatekeeper terminates
//! - Drain open connections on shutdown, up to a deadline

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tower::{Layer, ServiceExt};

use crate::lifecycle::Shutdown;
use crate::net::{ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::pipeline::{Gatekeeper, GatekeeperLayer, GatekeeperService};

/// Pause after a failed accept, e.g. when file descriptors run out.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct GatekeeperServer {
    service: GatekeeperService<Router>,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl GatekeeperServer {
    pub fn new(gatekeeper: Arc<Gatekeeper>, app: Router, drain_timeout: Duration) -> Self {
        Self {
            service: GatekeeperLayer::new(gatekeeper).layer(app),
            tracker: ConnectionTracker::new(),
            drain_timeout,
        }
    }

    /// Serve until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut stop = shutdown.subscribe();
        while !shutdown.is_triggered() {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_connection(stream, peer, permit, &shutdown),
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = stop.recv() => break,
            }
        }
        drop(listener);

        tracing::info!(active_connections = self.tracker.active_count(), "Draining connections");
        if tokio::time::timeout(self.drain_timeout, self.tracker.drained()).await.is_err() {
            tracing::warn!(
                active_connections = self.tracker.active_count(),
                "Drain deadline passed with connections still open"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit, shutdown: &Shutdown) {
        let service = self.service.clone();
        let guard = self.tracker.track();
        let mut stop = shutdown.subscribe();
        let mut stopping = shutdown.is_triggered();

        tokio::spawn(async move {
            let _permit = permit;
            let hyper_service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(ConnectInfo(peer));
                service.clone().oneshot(request.map(Body::new))
            });

            let builder = auto::Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection(TokioIo::new(stream), hyper_service);
            tokio::pin!(conn);
            if stopping {
                conn.as_mut().graceful_shutdown();
            }

            let result = loop {
                tokio::select! {
                    result = conn.as_mut() => break result,
                    _ = stop.recv(), if !stopping => {
                        stopping = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            };

            // Terminated requests surface here as service errors.
            if let Err(e) = result {
                tracing::debug!(connection_id = %guard.id(), peer = %peer, error = %e, "Connection closed");
            }
        });
    }
}

//! Request-handling engine.
//!
//! # Responsibilities
//! - Accept TCP (optionally TLS) connections and dispatch requests
//! - Enforce passthrough tuning (header read timeout, request timeout,
//!   max connections)
//! - Stop accepting immediately when shutdown is invoked
//! - Drain in-flight connections, force-closing them at the drain deadline
//!
//! # Design Decisions
//! - The shutdown coordinator depends on the [`Engine`] trait, not on
//!   [`HttpEngine`], so the merge protocol is testable in isolation
//! - `serve` returns the [`EngineError::Closed`] sentinel after a shutdown
//!   call; callers treat it as success
//! - Backpressure: a connection slot is acquired before accepting

use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::{GracefulShutdown, Watcher};
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio_rustls::TlsAcceptor;
use tower_http::timeout::TimeoutLayer;

pub mod tls;

pub use tls::TlsError;

/// Contract the shutdown coordinator requires from an engine.
///
/// `serve`/`serve_tls` block until the listener closes or a fatal error
/// occurs, and return [`EngineError::Closed`] once a concurrent
/// [`Engine::shutdown`] targeting the same instance has been invoked.
/// Serving while a shutdown call runs against the same instance is
/// supported usage.
pub trait Engine {
    fn serve(&self, listener: TcpListener) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn serve_tls(
        &self,
        listener: TcpListener,
        cert: &Path,
        key: &Path,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Stops accepting new connections immediately and waits for in-flight
    /// connections to finish, up to `timeout`. On timeout the engine
    /// force-closes whatever remains and reports
    /// [`EngineError::DrainTimeout`].
    fn shutdown(&self, timeout: Duration) -> impl Future<Output = Result<(), EngineError>> + Send;
}

/// Error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Sentinel: the serve loop ended because shutdown was initiated.
    /// Not a failure.
    #[error("Server closed")]
    Closed,

    /// In-flight connections did not drain within the shutdown deadline.
    #[error("Connection drain did not finish within {0:?}")]
    DrainTimeout(Duration),

    /// TLS material could not be loaded.
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Passthrough tuning for [`HttpEngine`].
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Bound on reading a request's header section (hyper http1 builder).
    pub header_read_timeout: Option<Duration>,
    /// Bound on handling a single request; elapsed requests get 408.
    pub request_timeout: Option<Duration>,
    /// Cap on concurrently served connections.
    pub max_connections: Option<usize>,
}

/// A single engine tuning directive, applied in the order supplied.
pub struct EngineOption(Box<dyn FnOnce(&mut EngineSettings) + Send + Sync>);

impl EngineOption {
    pub(crate) fn apply(self, settings: &mut EngineSettings) {
        (self.0)(settings);
    }
}

/// Sets the header read timeout.
pub fn with_header_read_timeout(timeout: Duration) -> EngineOption {
    EngineOption(Box::new(move |settings| {
        settings.header_read_timeout = Some(timeout);
    }))
}

/// Sets the per-request timeout.
pub fn with_request_timeout(timeout: Duration) -> EngineOption {
    EngineOption(Box::new(move |settings| {
        settings.request_timeout = Some(timeout);
    }))
}

/// Caps the number of concurrently served connections.
pub fn with_max_connections(max: usize) -> EngineOption {
    EngineOption(Box::new(move |settings| {
        settings.max_connections = Some(max);
    }))
}

/// HTTP/1.1 + HTTP/2 engine over hyper, serving an [`axum::Router`].
///
/// One instance serves one listener at a time; the stop/drain flags are
/// rearmed per invocation by the owning server handle.
pub struct HttpEngine {
    router: Router,
    settings: EngineSettings,
    /// Raised by `shutdown` to stop the accept loop.
    stop: watch::Sender<bool>,
    /// Raised at the drain deadline to drop remaining connections.
    force: watch::Sender<bool>,
    /// Raised by the serve loop once the drain has completed.
    drained: watch::Sender<bool>,
}

impl HttpEngine {
    pub(crate) fn new(router: Router, settings: EngineSettings) -> Self {
        let (stop, _) = watch::channel(false);
        let (force, _) = watch::channel(false);
        let (drained, _) = watch::channel(false);
        Self {
            router,
            settings,
            stop,
            force,
            drained,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EngineSettings {
        &mut self.settings
    }

    /// Rearm the stop/force/drain flags for a fresh serve invocation.
    pub(crate) fn reset(&self) {
        self.stop.send_replace(false);
        self.force.send_replace(false);
        self.drained.send_replace(false);
    }

    async fn serve_inner(
        &self,
        listener: TcpListener,
        tls_paths: Option<(&Path, &Path)>,
    ) -> Result<(), EngineError> {
        let result = async {
            let acceptor = match tls_paths {
                Some((cert, key)) => {
                    let config = tls::load_server_config(cert, key).await?;
                    Some(TlsAcceptor::from(Arc::new(config)))
                }
                None => None,
            };
            self.accept_loop(listener, acceptor).await
        }
        .await;
        // Raised on every exit path so a concurrent shutdown call resolves
        // instead of waiting out its deadline.
        self.drained.send_replace(true);
        result
    }

    async fn accept_loop(
        &self,
        listener: TcpListener,
        tls: Option<TlsAcceptor>,
    ) -> Result<(), EngineError> {
        let mut stop = self.stop.subscribe();
        let graceful = GracefulShutdown::new();
        let limit = self
            .settings
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max)));

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder.http1().timer(TokioTimer::new());
        builder.http2().timer(TokioTimer::new());
        if let Some(timeout) = self.settings.header_read_timeout {
            builder.http1().header_read_timeout(timeout);
        }
        let app = match self.settings.request_timeout {
            Some(timeout) => self.router.clone().layer(TimeoutLayer::new(timeout)),
            None => self.router.clone(),
        };

        loop {
            // Backpressure: take a connection slot before accepting.
            let permit = match &limit {
                Some(semaphore) => tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        Some(permit.expect("Semaphore closed unexpectedly"))
                    }
                    _ = stop.wait_for(|stopped| *stopped) => break,
                },
                None => None,
            };

            let (stream, peer_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
                _ = stop.wait_for(|stopped| *stopped) => break,
            };

            tracing::debug!(peer_addr = %peer_addr, "Connection accepted");

            let builder = builder.clone();
            let app = app.clone();
            let watcher = graceful.watcher();
            let mut force = self.force.subscribe();
            let tls = tls.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match tls {
                    Some(acceptor) => {
                        let stream = tokio::select! {
                            handshake = acceptor.accept(stream) => match handshake {
                                Ok(stream) => stream,
                                Err(e) => {
                                    tracing::debug!(peer_addr = %peer_addr, error = %e, "TLS handshake failed");
                                    return;
                                }
                            },
                            _ = force.wait_for(|forced| *forced) => return,
                        };
                        drive_connection(builder, TokioIo::new(stream), app, watcher, force).await;
                    }
                    None => {
                        drive_connection(builder, TokioIo::new(stream), app, watcher, force).await;
                    }
                }
            });
        }

        // Stop accepting, then wait for the in-flight set. A concurrent
        // shutdown call bounds this wait and force-closes at the deadline.
        drop(listener);
        tracing::debug!(pending = graceful.count(), "Draining in-flight connections");
        graceful.shutdown().await;
        Err(EngineError::Closed)
    }
}

impl Engine for HttpEngine {
    async fn serve(&self, listener: TcpListener) -> Result<(), EngineError> {
        self.serve_inner(listener, None).await
    }

    async fn serve_tls(
        &self,
        listener: TcpListener,
        cert: &Path,
        key: &Path,
    ) -> Result<(), EngineError> {
        self.serve_inner(listener, Some((cert, key))).await
    }

    async fn shutdown(&self, timeout: Duration) -> Result<(), EngineError> {
        self.stop.send_replace(true);
        let mut drained = self.drained.subscribe();
        tokio::select! {
            _ = drained.wait_for(|drained| *drained) => Ok(()),
            _ = tokio::time::sleep(timeout) => {
                self.force.send_replace(true);
                Err(EngineError::DrainTimeout(timeout))
            }
        }
    }
}

/// Serve one accepted connection until it completes, the drain finishes it,
/// or the force flag drops it.
async fn drive_connection<I>(
    builder: auto::Builder<TokioExecutor>,
    io: I,
    app: Router,
    watcher: Watcher,
    mut force: watch::Receiver<bool>,
) where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = TowerToHyperService::new(app);
    let connection = builder.serve_connection_with_upgrades(io, service);
    tokio::select! {
        result = watcher.watch(connection) => {
            if let Err(e) = result {
                tracing::debug!(error = ?e, "Error serving connection");
            }
        }
        _ = force.wait_for(|forced| *forced) => {
            tracing::debug!("Connection force-closed at drain deadline");
        }
    }
}

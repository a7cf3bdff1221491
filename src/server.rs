//! Public serving facade.
//!
//! Free functions for the common cases, plus a reusable [`Server`] handle
//! for callers that want to tune engine settings or trigger shutdown
//! programmatically.

use std::path::Path;

use axum::Router;
use tokio::net::TcpListener;
use tracing::Instrument;

use crate::config::{Config, ServeOption};
use crate::engine::{EngineSettings, HttpEngine};
use crate::error::ServeError;
use crate::lifecycle::coordinator::{self, TlsPaths};
use crate::lifecycle::ShutdownHandle;

/// HTTP server with built-in graceful shutdown.
///
/// One handle serves one listener at a time (the serve methods take
/// `&mut self`); construct independent handles for independent servers.
pub struct Server {
    engine: HttpEngine,
    config: Config,
    handle: ShutdownHandle,
}

impl Server {
    /// Build a server for `handler`, applying `options` in order.
    pub fn new(handler: Router, options: impl IntoIterator<Item = ServeOption>) -> Self {
        let mut config = Config::from_options(options);
        let mut settings = EngineSettings::default();
        for option in std::mem::take(&mut config.engine) {
            option.apply(&mut settings);
        }
        Self {
            engine: HttpEngine::new(handler, settings),
            config,
            handle: ShutdownHandle::new(),
        }
    }

    /// Handle for triggering shutdown without an OS signal.
    ///
    /// Idempotent and level-triggered; once fired it stays fired for this
    /// server, including across later serve calls on the same handle.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Engine tuning knobs.
    pub fn settings(&self) -> &EngineSettings {
        self.engine.settings()
    }

    /// Engine tuning knobs, adjustable before serving starts.
    pub fn settings_mut(&mut self) -> &mut EngineSettings {
        self.engine.settings_mut()
    }

    /// Serve plain HTTP on `addr` until shutdown.
    pub async fn listen_and_serve(&mut self, addr: &str) -> Result<(), ServeError> {
        let listener = bind(addr).await?;
        self.run(listener, None).await
    }

    /// Serve HTTPS on `addr` with the given PEM certificate and key files.
    pub async fn listen_and_serve_tls(
        &mut self,
        addr: &str,
        cert: impl AsRef<Path>,
        key: impl AsRef<Path>,
    ) -> Result<(), ServeError> {
        let listener = bind(addr).await?;
        self.run(listener, Some(tls_paths(cert, key))).await
    }

    /// Serve plain HTTP on a caller-supplied listener until shutdown.
    pub async fn serve(&mut self, listener: TcpListener) -> Result<(), ServeError> {
        self.run(listener, None).await
    }

    /// Serve HTTPS on a caller-supplied listener.
    pub async fn serve_tls(
        &mut self,
        listener: TcpListener,
        cert: impl AsRef<Path>,
        key: impl AsRef<Path>,
    ) -> Result<(), ServeError> {
        self.run(listener, Some(tls_paths(cert, key))).await
    }

    async fn run(&mut self, listener: TcpListener, tls: Option<TlsPaths>) -> Result<(), ServeError> {
        self.engine.reset();
        let span = self.config.span.clone();
        coordinator::run(&self.engine, listener, tls, &self.config, self.handle.token())
            .instrument(span)
            .await
    }
}

async fn bind(addr: &str) -> Result<TcpListener, ServeError> {
    TcpListener::bind(addr).await.map_err(|e| ServeError::Bind {
        addr: addr.to_string(),
        source: e,
    })
}

fn tls_paths(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> TlsPaths {
    TlsPaths {
        cert: cert.as_ref().to_path_buf(),
        key: key.as_ref().to_path_buf(),
    }
}

/// Serve `handler` on `addr` with graceful shutdown.
pub async fn listen_and_serve(
    addr: &str,
    handler: Router,
    options: impl IntoIterator<Item = ServeOption>,
) -> Result<(), ServeError> {
    let mut server = Server::new(handler, options);
    server.listen_and_serve(addr).await
}

/// Serve `handler` over TLS on `addr` with graceful shutdown.
pub async fn listen_and_serve_tls(
    addr: &str,
    cert: impl AsRef<Path>,
    key: impl AsRef<Path>,
    handler: Router,
    options: impl IntoIterator<Item = ServeOption>,
) -> Result<(), ServeError> {
    let mut server = Server::new(handler, options);
    server.listen_and_serve_tls(addr, cert, key).await
}

/// Serve `handler` on a caller-supplied listener with graceful shutdown.
pub async fn serve(
    listener: TcpListener,
    handler: Router,
    options: impl IntoIterator<Item = ServeOption>,
) -> Result<(), ServeError> {
    let mut server = Server::new(handler, options);
    server.serve(listener).await
}

/// Serve `handler` over TLS on a caller-supplied listener with graceful
/// shutdown.
pub async fn serve_tls(
    listener: TcpListener,
    cert: impl AsRef<Path>,
    key: impl AsRef<Path>,
    handler: Router,
    options: impl IntoIterator<Item = ServeOption>,
) -> Result<(), ServeError> {
    let mut server = Server::new(handler, options);
    server.serve_tls(listener, cert, key).await
}

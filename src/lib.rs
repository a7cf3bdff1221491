//! Graceful shutdown for HTTP/HTTPS servers.
//!
//! Wraps an [`axum::Router`] in a serve loop that listens for termination
//! signals (or an external [`ShutdownHandle`]), stops accepting new
//! connections on trigger, drains in-flight requests up to a bounded
//! timeout, and returns a single deterministic outcome.
//!
//! ```no_run
//! use std::time::Duration;
//! use axum::{routing::get, Router};
//! use httpgrace::{listen_and_serve, with_timeout};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), httpgrace::ServeError> {
//!     let app = Router::new().route("/", get(|| async { "ok" }));
//!     listen_and_serve("127.0.0.1:8080", app, [with_timeout(Duration::from_secs(30))]).await
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod server;

pub use config::{with_engine_options, with_signals, with_span, with_timeout, Config, ServeOption, Signal};
pub use engine::{
    with_header_read_timeout, with_max_connections, with_request_timeout, Engine, EngineError,
    EngineOption, EngineSettings, HttpEngine, TlsError,
};
pub use error::ServeError;
pub use lifecycle::{ShutdownHandle, TriggerEvent};
pub use server::{listen_and_serve, listen_and_serve_tls, serve, serve_tls, Server};

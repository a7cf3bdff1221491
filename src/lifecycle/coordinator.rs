//! Shutdown coordination state machine.
//!
//! One serve invocation moves through `Idle -> Serving -> ShuttingDown ->
//! Terminated`. Two futures run concurrently: the engine's serve call and
//! the trigger watch. On trigger the coordinator invokes the engine's
//! bounded shutdown and joins both paths before returning, so the caller
//! never observes completion while a connection drain is still running.
//!
//! Merge rule: a non-sentinel serve error always wins; otherwise the
//! shutdown path's result is the outcome.

use std::path::PathBuf;
use std::pin::pin;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::trigger::Trigger;
use crate::config::Config;
use crate::engine::{Engine, EngineError};
use crate::error::ServeError;

/// Certificate and key paths for a TLS serve invocation.
pub(crate) struct TlsPaths {
    pub(crate) cert: PathBuf,
    pub(crate) key: PathBuf,
}

pub(crate) async fn run<E: Engine>(
    engine: &E,
    listener: TcpListener,
    tls: Option<TlsPaths>,
    config: &Config,
    external: CancellationToken,
) -> Result<(), ServeError> {
    // Arm before serving so a trigger racing startup cannot be lost.
    let mut trigger = Trigger::arm(config.signals(), external).map_err(ServeError::Trigger)?;

    let mode = if tls.is_some() { "HTTPS" } else { "HTTP" };
    match listener.local_addr() {
        Ok(addr) => tracing::info!(
            mode = %mode,
            addr = %addr,
            shutdown_timeout = ?config.shutdown_timeout(),
            "Starting server"
        ),
        Err(_) => tracing::info!(
            mode = %mode,
            shutdown_timeout = ?config.shutdown_timeout(),
            "Starting server"
        ),
    }

    let mut serve = pin!(async {
        match &tls {
            Some(paths) => engine.serve_tls(listener, &paths.cert, &paths.key).await,
            None => engine.serve(listener).await,
        }
    });

    let event = tokio::select! {
        result = serve.as_mut() => {
            // The serve loop ended on its own; the trigger source is torn
            // down by scope and no shutdown is attempted.
            return match result {
                Ok(()) | Err(EngineError::Closed) => Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "Server error");
                    Err(ServeError::Serve(e))
                }
            };
        }
        event = trigger.recv() => event,
    };

    tracing::info!(trigger = %event, "Shutdown trigger received");
    let shutdown_started = Instant::now();

    // Both paths must complete before this returns.
    let (serve_result, shutdown_result) =
        tokio::join!(serve, engine.shutdown(config.shutdown_timeout()));
    drop(trigger);

    match serve_result {
        Ok(()) | Err(EngineError::Closed) => {}
        Err(e) => {
            // A genuine serve failure outranks whatever the drain reported.
            tracing::error!(error = %e, "Server error");
            return Err(ServeError::Serve(e));
        }
    }

    match shutdown_result {
        Ok(()) => {
            tracing::info!(
                duration = ?shutdown_started.elapsed(),
                "Server shutdown completed gracefully"
            );
            Ok(())
        }
        Err(EngineError::DrainTimeout(timeout)) => {
            tracing::error!(
                timeout = ?timeout,
                duration = ?shutdown_started.elapsed(),
                "Server shutdown timed out"
            );
            Err(ServeError::ShutdownTimeout { timeout })
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                duration = ?shutdown_started.elapsed(),
                "Server shutdown failed"
            );
            Err(ServeError::Serve(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::watch;

    #[derive(Clone, Copy)]
    enum FakeResult {
        Clean,
        Closed,
        IoError,
        DrainTimeout,
    }

    impl FakeResult {
        fn materialize(self) -> Result<(), EngineError> {
            match self {
                FakeResult::Clean => Ok(()),
                FakeResult::Closed => Err(EngineError::Closed),
                FakeResult::IoError => Err(EngineError::Io(io::Error::other("boom"))),
                FakeResult::DrainTimeout => {
                    Err(EngineError::DrainTimeout(Duration::from_millis(5)))
                }
            }
        }
    }

    /// Engine whose serve call blocks until shutdown is invoked, then
    /// returns a scripted result; shutdown returns its own scripted result.
    struct FakeEngine {
        stop: watch::Sender<bool>,
        serve_result: FakeResult,
        shutdown_result: FakeResult,
        serve_fails_immediately: bool,
    }

    impl FakeEngine {
        fn new(serve_result: FakeResult, shutdown_result: FakeResult) -> Self {
            let (stop, _) = watch::channel(false);
            Self {
                stop,
                serve_result,
                shutdown_result,
                serve_fails_immediately: false,
            }
        }

        fn failing_at_serve() -> Self {
            let mut engine = Self::new(FakeResult::Closed, FakeResult::Clean);
            engine.serve_fails_immediately = true;
            engine
        }
    }

    impl Engine for FakeEngine {
        async fn serve(&self, _listener: TcpListener) -> Result<(), EngineError> {
            if self.serve_fails_immediately {
                return Err(EngineError::Io(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    "address in use",
                )));
            }
            let mut stop = self.stop.subscribe();
            let _ = stop.wait_for(|stopped| *stopped).await;
            self.serve_result.materialize()
        }

        async fn serve_tls(
            &self,
            listener: TcpListener,
            _cert: &Path,
            _key: &Path,
        ) -> Result<(), EngineError> {
            self.serve(listener).await
        }

        async fn shutdown(&self, _timeout: Duration) -> Result<(), EngineError> {
            self.stop.send_replace(true);
            self.shutdown_result.materialize()
        }
    }

    fn signalless_config() -> Config {
        let mut config = Config::default();
        config.signals = Vec::new();
        config
    }

    async fn listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn trigger_then_clean_drain_returns_ok() {
        let engine = FakeEngine::new(FakeResult::Closed, FakeResult::Clean);
        let token = CancellationToken::new();
        let fire = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fire.cancel();
        });

        let result = run(&engine, listener().await, None, &signalless_config(), token).await;
        assert!(result.is_ok(), "expected clean outcome, got {result:?}");
    }

    #[tokio::test]
    async fn drain_timeout_is_reported() {
        let engine = FakeEngine::new(FakeResult::Closed, FakeResult::DrainTimeout);
        let token = CancellationToken::new();
        token.cancel();

        let result = run(&engine, listener().await, None, &signalless_config(), token).await;
        assert!(matches!(
            result,
            Err(ServeError::ShutdownTimeout { timeout }) if timeout == Duration::from_millis(5)
        ));
    }

    #[tokio::test]
    async fn serve_error_returns_without_any_trigger() {
        let engine = FakeEngine::failing_at_serve();
        let token = CancellationToken::new();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            run(&engine, listener().await, None, &signalless_config(), token),
        )
        .await
        .expect("serve error must be reported immediately");
        assert!(matches!(result, Err(ServeError::Serve(_))));
    }

    #[tokio::test]
    async fn non_sentinel_serve_error_outranks_clean_drain() {
        let engine = FakeEngine::new(FakeResult::IoError, FakeResult::Clean);
        let token = CancellationToken::new();
        token.cancel();

        let result = run(&engine, listener().await, None, &signalless_config(), token).await;
        assert!(matches!(result, Err(ServeError::Serve(_))));
    }

    #[tokio::test]
    async fn shutdown_error_surfaces_when_serve_returns_sentinel() {
        let engine = FakeEngine::new(FakeResult::Closed, FakeResult::IoError);
        let token = CancellationToken::new();
        token.cancel();

        let result = run(&engine, listener().await, None, &signalless_config(), token).await;
        assert!(matches!(result, Err(ServeError::Serve(_))));
    }

    #[tokio::test]
    async fn serve_returning_ok_after_trigger_is_clean() {
        let engine = FakeEngine::new(FakeResult::Clean, FakeResult::Clean);
        let token = CancellationToken::new();
        token.cancel();

        let result = run(&engine, listener().await, None, &signalless_config(), token).await;
        assert!(result.is_ok());
    }
}

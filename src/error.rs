//! Error taxonomy for serve invocations.
//!
//! `Ok(())` from a serve call is the clean outcome: the server was shut down
//! gracefully (or its listener closed) with every in-flight request drained.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineError;

/// Terminal error of one serve invocation.
///
/// Every variant is both logged and returned; nothing is swallowed, nothing
/// is retried.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The listener could not be created. Fatal; nothing was armed and no
    /// shutdown was attempted.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Shutdown signal registration failed.
    #[error("Failed to register shutdown trigger: {0}")]
    Trigger(#[source] io::Error),

    /// The engine failed after binding, for a reason other than an
    /// intentional shutdown.
    #[error("Server error: {0}")]
    Serve(#[source] EngineError),

    /// The connection drain did not finish within the configured timeout.
    /// The engine has force-closed the remaining connections.
    #[error("Graceful shutdown timed out after {timeout:?}")]
    ShutdownTimeout { timeout: Duration },
}

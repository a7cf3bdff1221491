//! External shutdown requests.

use tokio_util::sync::CancellationToken;

/// Handle for requesting graceful shutdown without an OS signal.
///
/// Cloneable and idempotent. The request is level-triggered: firing before
/// the serve call has started still shuts the server down once serving
/// begins, so there is no window in which a request can be lost.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request graceful shutdown. Subsequent calls are no-ops.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been requested through this handle.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

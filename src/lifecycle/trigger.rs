//! Shutdown trigger source.
//!
//! # Responsibilities
//! - Register OS signal handlers for the configured signal set
//! - Merge signals with external shutdown requests into one trigger stream
//! - Release the registrations on every exit path (RAII)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The external path is level-triggered, so a request fired before arming
//!   is still observed
//! - At most one trigger is consumed per serve invocation

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::config::Signal;

/// What caused a shutdown. Carried into the logs only; it has no effect on
/// shutdown mechanics beyond having fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// An OS signal fired.
    Signal(Signal),
    /// A [`ShutdownHandle`](super::ShutdownHandle) was triggered.
    External,
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerEvent::Signal(signal) => signal.fmt(f),
            TriggerEvent::External => f.write_str("external"),
        }
    }
}

/// Armed trigger source for one serve invocation.
///
/// Dropping the value releases the signal registrations, so every exit path
/// of the coordinator disarms cleanly.
pub(crate) struct Trigger {
    #[cfg(unix)]
    streams: Vec<(Signal, tokio::signal::unix::Signal)>,
    external: CancellationToken,
}

impl Trigger {
    /// Register the signal streams. Must happen before the serve loop starts
    /// accepting connections so a trigger racing startup cannot be lost.
    #[cfg(unix)]
    pub(crate) fn arm(signals: &[Signal], external: CancellationToken) -> std::io::Result<Self> {
        use tokio::signal::unix::signal;

        let mut streams = Vec::with_capacity(signals.len());
        for &sig in signals {
            streams.push((sig, signal(kind(sig))?));
        }
        Ok(Self { streams, external })
    }

    #[cfg(not(unix))]
    pub(crate) fn arm(_signals: &[Signal], external: CancellationToken) -> std::io::Result<Self> {
        Ok(Self { external })
    }

    /// Wait for the first trigger. The coordinator consumes at most one
    /// event; a second trigger during an active shutdown is deliberately
    /// ignored (shutdown is not re-entrant).
    #[cfg(unix)]
    pub(crate) async fn recv(&mut self) -> TriggerEvent {
        let external = self.external.clone();
        let streams = &mut self.streams;
        let signals = async move {
            if streams.is_empty() {
                return std::future::pending::<Signal>().await;
            }
            let waits = streams.iter_mut().map(|(sig, stream)| {
                Box::pin(async move {
                    stream.recv().await;
                    *sig
                })
            });
            let (sig, _, _) = futures_util::future::select_all(waits).await;
            sig
        };

        tokio::select! {
            _ = external.cancelled() => TriggerEvent::External,
            sig = signals => TriggerEvent::Signal(sig),
        }
    }

    /// Best-effort path for non-unix systems: Ctrl+C stands in for the
    /// whole configured signal set.
    #[cfg(not(unix))]
    pub(crate) async fn recv(&mut self) -> TriggerEvent {
        let external = self.external.clone();
        tokio::select! {
            _ = external.cancelled() => TriggerEvent::External,
            _ = tokio::signal::ctrl_c() => TriggerEvent::Signal(Signal::Interrupt),
        }
    }
}

#[cfg(unix)]
fn kind(sig: Signal) -> tokio::signal::unix::SignalKind {
    use tokio::signal::unix::SignalKind;

    match sig {
        Signal::Interrupt => SignalKind::interrupt(),
        Signal::Terminate => SignalKind::terminate(),
        Signal::Hangup => SignalKind::hangup(),
        Signal::Quit => SignalKind::quit(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn external_token_delivers_trigger() {
        let token = CancellationToken::new();
        let mut trigger = Trigger::arm(&[], token.clone()).unwrap();

        token.cancel();
        let event = tokio::time::timeout(Duration::from_secs(1), trigger.recv())
            .await
            .expect("trigger should be delivered");
        assert_eq!(event, TriggerEvent::External);
    }

    #[tokio::test]
    async fn trigger_fired_before_arming_is_still_observed() {
        let token = CancellationToken::new();
        token.cancel();

        let mut trigger = Trigger::arm(&[], token).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), trigger.recv())
            .await
            .expect("pre-fired trigger should be delivered");
        assert_eq!(event, TriggerEvent::External);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn arming_default_signal_set_succeeds() {
        let trigger = Trigger::arm(
            &[Signal::Interrupt, Signal::Terminate],
            CancellationToken::new(),
        );
        assert!(trigger.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn os_signal_is_translated_to_trigger_event() {
        // SIGHUP: nothing else in the test process registers it, and the
        // handler is installed by arm() before the raise.
        let mut trigger = Trigger::arm(&[Signal::Hangup], CancellationToken::new()).unwrap();

        unsafe {
            libc::raise(libc::SIGHUP);
        }

        let event = tokio::time::timeout(Duration::from_secs(1), trigger.recv())
            .await
            .expect("raised signal should be delivered");
        assert_eq!(event, TriggerEvent::Signal(Signal::Hangup));
    }
}

//! Serve-time configuration.
//!
//! # Responsibilities
//! - Hold the shutdown parameters for one serve invocation
//! - Apply caller-supplied options in order (later options win on scalars)
//! - Protect defaults against accidental disablement (empty overrides)

use std::fmt;
use std::time::Duration;

use crate::engine::EngineOption;

/// OS signals that can trigger graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT (Ctrl-C in a terminal).
    Interrupt,
    /// SIGTERM (default kill signal, used by systemd/Kubernetes).
    Terminate,
    /// SIGHUP.
    Hangup,
    /// SIGQUIT.
    Quit,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Hangup => "SIGHUP",
            Signal::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

/// Resolved configuration for one serve invocation.
///
/// Built once by applying [`ServeOption`] values in order; immutable while
/// serving.
pub struct Config {
    pub(crate) shutdown_timeout: Duration,
    pub(crate) signals: Vec<Signal>,
    pub(crate) span: tracing::Span,
    pub(crate) engine: Vec<EngineOption>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
            signals: vec![Signal::Interrupt, Signal::Terminate],
            span: tracing::Span::current(),
            engine: Vec::new(),
        }
    }
}

impl Config {
    pub(crate) fn from_options(options: impl IntoIterator<Item = ServeOption>) -> Self {
        let mut config = Self::default();
        for option in options {
            option.apply(&mut config);
        }
        config
    }

    /// Bound on the connection drain wait during shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Signals that trigger graceful shutdown.
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }
}

/// A single configuration directive, applied in the order supplied.
pub struct ServeOption(Box<dyn FnOnce(&mut Config) + Send>);

impl ServeOption {
    pub(crate) fn apply(self, config: &mut Config) {
        (self.0)(config);
    }
}

/// Sets the graceful shutdown timeout. Default: 10 seconds.
pub fn with_timeout(timeout: Duration) -> ServeOption {
    ServeOption(Box::new(move |config| config.shutdown_timeout = timeout))
}

/// Sets which OS signals trigger graceful shutdown.
///
/// Supplying no signals keeps the default set (SIGINT, SIGTERM) so an empty
/// override cannot silently disable signal handling.
pub fn with_signals(signals: impl IntoIterator<Item = Signal>) -> ServeOption {
    let signals: Vec<Signal> = signals.into_iter().collect();
    ServeOption(Box::new(move |config| {
        if !signals.is_empty() {
            config.signals = signals;
        }
    }))
}

/// Sets the span lifecycle events are recorded in.
///
/// A disabled span ([`tracing::Span::none`]) keeps the default, the span
/// current when the configuration was built.
pub fn with_span(span: tracing::Span) -> ServeOption {
    ServeOption(Box::new(move |config| {
        if !span.is_none() {
            config.span = span;
        }
    }))
}

/// Appends passthrough tuning for the underlying engine.
pub fn with_engine_options(options: impl IntoIterator<Item = EngineOption>) -> ServeOption {
    let options: Vec<EngineOption> = options.into_iter().collect();
    ServeOption(Box::new(move |config| config.engine.extend(options)))
}

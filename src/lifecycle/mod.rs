//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Trigger (trigger.rs):
//!     SIGINT/SIGTERM or ShutdownHandle → one TriggerEvent per invocation
//!
//! Coordinator (coordinator.rs):
//!     Arm trigger → serve → trigger fires → bounded shutdown → join → one outcome
//! ```
//!
//! # Design Decisions
//! - Trigger armed strictly before the serve loop starts (no lost-signal window)
//! - Signal registrations scoped to the invocation, released on every exit path
//! - Shutdown is not re-entrant: one trigger consumed, later ones ignored

pub(crate) mod coordinator;
pub mod shutdown;
pub mod trigger;

pub use shutdown::ShutdownHandle;
pub use trigger::TriggerEvent;

//! Generic observable events.
//!
//! Every notification surface in the crate (connection data, transport
//! events, driver events, logs) is an [`ObservableEvent<T>`].
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ObservableEvent`] | Ordered, optionally bounded observer list |
//! | [`EventObserver`] | Handle for unobserving and checkpoints |
//! | [`ObserverOptions`] | Run mode and description |
//! | [`RunMode`] | Synchronous or asynchronous delivery |

// ============================================================================
// Submodules
// ============================================================================

/// Observable event and notification fan-out.
pub mod observable;

/// Observer handles and checkpoints.
pub mod observer;

// ============================================================================
// Re-exports
// ============================================================================

pub use observable::ObservableEvent;
pub use observer::{CheckpointTask, EventObserver, ObserverFuture, ObserverOptions, RunMode};

//! WebDriver BiDi client core.
//!
//! This library implements the client side of a bidirectional, id-correlated
//! browser automation protocol over a persistent WebSocket connection.
//!
//! # Architecture
//!
//! Three layers, leaf first:
//!
//! - **Connection**: duplex text channel ([`WebSocketConnection`] by default)
//! - **Transport**: assigns command ids, matches responses, classifies and
//!   routes every inbound message
//! - **Driver**: timeout-bounded commands, module registry, typed events
//!
//! Every layer reports through [`ObservableEvent`]s, a bounded publish/subscribe
//! primitive with synchronous and asynchronous observers.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use webdriver_bidi::{Driver, RawCommand, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let driver = Driver::new(Duration::from_secs(10))?;
//!     driver.start("ws://127.0.0.1:9222/session").await?;
//!
//!     let status = driver
//!         .execute_command(&RawCommand::without_params("session.status"))
//!         .await?;
//!     println!("Status: {status}");
//!
//!     driver.stop().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`driver`] | Driver, builder and module registry |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Observable events and observers |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire messages, commands and notification payloads |
//! | [`transport`] | Connection and command correlation |

// ============================================================================
// Modules
// ============================================================================

/// Driver, builder and module registry.
///
/// Use [`Driver::builder()`] to create a configured driver instance.
pub mod driver;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Observable events and observers.
pub mod events;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire messages, commands and notification payloads.
pub mod protocol;

/// Connection and transport layers.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Driver types
pub use driver::{Driver, DriverBuilder, Module, WeakDriver};

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{EventObserver, ObservableEvent, ObserverOptions, RunMode};

// Identifier types
pub use identifiers::{CommandId, ObserverId};

// Protocol types
pub use protocol::{
    CommandParameters, EmptyResult, ErrorReceivedEventArgs, ErrorResult, EventInfo,
    EventReceivedEventArgs, LogLevel, LogMessageEventArgs, RawCommand,
    UnknownMessageReceivedEventArgs,
};

// Transport types
pub use transport::{Connection, Transport, WebSocketConnection};

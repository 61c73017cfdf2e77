//! Connection and transport layers.
//!
//! The transport turns a duplex text [`Connection`] into a command/response
//! protocol: it serializes commands with sequential ids, matches responses to
//! waiting callers, and publishes everything else as notifications.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Driver         │                              │  Remote End     │
//! │                 │         WebSocket            │  (Browser)      │
//! │  Transport      │◄────────────────────────────►│                 │
//! │  → Connection   │                              │  BiDi Server    │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. `Transport::connect` - Start the connection and the dispatch task
//! 2. `Transport::send_command` - Send a command, get a [`PendingResponse`]
//! 3. Inbound data is queued and dispatched in arrival order
//! 4. `Transport::close` - Drain queued data, then stop the connection
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection trait and WebSocket implementation |
//! | `core` | Command correlation and inbound dispatch |

// ============================================================================
// Submodules
// ============================================================================

/// Connection trait and WebSocket implementation.
pub mod connection;

/// Command correlation and inbound dispatch.
pub mod core;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionDataReceivedEventArgs, WebSocketConnection};
pub use core::{CommandOutcome, PendingResponse, Transport};

//! WebSocket protocol message types.
//!
//! This module defines the message format exchanged with the remote end.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | Command | Local → Remote | `{"id", "method", "params"}` |
//! | Success | Remote → Local | `{"type": "success", "id", "result"}` |
//! | Error | Remote → Local | `{"type": "error", "id", "error", "message", "stacktrace"}` |
//! | Event | Remote → Local | `{"type": "event", "method", "params"}` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command parameters, envelopes and result shapes |
//! | `event` | Event notification payloads |
//! | `log` | Log notification payloads |
//! | `message` | Inbound message classification |

// ============================================================================
// Submodules
// ============================================================================

/// Command parameters and result shapes.
pub mod command;

/// Event notification payloads.
pub mod event;

/// Log notification payloads.
pub mod log;

/// Inbound message classification.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub(crate) use command::CommandRequest;
pub use command::{CommandParameters, EmptyResult, ErrorResult, RawCommand};
pub use event::{
    ErrorReceivedEventArgs, EventInfo, EventReceivedEventArgs, ProtocolEventReceivedEventArgs,
    UnknownMessageReceivedEventArgs,
};
pub use log::{LogLevel, LogMessageEventArgs};
pub use message::{InboundMessage, UnclassifiableReason};

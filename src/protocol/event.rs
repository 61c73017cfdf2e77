//! Event payloads published by the transport and the driver.
//!
//! # Notifications
//!
//! | Type | Published by | When |
//! |------|--------------|------|
//! | [`ProtocolEventReceivedEventArgs`] | Transport | An event message arrived |
//! | [`EventReceivedEventArgs`] | Driver | A registered event converted to its type |
//! | [`EventInfo`] | Driver (per event name) | Same, typed |
//! | [`ErrorReceivedEventArgs`] | Transport, Driver | An error with no waiting command |
//! | [`UnknownMessageReceivedEventArgs`] | Transport, Driver | A message matched no known shape |

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::ErrorResult;

// ============================================================================
// ProtocolEventReceivedEventArgs
// ============================================================================

/// Raw event message, before conversion to a registered payload type.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolEventReceivedEventArgs {
    /// Event name in `module.eventName` format.
    pub event_name: String,
    /// The raw `params` object.
    pub params: Value,
    /// The full message text as received.
    pub raw_message: String,
}

impl ProtocolEventReceivedEventArgs {
    /// Returns the module name from the event name.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // event_name = "browsingContext.load"
    /// assert_eq!(args.module(), "browsingContext");
    /// ```
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        self.event_name.split('.').next().unwrap_or_default()
    }
}

// ============================================================================
// EventReceivedEventArgs
// ============================================================================

/// A registered event whose params converted to the bound payload type.
#[derive(Clone)]
pub struct EventReceivedEventArgs {
    /// Event name in `module.eventName` format.
    pub event_name: String,
    /// Converted payload.
    data: Arc<dyn Any + Send + Sync>,
}

impl EventReceivedEventArgs {
    pub(crate) fn new(event_name: impl Into<String>, data: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            event_name: event_name.into(),
            data,
        }
    }

    /// Returns the payload if it is of type `T`.
    #[inline]
    #[must_use]
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Returns the payload as a shared `T`, if it is of that type.
    #[must_use]
    pub fn data_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }
}

impl fmt::Debug for EventReceivedEventArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReceivedEventArgs")
            .field("event_name", &self.event_name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EventInfo
// ============================================================================

/// Typed event published on a per-event-name observable.
#[derive(Debug)]
pub struct EventInfo<T> {
    /// Event name in `module.eventName` format.
    pub event_name: String,
    /// Converted payload.
    pub data: Arc<T>,
}

impl<T> Clone for EventInfo<T> {
    fn clone(&self) -> Self {
        Self {
            event_name: self.event_name.clone(),
            data: Arc::clone(&self.data),
        }
    }
}

// ============================================================================
// ErrorReceivedEventArgs
// ============================================================================

/// Error response not associated with any waiting command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReceivedEventArgs {
    /// The converted error payload.
    pub error: ErrorResult,
}

// ============================================================================
// UnknownMessageReceivedEventArgs
// ============================================================================

/// Message that matched no known shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMessageReceivedEventArgs {
    /// The message text, verbatim.
    pub message: String,
}

// ============================================================================
// Tests
// ============================================================================

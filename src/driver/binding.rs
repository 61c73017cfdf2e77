//! Event name to payload type bindings.
//!
//! A binding converts the raw `params` of one event name into its registered
//! payload type and publishes the typed result on that name's own
//! [`ObservableEvent`].

// ============================================================================
// Imports
// ============================================================================

use std::any::{Any, type_name};
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::events::ObservableEvent;
use crate::protocol::EventInfo;

// ============================================================================
// Types
// ============================================================================

/// A converted, type-erased event payload.
pub(crate) type EventPayload = Arc<dyn Any + Send + Sync>;

// ============================================================================
// EventBinding
// ============================================================================

/// Type-erased binding held by the driver.
pub(crate) trait EventBinding: Send + Sync {
    /// Name of the bound payload type.
    fn payload_type(&self) -> &'static str;

    /// Converts raw params to the bound type.
    fn convert(&self, params: Value) -> serde_json::Result<EventPayload>;

    /// Publishes a converted payload on the typed event.
    fn publish(&self, event_name: String, data: EventPayload) -> BoxFuture<'_, ()>;
}

// ============================================================================
// TypedEventBinding
// ============================================================================

/// Binding for payload type `T`.
pub(crate) struct TypedEventBinding<T> {
    event: ObservableEvent<EventInfo<T>>,
}

impl<T> TypedEventBinding<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a binding and the typed event it publishes on.
    pub(crate) fn new(event_name: &str) -> Self {
        Self {
            event: ObservableEvent::new(event_name),
        }
    }

    /// Returns the typed event. Clones share observers.
    pub(crate) fn event(&self) -> ObservableEvent<EventInfo<T>> {
        self.event.clone()
    }
}

impl<T> EventBinding for TypedEventBinding<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn payload_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn convert(&self, params: Value) -> serde_json::Result<EventPayload> {
        Ok(Arc::new(serde_json::from_value::<T>(params)?))
    }

    fn publish(&self, event_name: String, data: EventPayload) -> BoxFuture<'_, ()> {
        match data.downcast::<T>() {
            Ok(data) => self
                .event
                .notify_observers(EventInfo { event_name, data })
                .boxed(),
            Err(_) => async {}.boxed(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

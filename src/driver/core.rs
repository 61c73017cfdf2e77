//! Application-facing command and event API.
//!
//! The [`Driver`] wraps one [`Transport`] with a command timeout, a module
//! registry, and event name bindings that turn raw protocol events into typed
//! notifications.
//!
//! # Events
//!
//! | Event | Raised for |
//! |-------|------------|
//! | [`Driver::on_event_received`] | A bound event whose params converted |
//! | [`Driver::on_unknown_message_received`] | Unknown messages, unbound or unconvertible events |
//! | [`Driver::on_unexpected_error_received`] | Errors with no waiting command |
//! | [`Driver::on_log_message`] | Driver, transport and connection diagnostics |
//!
//! # Example
//!
//! ```ignore
//! use webdriver_bidi::{Driver, RawCommand};
//!
//! let driver = Driver::new(Duration::from_secs(10))?;
//! driver.start("ws://127.0.0.1:9222/session").await?;
//!
//! let status = driver
//!     .execute_command(&RawCommand::without_params("session.status"))
//!     .await?;
//!
//! driver.stop().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::ObservableEvent;
use crate::protocol::{
    CommandParameters, ErrorReceivedEventArgs, EventInfo, EventReceivedEventArgs, LogLevel,
    LogMessageEventArgs, ProtocolEventReceivedEventArgs, UnknownMessageReceivedEventArgs,
};
use crate::transport::{CommandOutcome, Transport};

use super::binding::{EventBinding, TypedEventBinding};
use super::builder::DriverBuilder;
use super::registry::{Module, ModuleRegistry};

// ============================================================================
// Constants
// ============================================================================

/// Component name used in log notifications.
const COMPONENT: &str = "Driver";

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the driver.
pub(crate) struct DriverInner {
    /// How long `execute_command` waits for a response.
    command_timeout: Duration,

    /// Command correlation and dispatch.
    transport: Transport,

    /// Registered protocol modules.
    modules: ModuleRegistry,

    /// Payload type bindings by event name.
    events: RwLock<FxHashMap<String, Arc<dyn EventBinding>>>,

    on_event_received: ObservableEvent<EventReceivedEventArgs>,
    on_unknown_message_received: ObservableEvent<UnknownMessageReceivedEventArgs>,
    on_unexpected_error_received: ObservableEvent<ErrorReceivedEventArgs>,
    on_log_message: ObservableEvent<LogMessageEventArgs>,
}

// ============================================================================
// Driver
// ============================================================================

/// Entry point for executing commands and observing protocol events.
///
/// Cloning a driver shares its state. Modules should hold a [`WeakDriver`].
#[derive(Clone)]
pub struct Driver {
    /// Shared inner state.
    pub(crate) inner: Arc<DriverInner>,
}

// ============================================================================
// Driver - Display
// ============================================================================

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("command_timeout", &self.inner.command_timeout)
            .field("connected", &self.inner.transport.is_connected())
            .field("modules", &self.inner.modules.names())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Driver - Construction
// ============================================================================

impl Driver {
    /// Creates a configuration builder for the driver.
    #[inline]
    #[must_use]
    pub fn builder() -> DriverBuilder {
        DriverBuilder::new()
    }

    /// Creates a driver over a default WebSocket connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `command_timeout` is zero.
    pub fn new(command_timeout: Duration) -> Result<Self> {
        DriverBuilder::new().command_timeout(command_timeout).build()
    }

    /// Wires a driver to `transport`.
    pub(crate) fn from_parts(command_timeout: Duration, transport: Transport) -> Result<Self> {
        let inner = Arc::new(DriverInner {
            command_timeout,
            transport,
            modules: ModuleRegistry::default(),
            events: RwLock::new(FxHashMap::default()),
            on_event_received: ObservableEvent::new("driver.eventReceived"),
            on_unknown_message_received: ObservableEvent::new("driver.unknownMessageReceived"),
            on_unexpected_error_received: ObservableEvent::new("driver.unexpectedErrorReceived"),
            on_log_message: ObservableEvent::new("driver.logMessage"),
        });

        DriverInner::observe_transport(&inner)?;

        Ok(Self { inner })
    }
}

// ============================================================================
// Driver - Lifecycle
// ============================================================================

impl Driver {
    /// Connects to the remote end at `url`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] if already started
    /// - Any connection error
    pub async fn start(&self, url: &str) -> Result<()> {
        self.inner.transport.connect(url).await
    }

    /// Disconnects after dispatching all data already received.
    ///
    /// Concurrent calls all wait for the same drain. Call this from an
    /// asynchronous observer, not a synchronous one: synchronous observers run
    /// on the dispatch task being drained.
    ///
    /// # Errors
    ///
    /// - [`Error::DispatchReentrancy`] if called from a synchronous observer
    /// - Any error from stopping the connection
    pub async fn stop(&self) -> Result<()> {
        self.inner.transport.close().await
    }

    /// Returns a weak handle that does not keep the driver alive.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakDriver {
        WeakDriver {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

// ============================================================================
// Driver - Commands
// ============================================================================

impl Driver {
    /// Sends `command` and waits for its converted result.
    ///
    /// Commands are correlated by id; concurrent calls complete in whatever
    /// order their responses arrive.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandTimeout`] if no response arrives within the timeout
    /// - [`Error::CommandFailed`] if the remote end returned an error
    /// - [`Error::ResultConversion`] if the result did not convert
    /// - [`Error::ErrorConversion`] if the error response did not convert
    /// - [`Error::EmptyResponse`] if the command was dropped unresolved
    /// - [`Error::NotConnected`] or a connection error if sending failed
    pub async fn execute_command<C: CommandParameters>(&self, command: &C) -> Result<C::Result> {
        let pending = self.inner.transport.send_command(command).await?;
        let id = pending.id();
        let name = pending.command().to_owned();

        let Ok(outcome) = timeout(self.inner.command_timeout, pending.outcome()).await else {
            debug!(%id, command = %name, "Command timed out");
            return Err(Error::command_timeout(name));
        };

        match outcome {
            Some(CommandOutcome::Success(value)) => value
                .downcast::<C::Result>()
                .map(|result| *result)
                .map_err(|_| Error::result_conversion(type_name::<C::Result>(), None)),

            Some(CommandOutcome::Error(error)) => Err(Error::command_failed(name, error)),

            Some(CommandOutcome::ResultConversionFailed { type_name, source }) => {
                Err(Error::result_conversion(type_name, Some(source)))
            }

            Some(CommandOutcome::ErrorConversionFailed(source)) => {
                Err(Error::ErrorConversion { source })
            }

            None => Err(Error::empty_response(name, id)),
        }
    }
}

// ============================================================================
// Driver - Modules and Events
// ============================================================================

impl Driver {
    /// Registers `module` under its name, replacing any module of that name.
    pub fn register_module<M: Module>(&self, module: M) -> Arc<M> {
        let module = Arc::new(module);
        if self.inner.modules.register(Arc::clone(&module)) {
            debug!(module = %module.name(), "Replaced registered module");
        }
        module
    }

    /// Returns the module registered as `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotRegistered`] if no module has that name
    /// - [`Error::ModuleTypeMismatch`] if the module is not a `T`
    pub fn get_module<T: Module>(&self, name: &str) -> Result<Arc<T>> {
        self.inner.modules.get(name)
    }

    /// Returns `true` if a module named `name` is registered.
    #[inline]
    #[must_use]
    pub fn has_module(&self, name: &str) -> bool {
        self.inner.modules.contains(name)
    }

    /// Binds `event_name` to payload type `T`.
    ///
    /// Events with this name are converted to `T` and published on the
    /// returned event and on [`on_event_received`](Self::on_event_received).
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventAlreadyRegistered`] if the name is already bound.
    pub fn register_event<T>(&self, event_name: &str) -> Result<ObservableEvent<EventInfo<T>>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let mut events = self.inner.events.write();
        if events.contains_key(event_name) {
            return Err(Error::event_already_registered(event_name));
        }

        let binding = TypedEventBinding::<T>::new(event_name);
        let event = binding.event();
        events.insert(event_name.to_owned(), Arc::new(binding));

        debug!(event = %event_name, payload = %type_name::<T>(), "Registered event");
        Ok(event)
    }

    /// Returns `true` if `event_name` is bound to a payload type.
    #[inline]
    #[must_use]
    pub fn is_event_registered(&self, event_name: &str) -> bool {
        self.inner.events.read().contains_key(event_name)
    }
}

// ============================================================================
// Driver - Accessors
// ============================================================================

impl Driver {
    /// Returns the command timeout.
    #[inline]
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.inner.command_timeout
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Raised for bound events whose params converted.
    #[inline]
    #[must_use]
    pub fn on_event_received(&self) -> &ObservableEvent<EventReceivedEventArgs> {
        &self.inner.on_event_received
    }

    /// Raised for messages that could not be handled.
    #[inline]
    #[must_use]
    pub fn on_unknown_message_received(&self) -> &ObservableEvent<UnknownMessageReceivedEventArgs> {
        &self.inner.on_unknown_message_received
    }

    /// Raised for error responses with no waiting command.
    #[inline]
    #[must_use]
    pub fn on_unexpected_error_received(&self) -> &ObservableEvent<ErrorReceivedEventArgs> {
        &self.inner.on_unexpected_error_received
    }

    /// Raised for driver, transport and connection diagnostics.
    #[inline]
    #[must_use]
    pub fn on_log_message(&self) -> &ObservableEvent<LogMessageEventArgs> {
        &self.inner.on_log_message
    }
}

// ============================================================================
// DriverInner - Transport Notifications
// ============================================================================

impl DriverInner {
    /// Subscribes to the transport's notifications.
    ///
    /// Observers hold a weak reference so the transport does not keep the
    /// driver alive.
    fn observe_transport(inner: &Arc<Self>) -> Result<()> {
        let transport = &inner.transport;

        let weak = Arc::downgrade(inner);
        transport.on_event_received().add_observer(move |args| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_protocol_event(args).await;
                }
            }
        })?;

        let weak = Arc::downgrade(inner);
        transport.on_error_received().add_observer(move |args| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_unexpected_error_received.notify_observers(args).await;
                }
            }
        })?;

        let weak = Arc::downgrade(inner);
        transport
            .on_unknown_message_received()
            .add_observer(move |args| {
                let weak = Weak::clone(&weak);
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_unknown_message_received.notify_observers(args).await;
                    }
                }
            })?;

        let weak = Arc::downgrade(inner);
        transport.on_log_message().add_observer(move |args| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_log_message.notify_observers(args).await;
                }
            }
        })?;

        Ok(())
    }

    /// Converts a protocol event through its binding and publishes it.
    async fn handle_protocol_event(&self, args: ProtocolEventReceivedEventArgs) {
        let ProtocolEventReceivedEventArgs {
            event_name,
            params,
            raw_message,
        } = args;

        let binding = self.events.read().get(&event_name).cloned();
        let Some(binding) = binding else {
            self.log(
                LogLevel::Error,
                format!(
                    "Unexpected error parsing event JSON: no payload type registered for event {event_name}"
                ),
            )
            .await;
            self.notify_unknown_message(raw_message).await;
            return;
        };

        match binding.convert(params) {
            Ok(data) => {
                binding
                    .publish(event_name.clone(), Arc::clone(&data))
                    .await;
                self.on_event_received
                    .notify_observers(EventReceivedEventArgs::new(event_name, data))
                    .await;
            }
            Err(e) => {
                self.log(
                    LogLevel::Error,
                    format!(
                        "Unexpected error parsing event JSON for event {event_name} as {}: {e}",
                        binding.payload_type()
                    ),
                )
                .await;
                self.notify_unknown_message(raw_message).await;
            }
        }
    }

    async fn notify_unknown_message(&self, message: String) {
        self.on_unknown_message_received
            .notify_observers(UnknownMessageReceivedEventArgs { message })
            .await;
    }

    async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogMessageEventArgs::new(level, COMPONENT, message);
        entry.trace();
        self.on_log_message.notify_observers(entry).await;
    }
}

// ============================================================================
// WeakDriver
// ============================================================================

/// Non-owning driver handle.
#[derive(Clone)]
pub struct WeakDriver {
    inner: Weak<DriverInner>,
}

impl WeakDriver {
    /// Returns the driver if it is still alive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverDropped`] if every [`Driver`] clone was dropped.
    pub fn upgrade(&self) -> Result<Driver> {
        self.inner
            .upgrade()
            .map(|inner| Driver { inner })
            .ok_or(Error::DriverDropped)
    }
}

impl fmt::Debug for WeakDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDriver")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

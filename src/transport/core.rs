//! Command correlation and inbound dispatch.
//!
//! The [`Transport`] owns a [`Connection`], assigns sequential ids to outbound
//! commands, keeps the table of commands waiting for a response, and routes
//! every inbound message.
//!
//! # Dispatch
//!
//! Inbound data is queued by a connection observer and drained by a single
//! dispatch task, one message at a time:
//!
//! | Message | Action |
//! |---------|--------|
//! | Success, id pending | Convert `result`, resolve the command |
//! | Error, id pending | Convert to [`ErrorResult`], resolve the command |
//! | Error, id absent or unknown | Raise [`Transport::on_error_received`] |
//! | Event | Raise [`Transport::on_event_received`] |
//! | Unclassifiable | Log (if malformed), raise [`Transport::on_unknown_message_received`] |
//!
//! Nothing on this path returns an error to the connection; failures become
//! log entries and notifications.
//!
//! [`Transport::close`] closes the queue and waits until the task has dispatched
//! everything already queued. Concurrent calls share that wait.
//!
//! # Timeouts
//!
//! The transport never evicts a pending command on its own. A response that
//! arrives after its caller stopped waiting is still matched and converted,
//! then discarded.

// ============================================================================
// Imports
// ============================================================================

use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tracing::trace;

use crate::error::{Error, Result};
use crate::events::{EventObserver, ObservableEvent};
use crate::identifiers::{CommandId, CommandIdGenerator};
use crate::protocol::{
    CommandParameters, CommandRequest, ErrorReceivedEventArgs, ErrorResult, InboundMessage,
    LogLevel, LogMessageEventArgs, ProtocolEventReceivedEventArgs,
    UnknownMessageReceivedEventArgs,
};

use super::connection::{Connection, ConnectionDataReceivedEventArgs, WebSocketConnection};

// ============================================================================
// Constants
// ============================================================================

/// Component name used in log notifications.
const COMPONENT: &str = "Transport";

// ============================================================================
// Types
// ============================================================================

/// Converts a raw `result` object into the command's result type.
type ResultConverter = fn(Value) -> serde_json::Result<Box<dyn Any + Send>>;

/// Pending commands keyed by id.
type PendingMap = FxHashMap<CommandId, PendingCommand>;

fn convert_result<R>(value: Value) -> serde_json::Result<Box<dyn Any + Send>>
where
    R: DeserializeOwned + Send + 'static,
{
    Ok(Box::new(serde_json::from_value::<R>(value)?))
}

// ============================================================================
// CommandOutcome
// ============================================================================

/// How a pending command was resolved.
pub enum CommandOutcome {
    /// Success; holds the converted result.
    Success(Box<dyn Any + Send>),
    /// The remote end answered with an error.
    Error(ErrorResult),
    /// The `result` object did not convert to the declared result type.
    ResultConversionFailed {
        /// Declared result type.
        type_name: &'static str,
        /// Decode failure.
        source: serde_json::Error,
    },
    /// The error response did not convert to [`ErrorResult`].
    ErrorConversionFailed(serde_json::Error),
}

impl fmt::Debug for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) => f.write_str("Success(..)"),
            Self::Error(error) => f.debug_tuple("Error").field(error).finish(),
            Self::ResultConversionFailed { type_name, source } => f
                .debug_struct("ResultConversionFailed")
                .field("type_name", type_name)
                .field("source", source)
                .finish(),
            Self::ErrorConversionFailed(source) => {
                f.debug_tuple("ErrorConversionFailed").field(source).finish()
            }
        }
    }
}

// ============================================================================
// PendingCommand
// ============================================================================

/// A sent command waiting for its response.
struct PendingCommand {
    /// Method name, for logs.
    command: String,
    /// Declared result type name.
    result_type: &'static str,
    /// Converter into the declared result type.
    convert: ResultConverter,
    /// Resolved exactly once.
    completion: oneshot::Sender<CommandOutcome>,
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Caller's side of a sent command.
#[derive(Debug)]
pub struct PendingResponse {
    id: CommandId,
    command: String,
    receiver: oneshot::Receiver<CommandOutcome>,
}

impl PendingResponse {
    /// Returns the id the command was sent with.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Returns the command's method name.
    #[inline]
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Waits for the command to be resolved.
    ///
    /// Returns `None` if the transport dropped the command without resolving
    /// it. Dropping this future stops waiting; a later response is discarded.
    pub async fn outcome(self) -> Option<CommandOutcome> {
        self.receiver.await.ok()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Inbound queue and the task draining it.
struct Dispatcher {
    queue_tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

/// Completion of a drain started by `close`.
type Drained = Shared<BoxFuture<'static, ()>>;

/// Lifecycle of the dispatch task.
enum DispatchState {
    /// Not connected.
    Idle,
    /// Connected; inbound data is queued.
    Running(Dispatcher),
    /// Queue closed; the task is finishing data already received.
    Draining {
        task_id: task::Id,
        drained: Drained,
    },
}

impl DispatchState {
    /// Id of the dispatch task, if one exists.
    fn task_id(&self) -> Option<task::Id> {
        match self {
            Self::Idle => None,
            Self::Running(dispatcher) => Some(dispatcher.task.id()),
            Self::Draining { task_id, .. } => Some(*task_id),
        }
    }

    /// Returns `true` when called from the dispatch task itself.
    fn on_dispatch_task(&self) -> bool {
        self.task_id().is_some_and(|id| task::try_id() == Some(id))
    }
}

/// Observers the transport holds on its connection while connected.
struct ConnectionObservers {
    data: EventObserver<ConnectionDataReceivedEventArgs>,
    log: EventObserver<LogMessageEventArgs>,
}

impl ConnectionObservers {
    fn unobserve(&self) {
        self.data.unobserve();
        self.log.unobserve();
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Command/response correlation over one [`Connection`].
///
/// # Example
///
/// ```ignore
/// let transport = Transport::new(Arc::new(WebSocketConnection::new()));
/// transport.connect("ws://127.0.0.1:9222/session").await?;
///
/// let pending = transport.send_command(&RawCommand::without_params("session.status")).await?;
/// let outcome = pending.outcome().await;
///
/// transport.close().await?;
/// ```
pub struct Transport {
    inner: Arc<TransportInner>,
}

/// State shared with the dispatch task and connection observers.
struct TransportInner {
    connection: Arc<dyn Connection>,
    command_ids: CommandIdGenerator,
    pending: Mutex<PendingMap>,
    dispatch: Mutex<DispatchState>,
    connection_observers: Mutex<Option<ConnectionObservers>>,
    on_event_received: ObservableEvent<ProtocolEventReceivedEventArgs>,
    on_error_received: ObservableEvent<ErrorReceivedEventArgs>,
    on_unknown_message_received: ObservableEvent<UnknownMessageReceivedEventArgs>,
    on_log_message: ObservableEvent<LogMessageEventArgs>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(Arc::new(WebSocketConnection::new()))
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("connected", &self.is_connected())
            .field("pending_commands", &self.pending_command_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transport - Public API
// ============================================================================

impl Transport {
    /// Creates a transport over `connection`.
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                connection,
                command_ids: CommandIdGenerator::default(),
                pending: Mutex::new(PendingMap::default()),
                dispatch: Mutex::new(DispatchState::Idle),
                connection_observers: Mutex::new(None),
                on_event_received: ObservableEvent::new("transport.eventReceived"),
                on_error_received: ObservableEvent::new("transport.errorReceived"),
                on_unknown_message_received: ObservableEvent::new(
                    "transport.unknownMessageReceived",
                ),
                on_log_message: ObservableEvent::new("transport.logMessage"),
            }),
        }
    }

    /// Opens the connection and starts dispatching inbound data.
    ///
    /// Waits for a drain still in progress from an earlier [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] if already connected
    /// - [`Error::DispatchReentrancy`] if called from a synchronous observer
    ///   while the transport is closing
    /// - Any error from [`Connection::start`]
    pub async fn connect(&self, url: &str) -> Result<()> {
        loop {
            let drained = {
                let mut dispatch = self.inner.dispatch.lock();
                if dispatch.on_dispatch_task() {
                    return Err(Error::DispatchReentrancy);
                }

                match &*dispatch {
                    DispatchState::Running(_) => return Err(Error::AlreadyConnected),
                    DispatchState::Draining { drained, .. } => drained.clone(),
                    DispatchState::Idle => {
                        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
                        let task = tokio::spawn(TransportInner::run_dispatch_loop(
                            Arc::downgrade(&self.inner),
                            queue_rx,
                        ));
                        *dispatch = DispatchState::Running(Dispatcher { queue_tx, task });
                        break;
                    }
                }
            };
            drained.await;
        }

        if let Err(e) = self.attach_connection_observers() {
            self.abort_connect().await;
            return Err(e);
        }

        if let Err(e) = self.inner.connection.start(url).await {
            self.abort_connect().await;
            return Err(e);
        }

        self.inner
            .log(LogLevel::Info, format!("Connected to {url}"))
            .await;
        Ok(())
    }

    /// Stops the connection after dispatching all data already received.
    ///
    /// No-op when not connected. A call made while another `close` is
    /// draining waits for that drain to finish.
    ///
    /// # Errors
    ///
    /// - [`Error::DispatchReentrancy`] if called from a synchronous observer,
    ///   which runs on the dispatch task being drained
    /// - Any error from [`Connection::stop`]
    pub async fn close(&self) -> Result<()> {
        if !self.shutdown_dispatch().await? {
            return Ok(());
        }

        self.inner.connection.stop().await?;
        self.inner.log(LogLevel::Info, "Disconnected").await;
        Ok(())
    }

    /// Sends a command and registers it as pending.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if not connected
    /// - [`Error::Json`] if the command does not serialize
    /// - Any error from [`Connection::send_data`]; the command is not left pending
    pub async fn send_command<C: CommandParameters>(&self, command: &C) -> Result<PendingResponse> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let id = self.inner.command_ids.next();
        let method = command.method_name().to_owned();
        let data = serde_json::to_string(&CommandRequest::new(id, command))?;

        let (completion, receiver) = oneshot::channel();

        // Store correlation before sending
        self.inner.pending.lock().insert(
            id,
            PendingCommand {
                command: method.clone(),
                result_type: type_name::<C::Result>(),
                convert: convert_result::<C::Result>,
                completion,
            },
        );

        if let Err(e) = self.inner.connection.send_data(&data).await {
            self.inner.pending.lock().remove(&id);
            self.inner
                .log(LogLevel::Error, format!("Failed to send command {method} with id {id}: {e}"))
                .await;
            return Err(e);
        }

        trace!(%id, command = %method, "Command sent");

        Ok(PendingResponse {
            id,
            command: method,
            receiver,
        })
    }

    /// Returns `true` between [`connect`](Self::connect) and [`close`](Self::close).
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(*self.inner.dispatch.lock(), DispatchState::Running(_))
    }

    /// Returns the number of commands waiting for a response.
    #[inline]
    #[must_use]
    pub fn pending_command_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Drops every pending command without resolving it.
    #[cfg(test)]
    pub(crate) fn abandon_pending_commands(&self) -> usize {
        let mut pending = self.inner.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.inner.connection
    }

    /// Raised for every event message.
    #[inline]
    #[must_use]
    pub fn on_event_received(&self) -> &ObservableEvent<ProtocolEventReceivedEventArgs> {
        &self.inner.on_event_received
    }

    /// Raised for error messages no pending command is waiting for.
    #[inline]
    #[must_use]
    pub fn on_error_received(&self) -> &ObservableEvent<ErrorReceivedEventArgs> {
        &self.inner.on_error_received
    }

    /// Raised for messages that match no known shape.
    #[inline]
    #[must_use]
    pub fn on_unknown_message_received(&self) -> &ObservableEvent<UnknownMessageReceivedEventArgs> {
        &self.inner.on_unknown_message_received
    }

    /// Raised for transport and connection diagnostics.
    #[inline]
    #[must_use]
    pub fn on_log_message(&self) -> &ObservableEvent<LogMessageEventArgs> {
        &self.inner.on_log_message
    }
}

// ============================================================================
// Transport - Lifecycle Helpers
// ============================================================================

impl Transport {
    /// Subscribes to the connection's data and log events.
    fn attach_connection_observers(&self) -> Result<()> {
        let events = &*self.inner.connection;

        let weak = Arc::downgrade(&self.inner);
        let data = events.on_data_received().add_observer(move |args| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.enqueue(args.data).await;
                }
            }
        })?;

        let weak = Arc::downgrade(&self.inner);
        let log = events.on_log_message().add_observer(move |args| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_log_message.notify_observers(args).await;
                }
            }
        });
        let log = match log {
            Ok(log) => log,
            Err(e) => {
                data.unobserve();
                return Err(e);
            }
        };

        *self.inner.connection_observers.lock() = Some(ConnectionObservers { data, log });
        Ok(())
    }

    /// Closes the inbound queue and waits for the dispatch task to drain it.
    ///
    /// Returns `true` for the call that started the drain and `false` for a
    /// call that found nothing to shut down or joined a drain in progress.
    async fn shutdown_dispatch(&self) -> Result<bool> {
        let (drained, started) = {
            let mut dispatch = self.inner.dispatch.lock();
            if dispatch.on_dispatch_task() {
                return Err(Error::DispatchReentrancy);
            }

            match std::mem::replace(&mut *dispatch, DispatchState::Idle) {
                DispatchState::Idle => return Ok(false),
                DispatchState::Running(dispatcher) => {
                    let task_id = dispatcher.task.id();
                    let drained = TransportInner::drain(Arc::clone(&self.inner), dispatcher)
                        .boxed()
                        .shared();
                    *dispatch = DispatchState::Draining {
                        task_id,
                        drained: drained.clone(),
                    };
                    (drained, true)
                }
                DispatchState::Draining { task_id, drained } => {
                    *dispatch = DispatchState::Draining {
                        task_id,
                        drained: drained.clone(),
                    };
                    (drained, false)
                }
            }
        };

        drained.await;
        Ok(started)
    }

    /// Undoes a partial `connect`.
    async fn abort_connect(&self) {
        if let Err(e) = self.shutdown_dispatch().await {
            self.inner
                .log(LogLevel::Error, format!("Failed to stop dispatch: {e}"))
                .await;
        }
    }
}

// ============================================================================
// TransportInner - Dispatch
// ============================================================================

impl TransportInner {
    /// Drains the inbound queue until it closes or the transport is dropped.
    async fn run_dispatch_loop(inner: Weak<Self>, mut queue_rx: mpsc::UnboundedReceiver<String>) {
        while let Some(data) = queue_rx.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.process_message(data).await;
        }

        trace!("Dispatch loop terminated");
    }

    /// Drops the queue sender, waits for the dispatch task, then detaches
    /// from the connection.
    async fn drain(inner: Arc<Self>, dispatcher: Dispatcher) {
        let Dispatcher { queue_tx, task } = dispatcher;
        drop(queue_tx);

        if let Err(e) = task.await {
            inner
                .log(LogLevel::Error, format!("Dispatch task failed: {e}"))
                .await;
        }

        if let Some(observers) = inner.connection_observers.lock().take() {
            observers.unobserve();
        }
        *inner.dispatch.lock() = DispatchState::Idle;
    }

    /// Queues inbound data for dispatch.
    async fn enqueue(&self, data: String) {
        let rejected = {
            match &*self.dispatch.lock() {
                DispatchState::Running(dispatcher) => {
                    dispatcher.queue_tx.send(data).err().map(|e| e.0)
                }
                _ => Some(data),
            }
        };

        if let Some(data) = rejected {
            self.log(
                LogLevel::Warn,
                format!("Discarding data received while not connected: {data}"),
            )
            .await;
        }
    }

    /// Classifies and routes one inbound message.
    async fn process_message(&self, text: String) {
        match InboundMessage::classify(&text) {
            InboundMessage::CommandSuccess { id, result } => {
                self.complete_success(id, result).await;
            }

            InboundMessage::CommandError { id, payload } => {
                self.complete_error(id, payload, text).await;
            }

            InboundMessage::ProtocolEvent { event_name, params } => {
                let args = ProtocolEventReceivedEventArgs {
                    event_name,
                    params,
                    raw_message: text,
                };
                self.on_event_received.notify_observers(args).await;
            }

            InboundMessage::Unclassifiable { reason } => {
                if let Some(line) = reason.log_message() {
                    self.log(LogLevel::Error, line).await;
                }
                self.notify_unknown_message(text).await;
            }
        }
    }

    async fn complete_success(&self, id: CommandId, result: Value) {
        let pending = self.pending.lock().remove(&id);
        let Some(pending) = pending else {
            self.log(
                LogLevel::Warn,
                format!("Received success response for unknown command id {id}"),
            )
            .await;
            return;
        };

        let outcome = match (pending.convert)(result) {
            Ok(value) => CommandOutcome::Success(value),
            Err(source) => {
                self.log(
                    LogLevel::Error,
                    format!(
                        "Unexpected error converting response for command {} with id {id} to {}: {source}",
                        pending.command, pending.result_type
                    ),
                )
                .await;
                CommandOutcome::ResultConversionFailed {
                    type_name: pending.result_type,
                    source,
                }
            }
        };

        self.resolve(id, pending, outcome).await;
    }

    async fn complete_error(&self, id: Option<CommandId>, payload: Value, text: String) {
        let pending = id.and_then(|id| {
            let pending = self.pending.lock().remove(&id);
            pending.map(|pending| (id, pending))
        });

        let error = serde_json::from_value::<ErrorResult>(payload);

        match (pending, error) {
            (Some((id, pending)), Ok(error)) => {
                self.resolve(id, pending, CommandOutcome::Error(error)).await;
            }

            (Some((id, pending)), Err(source)) => {
                self.log(
                    LogLevel::Error,
                    format!("Unexpected error parsing error JSON for command id {id}: {source}"),
                )
                .await;
                self.resolve(id, pending, CommandOutcome::ErrorConversionFailed(source))
                    .await;
            }

            (None, Ok(error)) => {
                self.on_error_received
                    .notify_observers(ErrorReceivedEventArgs { error })
                    .await;
            }

            (None, Err(source)) => {
                self.log(
                    LogLevel::Error,
                    format!("Unexpected error parsing error JSON: {source}"),
                )
                .await;
                self.notify_unknown_message(text).await;
            }
        }
    }

    /// Hands the outcome to the waiting caller, if it is still waiting.
    async fn resolve(&self, id: CommandId, pending: PendingCommand, outcome: CommandOutcome) {
        let PendingCommand {
            command,
            completion,
            ..
        } = pending;

        if completion.send(outcome).is_err() {
            self.log(
                LogLevel::Debug,
                format!("Discarding response for command {command} with id {id}; caller is no longer waiting"),
            )
            .await;
        } else {
            trace!(%id, %command, "Command resolved");
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
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tokio::time::timeout;

    use crate::protocol::RawCommand;
    use crate::transport::testing::{TestConnection, init_tracing};

    const WAIT: Duration = Duration::from_secs(2);

    #[derive(Serialize)]
    struct EchoCommand {
        value: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct EchoResult {
        value: String,
    }

    impl CommandParameters for EchoCommand {
        type Result = EchoResult;

        fn method_name(&self) -> &str {
            "test.echo"
        }
    }

    fn echo(value: &str) -> EchoCommand {
        EchoCommand {
            value: value.into(),
        }
    }

    async fn connected() -> (Transport, Arc<TestConnection>) {
        init_tracing();
        let connection = Arc::new(TestConnection::new());
        let transport = Transport::new(connection.clone());
        transport.connect("ws://test").await.expect("connect");
        (transport, connection)
    }

    fn channel_observer<T: Clone + Send + 'static>(
        event: &ObservableEvent<T>,
    ) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        event
            .add_sync_observer(move |args| {
                let _ = tx.send(args);
            })
            .expect("observer");
        rx
    }

    async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(WAIT, rx.recv())
            .await
            .expect("notification in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_connect_twice_fails() {
        let (transport, connection) = connected().await;
        assert_eq!(connection.url().as_deref(), Some("ws://test"));
        assert!(transport.is_connected());

        let err = transport.connect("ws://test").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyConnected));
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let transport = Transport::new(Arc::new(TestConnection::new()));
        let err = transport.send_command(&echo("x")).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        transport.close().await.expect("close when not connected");
    }

    #[tokio::test]
    async fn test_commands_get_sequential_ids() {
        let (transport, connection) = connected().await;

        let first = transport.send_command(&echo("a")).await.expect("send");
        let second = transport.send_command(&echo("b")).await.expect("send");
        assert_eq!(first.id(), CommandId::new(1));
        assert_eq!(second.id(), CommandId::new(2));
        assert_eq!(first.command(), "test.echo");

        assert_eq!(
            connection.next_sent().await,
            json!({ "id": 1, "method": "test.echo", "params": { "value": "a" } })
        );
        assert_eq!(connection.next_sent().await["id"], 2);
        assert_eq!(transport.pending_command_count(), 2);
    }

    #[tokio::test]
    async fn test_success_response_resolves_command() {
        let (transport, connection) = connected().await;
        let pending = transport.send_command(&echo("a")).await.expect("send");

        connection
            .receive(r#"{"type":"success","id":1,"result":{"value":"a"}}"#)
            .await;

        let outcome = timeout(WAIT, pending.outcome())
            .await
            .expect("resolved in time")
            .expect("outcome");
        let CommandOutcome::Success(value) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(
            *value.downcast::<EchoResult>().expect("result type"),
            EchoResult { value: "a".into() }
        );
        assert_eq!(transport.pending_command_count(), 0);
    }

    #[tokio::test]
    async fn test_unconvertible_result_reports_conversion_failure() {
        let (transport, connection) = connected().await;
        let pending = transport.send_command(&echo("a")).await.expect("send");

        connection
            .receive(r#"{"type":"success","id":1,"result":{"value":7}}"#)
            .await;

        let outcome = timeout(WAIT, pending.outcome()).await.expect("in time");
        assert!(matches!(
            outcome,
            Some(CommandOutcome::ResultConversionFailed { type_name, .. }) if type_name.ends_with("EchoResult")
        ));
    }

    #[tokio::test]
    async fn test_error_response_resolves_command() {
        let (transport, connection) = connected().await;
        let mut unexpected = channel_observer(transport.on_error_received());
        let pending = transport.send_command(&echo("a")).await.expect("send");

        connection
            .receive(r#"{"type":"error","id":1,"error":"unknown command","message":"nope","stacktrace":"at x"}"#)
            .await;

        let outcome = timeout(WAIT, pending.outcome()).await.expect("in time");
        let Some(CommandOutcome::Error(error)) = outcome else {
            panic!("expected error outcome, got {outcome:?}");
        };
        assert_eq!(error.error_type, "unknown command");
        assert_eq!(error.message, "nope");
        assert_eq!(error.stack_trace.as_deref(), Some("at x"));
        assert!(unexpected.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_error_for_pending_command() {
        let (transport, connection) = connected().await;
        let pending = transport.send_command(&echo("a")).await.expect("send");

        connection
            .receive(r#"{"type":"error","id":1,"error":"unknown error"}"#)
            .await;

        let outcome = timeout(WAIT, pending.outcome()).await.expect("in time");
        assert!(matches!(
            outcome,
            Some(CommandOutcome::ErrorConversionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_unassociated_errors_are_published() {
        let (transport, connection) = connected().await;
        let mut errors = channel_observer(transport.on_error_received());

        for text in [
            r#"{"type":"error","id":null,"error":"unknown error","message":"first"}"#,
            r#"{"type":"error","error":"unknown error","message":"second"}"#,
            r#"{"type":"error","id":99,"error":"unknown error","message":"third"}"#,
        ] {
            connection.receive(text).await;
        }

        for expected in ["first", "second", "third"] {
            assert_eq!(recv(&mut errors).await.error.message, expected);
        }
    }

    #[tokio::test]
    async fn test_malformed_unassociated_error_is_logged_and_unknown() {
        let (transport, connection) = connected().await;
        let mut logs = channel_observer(transport.on_log_message());
        let mut unknown = channel_observer(transport.on_unknown_message_received());

        let text = r#"{"type":"error","id":null,"message":"missing error code"}"#;
        connection.receive(text).await;

        assert_eq!(recv(&mut unknown).await.message, text);
        let log = recv(&mut logs).await;
        assert_eq!(log.level, LogLevel::Error);
        assert!(log.message.starts_with("Unexpected error parsing error JSON"));
        assert_eq!(log.component_name, "Transport");
    }

    #[tokio::test]
    async fn test_event_is_published_with_raw_text() {
        let (transport, connection) = connected().await;
        let mut events = channel_observer(transport.on_event_received());

        let text = r#"{"type":"event","method":"log.entryAdded","params":{"text":"hi"}}"#;
        connection.receive(text).await;

        let args = recv(&mut events).await;
        assert_eq!(args.event_name, "log.entryAdded");
        assert_eq!(args.params, json!({ "text": "hi" }));
        assert_eq!(args.raw_message, text);
    }

    #[tokio::test]
    async fn test_unknown_message_is_published_verbatim() {
        let (transport, connection) = connected().await;
        let mut unknown = channel_observer(transport.on_unknown_message_received());
        let mut logs = channel_observer(transport.on_log_message());

        let text = r#"{ "type" : "somethingElse", "value": [1, 2] }"#;
        connection.receive(text).await;

        assert_eq!(recv(&mut unknown).await.message, text);
        assert!(logs.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_json_is_logged_and_unknown() {
        let (transport, connection) = connected().await;
        let mut unknown = channel_observer(transport.on_unknown_message_received());
        let mut logs = channel_observer(transport.on_log_message());

        connection.receive("{ invalid").await;

        assert_eq!(recv(&mut unknown).await.message, "{ invalid");
        let log = recv(&mut logs).await;
        assert_eq!(log.level, LogLevel::Error);
        assert!(log.message.starts_with("Unexpected error parsing JSON message"));
    }

    #[tokio::test]
    async fn test_response_after_caller_stopped_waiting_is_discarded() {
        let (transport, connection) = connected().await;
        let mut logs = channel_observer(transport.on_log_message());

        let pending = transport.send_command(&echo("a")).await.expect("send");
        drop(pending);
        assert_eq!(transport.pending_command_count(), 1);

        connection
            .receive(r#"{"type":"success","id":1,"result":{"value":"late"}}"#)
            .await;

        let log = recv(&mut logs).await;
        assert_eq!(log.level, LogLevel::Debug);
        assert!(log.message.contains("Discarding response for command test.echo with id 1"));
        assert_eq!(transport.pending_command_count(), 0);

        // The dispatch loop is still alive.
        let mut unknown = channel_observer(transport.on_unknown_message_received());
        connection.receive(r#"{"type":"other"}"#).await;
        recv(&mut unknown).await;
    }

    #[tokio::test]
    async fn test_response_for_unknown_id_is_logged() {
        let (transport, connection) = connected().await;
        let mut logs = channel_observer(transport.on_log_message());

        connection
            .receive(r#"{"type":"success","id":42,"result":{}}"#)
            .await;

        let log = recv(&mut logs).await;
        assert_eq!(log.level, LogLevel::Warn);
        assert!(log.message.contains("unknown command id 42"));
    }

    #[tokio::test]
    async fn test_failed_send_does_not_leave_command_pending() {
        let (transport, connection) = connected().await;
        connection.fail_sends();

        let err = transport
            .send_command(&RawCommand::without_params("session.status"))
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(transport.pending_command_count(), 0);
    }

    #[tokio::test]
    async fn test_close_drains_received_data() {
        let (transport, connection) = connected().await;
        let delivered = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&delivered);
        transport
            .on_event_received()
            .add_observer(move |args| {
                let seen = Arc::clone(&seen);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    seen.lock().push(args.event_name);
                }
            })
            .expect("observer");

        connection
            .receive(r#"{"type":"event","method":"a.first","params":{}}"#)
            .await;
        connection
            .receive(r#"{"type":"event","method":"a.second","params":{}}"#)
            .await;

        transport.close().await.expect("close");

        assert_eq!(*delivered.lock(), vec!["a.first", "a.second"]);
        assert!(!transport.is_connected());
        assert!(!connection.is_active());
    }

    #[tokio::test]
    async fn test_concurrent_close_waits_for_drain() {
        let (transport, connection) = connected().await;
        let delivered = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&delivered);
        transport
            .on_event_received()
            .add_observer(move |args| {
                let seen = Arc::clone(&seen);
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    seen.lock().push(args.event_name);
                }
            })
            .expect("observer");

        connection
            .receive(r#"{"type":"event","method":"a.slow","params":{}}"#)
            .await;

        let (first, second) = tokio::join!(transport.close(), async {
            let result = transport.close().await;
            (result, delivered.lock().len())
        });

        first.expect("first close");
        let (second, delivered_at_second) = second;
        second.expect("second close");
        assert_eq!(delivered_at_second, 1);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_after_close_reconnects() {
        let (transport, connection) = connected().await;
        transport.close().await.expect("close");

        transport.connect("ws://test/again").await.expect("reconnect");
        assert!(transport.is_connected());
        assert_eq!(connection.url().as_deref(), Some("ws://test/again"));

        let mut events = channel_observer(transport.on_event_received());
        connection
            .receive(r#"{"type":"event","method":"a.back","params":{}}"#)
            .await;
        assert_eq!(recv(&mut events).await.event_name, "a.back");
    }

    #[tokio::test]
    async fn test_close_from_synchronous_observer_fails() {
        let (transport, connection) = connected().await;
        let transport = Arc::new(transport);
        let (tx, mut results) = mpsc::unbounded_channel();

        let closer = Arc::downgrade(&transport);
        transport
            .on_event_received()
            .add_observer(move |_| {
                let closer = Weak::clone(&closer);
                let tx = tx.clone();
                async move {
                    if let Some(transport) = closer.upgrade() {
                        let _ = tx.send(transport.close().await);
                    }
                }
            })
            .expect("observer");

        connection
            .receive(r#"{"type":"event","method":"a.stop","params":{}}"#)
            .await;

        let result = recv(&mut results).await;
        assert!(matches!(result, Err(Error::DispatchReentrancy)));
        assert!(transport.is_connected());

        transport.close().await.expect("close from outside dispatch");
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_failed_observer_attach_rolls_back_connect() {
        let connection = Arc::new(TestConnection::with_log_observer_limit(1));
        let blocker = connection
            .on_log_message()
            .add_sync_observer(|_| {})
            .expect("blocker");
        let transport = Transport::new(connection.clone());

        let err = transport.connect("ws://test").await.unwrap_err();
        assert!(matches!(err, Error::ObserverLimit { .. }));
        assert!(!transport.is_connected());
        assert!(connection.url().is_none());

        blocker.unobserve();
        transport.connect("ws://test").await.expect("connect");

        let mut events = channel_observer(transport.on_event_received());
        connection
            .receive(r#"{"type":"event","method":"a.once","params":{}}"#)
            .await;
        assert_eq!(recv(&mut events).await.event_name, "a.once");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_observer_panicking_before_future_keeps_dispatching() {
        let (transport, connection) = connected().await;
        transport
            .on_event_received()
            .add_observer(|args| {
                assert_ne!(args.event_name, "a.fail");
                async {}
            })
            .expect("observer");

        connection
            .receive(r#"{"type":"event","method":"a.fail","params":{}}"#)
            .await;

        let pending = transport.send_command(&echo("a")).await.expect("send");
        connection
            .receive(r#"{"type":"success","id":1,"result":{"value":"a"}}"#)
            .await;

        let outcome = timeout(WAIT, pending.outcome())
            .await
            .expect("resolved in time")
            .expect("outcome");
        assert!(matches!(outcome, CommandOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_data_after_close_is_discarded() {
        let (transport, connection) = connected().await;
        transport.close().await.expect("close");

        let mut events = channel_observer(transport.on_event_received());
        connection
            .receive(r#"{"type":"event","method":"a.late","params":{}}"#)
            .await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connection_logs_are_republished() {
        let (transport, connection) = connected().await;
        let mut logs = channel_observer(transport.on_log_message());

        connection
            .on_log_message()
            .notify_observers(LogMessageEventArgs::new(LogLevel::Info, "Connection", "hello"))
            .await;

        let log = recv(&mut logs).await;
        assert_eq!(log.component_name, "Connection");
        assert_eq!(log.message, "hello");
    }
}

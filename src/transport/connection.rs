//! Duplex connection to the remote end.
//!
//! The [`Connection`] trait is the transport's only view of the network:
//! start, send text, stop, and one inbound-text notification. Each delivery
//! is one complete message.
//!
//! [`WebSocketConnection`] is the default implementation on top of
//! `tokio-tungstenite`.
//!
//! # Event Loop
//!
//! Starting a [`WebSocketConnection`] spawns a tokio task that handles:
//!
//! - Incoming text frames, published through [`Connection::on_data_received`]
//! - Outgoing text from [`Connection::send_data`]
//! - Close frames and shutdown requests

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::events::ObservableEvent;
use crate::protocol::{LogLevel, LogMessageEventArgs};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the WebSocket handshake.
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Component name used in log notifications.
const COMPONENT: &str = "Connection";

// ============================================================================
// Types
// ============================================================================

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// ConnectionDataReceivedEventArgs
// ============================================================================

/// One complete inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDataReceivedEventArgs {
    /// Message text.
    pub data: String,
}

// ============================================================================
// Connection
// ============================================================================

/// Duplex text channel to the remote end.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Opens the connection.
    async fn start(&self, url: &str) -> Result<()>;

    /// Sends one text message.
    async fn send_data(&self, data: &str) -> Result<()>;

    /// Closes the connection.
    async fn stop(&self) -> Result<()>;

    /// Returns `true` while the connection is open.
    fn is_active(&self) -> bool;

    /// Raised once per inbound message.
    ///
    /// The connection awaits each notification before delivering the next.
    fn on_data_received(&self) -> &ObservableEvent<ConnectionDataReceivedEventArgs>;

    /// Raised for connection diagnostics.
    fn on_log_message(&self) -> &ObservableEvent<LogMessageEventArgs>;
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a text frame.
    Send {
        data: String,
        result_tx: oneshot::Sender<Result<()>>,
    },
    /// Close the socket and stop the loop.
    Shutdown,
}

// ============================================================================
// WebSocketConnection
// ============================================================================

/// WebSocket client connection.
///
/// # Example
///
/// ```ignore
/// let connection = WebSocketConnection::new();
/// connection.on_data_received().add_sync_observer(|args| println!("{}", args.data))?;
/// connection.start("ws://127.0.0.1:9222/session").await?;
/// connection.send_data(r#"{"id":1,"method":"session.status","params":{}}"#).await?;
/// ```
pub struct WebSocketConnection {
    /// Channel to the event loop; `None` when not started.
    command_tx: Mutex<Option<mpsc::UnboundedSender<ConnectionCommand>>>,
    /// Event loop task.
    event_loop: Mutex<Option<JoinHandle<()>>>,
    /// Cleared by the event loop when it exits.
    active: Arc<AtomicBool>,
    /// Handshake timeout.
    startup_timeout: Duration,
    on_data_received: ObservableEvent<ConnectionDataReceivedEventArgs>,
    on_log_message: ObservableEvent<LogMessageEventArgs>,
}

impl Default for WebSocketConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketConnection {
    /// Creates an unstarted connection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_startup_timeout(DEFAULT_STARTUP_TIMEOUT)
    }

    /// Creates an unstarted connection with a custom handshake timeout.
    #[must_use]
    pub fn with_startup_timeout(startup_timeout: Duration) -> Self {
        Self {
            command_tx: Mutex::new(None),
            event_loop: Mutex::new(None),
            active: Arc::new(AtomicBool::new(false)),
            startup_timeout,
            on_data_received: ObservableEvent::new("connection.dataReceived"),
            on_log_message: ObservableEvent::new("connection.logMessage"),
        }
    }

    /// Validates a remote end URL.
    fn parse_url(url: &str) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|e| Error::url(url, e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(parsed),
            scheme => Err(Error::url(
                url,
                format!("unsupported scheme '{scheme}', expected ws or wss"),
            )),
        }
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: ClientStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        on_data_received: ObservableEvent<ConnectionDataReceivedEventArgs>,
        on_log_message: ObservableEvent<LogMessageEventArgs>,
        active: Arc<AtomicBool>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the remote end
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let args = ConnectionDataReceivedEventArgs {
                                data: text.as_str().to_owned(),
                            };
                            on_data_received.notify_observers(args).await;
                        }

                        Some(Ok(Message::Close(frame))) => {
                            log(&on_log_message, LogLevel::Info, format!("WebSocket closed by remote: {frame:?}")).await;
                            break;
                        }

                        Some(Ok(Message::Binary(bytes))) => {
                            log(&on_log_message, LogLevel::Warn, format!("Ignoring binary frame of {} bytes", bytes.len())).await;
                        }

                        Some(Err(e)) => {
                            log(&on_log_message, LogLevel::Error, format!("WebSocket error: {e}")).await;
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ping, Pong and raw frames are handled by tungstenite
                        _ => {}
                    }
                }

                // Commands from the connection handle
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { data, result_tx }) => {
                            let result = ws_write
                                .send(Message::Text(data.into()))
                                .await
                                .map_err(Error::from);
                            let _ = result_tx.send(result);
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        active.store(false, Ordering::SeqCst);
        debug!("Event loop terminated");
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn start(&self, url: &str) -> Result<()> {
        let parsed = Self::parse_url(url)?;
        if self.command_tx.lock().is_some() {
            return Err(Error::connection("Connection already started"));
        }

        let (ws_stream, _) = timeout(self.startup_timeout, connect_async(parsed.as_str()))
            .await
            .map_err(|_| {
                Error::connection(format!(
                    "Timed out after {}ms connecting to {url}",
                    self.startup_timeout.as_millis()
                ))
            })??;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.active.store(true, Ordering::SeqCst);

        let task = tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            self.on_data_received.clone(),
            self.on_log_message.clone(),
            Arc::clone(&self.active),
        ));

        *self.command_tx.lock() = Some(command_tx);
        *self.event_loop.lock() = Some(task);

        log(&self.on_log_message, LogLevel::Info, format!("Connected to {url}")).await;
        Ok(())
    }

    async fn send_data(&self, data: &str) -> Result<()> {
        let command_tx = self
            .command_tx
            .lock()
            .clone()
            .ok_or(Error::ConnectionClosed)?;

        let (result_tx, result_rx) = oneshot::channel();
        command_tx
            .send(ConnectionCommand::Send {
                data: data.to_owned(),
                result_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        result_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    async fn stop(&self) -> Result<()> {
        let Some(command_tx) = self.command_tx.lock().take() else {
            return Ok(());
        };
        let _ = command_tx.send(ConnectionCommand::Shutdown);

        let task = self.event_loop.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            log(&self.on_log_message, LogLevel::Error, format!("Event loop task failed: {e}")).await;
        }

        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn on_data_received(&self) -> &ObservableEvent<ConnectionDataReceivedEventArgs> {
        &self.on_data_received
    }

    fn on_log_message(&self) -> &ObservableEvent<LogMessageEventArgs> {
        &self.on_log_message
    }
}

/// Publishes a connection log entry.
async fn log(event: &ObservableEvent<LogMessageEventArgs>, level: LogLevel, message: String) {
    let entry = LogMessageEventArgs::new(level, COMPONENT, message);
    entry.trace();
    event.notify_observers(entry).await;
}

// ============================================================================
// Tests
// ============================================================================

//! In-memory connection for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};
use crate::events::ObservableEvent;
use crate::protocol::LogMessageEventArgs;

use super::{Connection, ConnectionDataReceivedEventArgs};

/// Routes `tracing` output to the test harness, filtered by `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connection that records sent data and lets tests inject inbound data.
pub(crate) struct TestConnection {
    active: AtomicBool,
    url: Mutex<Option<String>>,
    fail_sends: AtomicBool,
    sent_tx: mpsc::UnboundedSender<String>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    on_data_received: ObservableEvent<ConnectionDataReceivedEventArgs>,
    on_log_message: ObservableEvent<LogMessageEventArgs>,
}

impl TestConnection {
    pub(crate) fn new() -> Self {
        Self::with_log_observer_limit(0)
    }

    /// Connection whose log event accepts at most `max_observers` observers.
    pub(crate) fn with_log_observer_limit(max_observers: usize) -> Self {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        Self {
            active: AtomicBool::new(false),
            url: Mutex::new(None),
            fail_sends: AtomicBool::new(false),
            sent_tx,
            sent_rx: tokio::sync::Mutex::new(sent_rx),
            on_data_received: ObservableEvent::new("test.dataReceived"),
            on_log_message: ObservableEvent::with_max_observers("test.logMessage", max_observers),
        }
    }

    /// URL passed to the last `start`.
    pub(crate) fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    /// Makes every later `send_data` fail.
    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Waits for the next sent message and parses it as JSON.
    pub(crate) async fn next_sent(&self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(2), self.sent_rx.lock().await.recv())
            .await
            .expect("no data sent in time")
            .expect("sent channel closed");
        serde_json::from_str(&text).expect("sent data is JSON")
    }

    /// Delivers inbound data as the remote end would.
    pub(crate) async fn receive(&self, data: impl Into<String>) {
        self.on_data_received
            .notify_observers(ConnectionDataReceivedEventArgs { data: data.into() })
            .await;
    }
}

#[async_trait]
impl Connection for TestConnection {
    async fn start(&self, url: &str) -> Result<()> {
        *self.url.lock() = Some(url.to_owned());
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send_data(&self, data: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::connection("send failed"));
        }
        self.sent_tx
            .send(data.to_owned())
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn stop(&self) -> Result<()> {
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

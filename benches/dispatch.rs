//! Dispatch benchmark suite.
//!
//! Benchmarks the inbound hot path:
//! - Message classification per message shape
//! - Observer fan-out at different observer counts
//! - Full command round trips over a loopback connection
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

use webdriver_bidi::protocol::InboundMessage;
use webdriver_bidi::transport::ConnectionDataReceivedEventArgs;
use webdriver_bidi::{
    Connection, Driver, LogMessageEventArgs, ObservableEvent, ObserverOptions, RawCommand, Result,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const OBSERVER_COUNTS: &[usize] = &[1, 8, 64];
const CONCURRENT_COMMANDS: &[usize] = &[1, 16, 128];

const MESSAGES: &[(&str, &str)] = &[
    (
        "success",
        r#"{"type":"success","id":42,"result":{"contexts":[{"context":"abc","url":"about:blank"}]}}"#,
    ),
    (
        "error",
        r#"{"type":"error","id":42,"error":"no such frame","message":"Frame not found","stacktrace":"at x"}"#,
    ),
    (
        "event",
        r#"{"type":"event","method":"log.entryAdded","params":{"level":"info","text":"hello"}}"#,
    ),
    ("unknown", r#"{"type":"mystery","value":[1,2,3]}"#),
    ("invalid", r#"{"type":"success","id":"#),
];

// ============================================================================
// Loopback Connection
// ============================================================================

/// Answers every command with a success echoing its params.
struct LoopbackConnection {
    active: AtomicBool,
    on_data_received: ObservableEvent<ConnectionDataReceivedEventArgs>,
    on_log_message: ObservableEvent<LogMessageEventArgs>,
}

impl LoopbackConnection {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            on_data_received: ObservableEvent::new("loopback.dataReceived"),
            on_log_message: ObservableEvent::new("loopback.logMessage"),
        }
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    async fn start(&self, _url: &str) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send_data(&self, data: &str) -> Result<()> {
        let request: Value = serde_json::from_str(data)?;
        let response = json!({
            "type": "success",
            "id": request["id"],
            "result": request["params"],
        });
        self.on_data_received
            .notify_observers(ConnectionDataReceivedEventArgs {
                data: response.to_string(),
            })
            .await;
        Ok(())
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

// ============================================================================
// Benchmark: Classification
// ============================================================================

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    for &(shape, text) in MESSAGES {
        group.bench_with_input(BenchmarkId::from_parameter(shape), text, |b, text| {
            b.iter(|| InboundMessage::classify(black_box(text)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Observer Fan-out
// ============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("fan_out");

    for &count in OBSERVER_COUNTS {
        let event = ObservableEvent::<Arc<String>>::new("bench.event");
        for _ in 0..count {
            event
                .add_sync_observer(|args| {
                    black_box(args.len());
                })
                .expect("observer");
        }

        group.bench_with_input(BenchmarkId::new("sync", count), &event, |b, event| {
            let payload = Arc::new("payload".to_string());
            b.to_async(&rt)
                .iter(|| event.notify_observers(Arc::clone(&payload)));
        });
    }

    for &count in OBSERVER_COUNTS {
        let event = ObservableEvent::<Arc<String>>::new("bench.event");
        for _ in 0..count {
            event
                .add_observer_with(
                    |args| async move {
                        black_box(args.len());
                    },
                    ObserverOptions::asynchronous(),
                )
                .expect("observer");
        }

        group.bench_with_input(BenchmarkId::new("async", count), &event, |b, event| {
            let payload = Arc::new("payload".to_string());
            b.to_async(&rt)
                .iter(|| event.notify_observers(Arc::clone(&payload)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Command Round Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let driver = rt.block_on(async {
        let driver = Driver::builder()
            .command_timeout(Duration::from_secs(5))
            .connection(Arc::new(LoopbackConnection::new()))
            .build()
            .expect("driver");
        driver.start("ws://loopback").await.expect("start");
        driver
    });

    let mut group = c.benchmark_group("round_trip");

    for &count in CONCURRENT_COMMANDS {
        group.bench_with_input(BenchmarkId::new("commands", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| {
                let driver = driver.clone();
                async move {
                    let commands: Vec<_> = (0..count)
                        .map(|i| RawCommand::new("bench.echo", json!({ "i": i })))
                        .collect();
                    let calls = commands
                        .iter()
                        .map(|command| driver.execute_command(command));
                    futures_util::future::try_join_all(calls)
                        .await
                        .expect("round trip")
                }
            });
        });
    }

    group.finish();

    rt.block_on(driver.stop()).expect("stop");
}

criterion_group!(benches, bench_classify, bench_fan_out, bench_round_trip);
criterion_main!(benches);

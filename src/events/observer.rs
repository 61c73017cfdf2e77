//! Event observers and checkpoints.
//!
//! An [`EventObserver`] is the handle returned by
//! [`ObservableEvent::add_observer`](super::ObservableEvent::add_observer).
//! It removes the observer again ([`EventObserver::unobserve`]) and lets tests
//! wait for a known number of future invocations through a checkpoint.
//!
//! # Checkpoints
//!
//! ```ignore
//! let observer = event.add_observer_with(handler, ObserverOptions::asynchronous())?;
//! observer.set_checkpoint(2)?;
//!
//! // ... trigger two notifications ...
//!
//! assert!(observer.wait_for_checkpoint(Duration::from_secs(1)).await);
//! futures_util::future::join_all(observer.checkpoint_tasks()).await;
//! observer.unset_checkpoint();
//! ```
//!
//! Checkpoint bookkeeping only runs when a checkpoint is set. Ordinary
//! delivery never waits on it.

// ============================================================================
// Imports
// ============================================================================

use std::any::{Any, type_name};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::{Error, Result};
use crate::identifiers::ObserverId;

// ============================================================================
// Types
// ============================================================================

/// Future returned by an observer callback.
pub type ObserverFuture = BoxFuture<'static, ()>;

/// Type-erased observer callback.
pub(crate) type ObserverCallback<T> = Arc<dyn Fn(T) -> ObserverFuture + Send + Sync>;

/// Completion of one invocation tracked by a checkpoint.
///
/// Cloneable so callers can await the same invocation more than once.
pub type CheckpointTask = Shared<BoxFuture<'static, ()>>;

/// Ordered observer list shared between an event and its observer handles.
pub(crate) type ObserverList<T> = RwLock<Vec<Arc<ObserverRecord<T>>>>;

// ============================================================================
// RunMode
// ============================================================================

/// How an observer's callback is run during a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// The notification awaits the callback before moving on.
    #[default]
    Synchronous,
    /// The callback is spawned; the notification does not wait for it.
    Asynchronous,
}

// ============================================================================
// ObserverOptions
// ============================================================================

/// Options for [`ObservableEvent::add_observer_with`](super::ObservableEvent::add_observer_with).
#[derive(Debug, Clone, Default)]
pub struct ObserverOptions {
    /// How the callback runs.
    pub run_mode: RunMode,
    /// Description shown by the event's `Display` output.
    pub description: Option<String>,
}

impl ObserverOptions {
    /// Options for a synchronous observer.
    #[inline]
    #[must_use]
    pub fn synchronous() -> Self {
        Self::default()
    }

    /// Options for an asynchronous observer.
    #[inline]
    #[must_use]
    pub fn asynchronous() -> Self {
        Self {
            run_mode: RunMode::Asynchronous,
            description: None,
        }
    }

    /// Sets the observer description.
    #[inline]
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ============================================================================
// Checkpoint
// ============================================================================

/// Outstanding invocations a caller is waiting for.
struct Checkpoint {
    /// Invocations still expected; receivers wait for zero.
    remaining: watch::Sender<usize>,
    /// Completions recorded since the checkpoint was set.
    tasks: Vec<CheckpointTask>,
}

impl Checkpoint {
    fn new(count: usize) -> Self {
        let (remaining, _) = watch::channel(count);
        Self {
            remaining,
            tasks: Vec::with_capacity(count),
        }
    }

    #[inline]
    fn is_fulfilled(&self) -> bool {
        *self.remaining.borrow() == 0
    }

    fn record(&mut self, task: CheckpointTask) {
        self.tasks.push(task);
        self.remaining.send_modify(|remaining| *remaining -= 1);
    }
}

// ============================================================================
// ObserverRecord
// ============================================================================

/// One subscriber of an observable event.
pub(crate) struct ObserverRecord<T> {
    id: ObserverId,
    callback: ObserverCallback<T>,
    run_mode: RunMode,
    description: String,
    checkpoint: Mutex<Option<Checkpoint>>,
}

impl<T> ObserverRecord<T> {
    #[inline]
    pub(crate) fn id(&self) -> ObserverId {
        self.id
    }

    #[inline]
    pub(crate) fn description(&self) -> &str {
        &self.description
    }
}

impl<T: Send + 'static> ObserverRecord<T> {
    pub(crate) fn new(callback: ObserverCallback<T>, options: ObserverOptions) -> Self {
        let id = ObserverId::next();
        let description = options
            .description
            .unwrap_or_else(|| format!("EventObserver<{}> (id: {id})", type_name::<T>()));

        Self {
            id,
            callback,
            run_mode: options.run_mode,
            description,
            checkpoint: Mutex::new(None),
        }
    }

    /// Runs the callback for one notification.
    ///
    /// Synchronous callbacks are awaited here; a panic is logged and does not
    /// reach the notifier. Asynchronous callbacks are spawned. In both modes the
    /// callback itself is called inside the guarded future, so a panic raised
    /// before it returns a future is contained too.
    pub(crate) async fn invoke(&self, args: T) {
        match self.run_mode {
            RunMode::Synchronous => {
                let callback = &self.callback;
                let guarded = AssertUnwindSafe(async move { callback(args).await });
                if let Err(panic) = guarded.catch_unwind().await {
                    error!(
                        observer = %self.id,
                        panic = panic_message(panic.as_ref()),
                        "Observer callback panicked"
                    );
                }
                self.track(|| future::ready(()).boxed().shared());
            }

            RunMode::Asynchronous => {
                let callback = Arc::clone(&self.callback);
                let handle = tokio::spawn(async move { callback(args).await });
                let id = self.id;
                self.track(move || join_task(id, handle));
            }
        }
    }

    /// Records an invocation against an active, unfulfilled checkpoint.
    fn track(&self, task: impl FnOnce() -> CheckpointTask) {
        let mut checkpoint = self.checkpoint.lock();
        if let Some(checkpoint) = checkpoint.as_mut()
            && !checkpoint.is_fulfilled()
        {
            checkpoint.record(task());
        }
    }
}

/// Wraps a spawned callback so its completion can be shared.
fn join_task(id: ObserverId, handle: JoinHandle<()>) -> CheckpointTask {
    async move {
        if let Err(e) = handle.await
            && e.is_panic()
        {
            error!(observer = %id, "Asynchronous observer callback panicked");
        }
    }
    .boxed()
    .shared()
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// EventObserver
// ============================================================================

/// Handle to one observer of an [`ObservableEvent`](super::ObservableEvent).
///
/// Dropping the handle does not remove the observer; call
/// [`unobserve`](Self::unobserve).
pub struct EventObserver<T> {
    record: Arc<ObserverRecord<T>>,
    observers: Weak<ObserverList<T>>,
}

impl<T> Clone for EventObserver<T> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
            observers: Weak::clone(&self.observers),
        }
    }
}

impl<T> fmt::Debug for EventObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventObserver")
            .field("id", &self.record.id)
            .field("run_mode", &self.record.run_mode)
            .field("description", &self.record.description)
            .finish()
    }
}

impl<T> fmt::Display for EventObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.record.description)
    }
}

impl<T> EventObserver<T> {
    pub(crate) fn new(record: Arc<ObserverRecord<T>>, observers: Weak<ObserverList<T>>) -> Self {
        Self { record, observers }
    }

    /// Returns the observer id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.record.id
    }

    /// Returns how the callback runs.
    #[inline]
    #[must_use]
    pub fn run_mode(&self) -> RunMode {
        self.record.run_mode
    }

    /// Returns the observer description.
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.record.description
    }

    /// Removes this observer from its event.
    ///
    /// Other observers are unaffected, as is any notification already
    /// dispatched to this one.
    pub fn unobserve(&self) {
        if let Some(observers) = self.observers.upgrade() {
            observers.write().retain(|record| record.id != self.record.id);
        }
    }

    /// Starts tracking the next `count` invocations.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidCheckpointCount`] if `count` is zero
    /// - [`Error::CheckpointAlreadySet`] if a checkpoint is already active
    pub fn set_checkpoint(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::InvalidCheckpointCount);
        }

        let mut checkpoint = self.record.checkpoint.lock();
        if checkpoint.is_some() {
            return Err(Error::CheckpointAlreadySet);
        }
        *checkpoint = Some(Checkpoint::new(count));
        Ok(())
    }

    /// Waits until the checkpoint count reaches zero.
    ///
    /// Returns `true` when fulfilled, `false` on timeout. Returns `true`
    /// immediately when no checkpoint is set. The checkpoint stays active
    /// either way.
    pub async fn wait_for_checkpoint(&self, timeout: Duration) -> bool {
        let mut remaining = {
            let checkpoint = self.record.checkpoint.lock();
            match checkpoint.as_ref() {
                Some(checkpoint) => checkpoint.remaining.subscribe(),
                None => return true,
            }
        };

        matches!(
            tokio::time::timeout(timeout, remaining.wait_for(|count| *count == 0)).await,
            Ok(Ok(_))
        )
    }

    /// Returns the invocations recorded since the checkpoint was set.
    #[must_use]
    pub fn checkpoint_tasks(&self) -> Vec<CheckpointTask> {
        self.record
            .checkpoint
            .lock()
            .as_ref()
            .map(|checkpoint| checkpoint.tasks.clone())
            .unwrap_or_default()
    }

    /// Clears the checkpoint; tracked callbacks keep running.
    pub fn unset_checkpoint(&self) {
        self.record.checkpoint.lock().take();
    }

    /// Returns `true` while a checkpoint is set.
    #[inline]
    #[must_use]
    pub fn has_checkpoint(&self) -> bool {
        self.record.checkpoint.lock().is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

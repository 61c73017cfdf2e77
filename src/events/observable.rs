//! Typed publish/subscribe event.
//!
//! An [`ObservableEvent<T>`] holds an ordered list of observers and fans one
//! payload out to all of them. Clones share the same observer list, so an
//! event can be handed out while its owner keeps notifying through it.

// ============================================================================
// Imports
// ============================================================================

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::FutureExt;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::{Error, Result};

use super::observer::{EventObserver, ObserverCallback, ObserverList, ObserverOptions, ObserverRecord};

// ============================================================================
// ObservableEvent
// ============================================================================

/// Event with a bounded, ordered set of observers.
///
/// # Example
///
/// ```ignore
/// let event = ObservableEvent::<String>::new("log");
/// let observer = event.add_sync_observer(|line| println!("{line}"))?;
///
/// event.notify_observers("hello".to_string()).await;
/// observer.unobserve();
/// ```
pub struct ObservableEvent<T> {
    shared: Arc<EventShared<T>>,
}

/// State shared by all clones of one event.
struct EventShared<T> {
    /// Event name, used in logs.
    name: String,
    /// Maximum observer count (0 = unbounded).
    max_observers: usize,
    /// Subscribed observers in subscription order.
    observers: Arc<ObserverList<T>>,
}

impl<T> Clone for ObservableEvent<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

// ============================================================================
// ObservableEvent - Constructors
// ============================================================================

impl<T> ObservableEvent<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an event with no observer limit.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_max_observers(name, 0)
    }

    /// Creates an event that accepts at most `max_observers` observers.
    ///
    /// Zero means unbounded.
    #[must_use]
    pub fn with_max_observers(name: impl Into<String>, max_observers: usize) -> Self {
        Self {
            shared: Arc::new(EventShared {
                name: name.into(),
                max_observers,
                observers: Arc::new(RwLock::new(Vec::new())),
            }),
        }
    }
}

// ============================================================================
// ObservableEvent - Subscription
// ============================================================================

impl<T> ObservableEvent<T>
where
    T: Clone + Send + 'static,
{
    /// Adds a synchronous observer with an async callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObserverLimit`] if the observer limit is reached.
    pub fn add_observer<F, Fut>(&self, handler: F) -> Result<EventObserver<T>>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_observer_with(handler, ObserverOptions::default())
    }

    /// Adds an observer with an async callback and explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObserverLimit`] if the observer limit is reached.
    pub fn add_observer_with<F, Fut>(
        &self,
        handler: F,
        options: ObserverOptions,
    ) -> Result<EventObserver<T>>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ObserverCallback<T> = Arc::new(move |args| handler(args).boxed());
        self.insert(callback, options)
    }

    /// Adds a synchronous observer with a plain callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObserverLimit`] if the observer limit is reached.
    pub fn add_sync_observer<F>(&self, handler: F) -> Result<EventObserver<T>>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let callback: ObserverCallback<T> = Arc::new(move |args| {
            let handler = Arc::clone(&handler);
            async move { handler(args) }.boxed()
        });
        self.insert(callback, ObserverOptions::default())
    }

    fn insert(
        &self,
        callback: ObserverCallback<T>,
        options: ObserverOptions,
    ) -> Result<EventObserver<T>> {
        let mut observers = self.shared.observers.write();

        let max = self.shared.max_observers;
        if max > 0 && observers.len() >= max {
            return Err(Error::ObserverLimit { max });
        }

        let record = Arc::new(ObserverRecord::new(callback, options));
        observers.push(Arc::clone(&record));

        trace!(event = %self.shared.name, observer = %record.id(), "Observer added");

        Ok(EventObserver::new(
            record,
            Arc::downgrade(&self.shared.observers),
        ))
    }
}

// ============================================================================
// ObservableEvent - Notification
// ============================================================================

impl<T> ObservableEvent<T>
where
    T: Clone + Send + 'static,
{
    /// Delivers `args` to every observer in subscription order.
    ///
    /// Synchronous observers complete before this returns; asynchronous
    /// observers are spawned and may still be running. Observers added or
    /// removed during the call do not change this delivery.
    pub async fn notify_observers(&self, args: T) {
        let observers: Vec<_> = self.shared.observers.read().clone();

        for observer in observers {
            observer.invoke(args.clone()).await;
        }
    }
}

// ============================================================================
// ObservableEvent - Accessors
// ============================================================================

impl<T> ObservableEvent<T> {
    /// Returns the event name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the observer limit (0 = unbounded).
    #[inline]
    #[must_use]
    pub fn max_observer_count(&self) -> usize {
        self.shared.max_observers
    }

    /// Returns the number of current observers.
    #[inline]
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.shared.observers.read().len()
    }
}

// ============================================================================
// ObservableEvent - Display
// ============================================================================

impl<T> fmt::Debug for ObservableEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableEvent")
            .field("name", &self.shared.name)
            .field("max_observers", &self.shared.max_observers)
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

impl<T> fmt::Display for ObservableEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObservableEvent<{}> with observers:", type_name::<T>())?;
        for observer in self.shared.observers.read().iter() {
            write!(f, "\n    {}", observer.description())?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

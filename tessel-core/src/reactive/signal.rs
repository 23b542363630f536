//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (component render,
//!    computed signal, tracked task section, binding), the signal registers
//!    that context as a subscriber. Registration is idempotent.
//!
//! 2. When a signal is written with a value that differs from the current one,
//!    every subscriber is notified once (per batch, see [`batch`]).
//!    Writing an equal value is a no-op.
//!
//! 3. Subscriptions survive writes. A subscriber drops an edge only by
//!    re-evaluating without reading the signal.
//!
//! [`batch`]: crate::reactive::batch

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::{next_source_id, AnySource, AnySubscriber, Source, SourceKey, SubscriberId, SubscriberSet};

/// A reactive signal holding a value of type T.
///
/// Clones share the same cell.
///
/// # Example
///
/// ```rust
/// use tessel_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    id: u64,
    value: RwLock<T>,
    subscribers: Mutex<SubscriberSet>,
}

impl<T> Source for SignalInner<T>
where
    T: Send + Sync + 'static,
{
    fn source_key(&self) -> SourceKey {
        SourceKey { id: self.id, key: None }
    }

    fn unsubscribe(&self, subscriber: SubscriberId) {
        self.subscribers.lock().remove(subscriber);
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: next_source_id(),
                value: RwLock::new(value),
                subscribers: Mutex::new(SubscriberSet::new()),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the current value, registering the current subscriber if any.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.read().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value, registering the current subscriber if any.
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        self.track();
        f(&self.inner.value.read())
    }

    /// Register the current subscriber without reading the value.
    pub fn track(&self) {
        if !ReactiveContext::is_active() {
            return;
        }
        let source = || AnySource::new(self.inner.clone() as Arc<dyn Source>);
        if let Some(subscriber) = ReactiveContext::track(source) {
            self.inner.subscribers.lock().insert(subscriber);
        }
    }

    /// Store a new value and notify subscribers.
    ///
    /// Returns `false` (and notifies nobody) when `value` equals the current
    /// value.
    pub fn set(&self, value: T) -> bool {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return false;
            }
            *guard = value;
        }
        self.notify();
        true
    }

    /// Update the value using a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.inner.value.read());
        self.set(next)
    }

    /// Notify every subscriber regardless of the value.
    pub fn notify(&self) {
        let subscribers = self.inner.subscribers.lock().snapshot();
        tracing::trace!(signal = self.inner.id, subscribers = subscribers.len(), "signal changed");
        Runtime::notify(subscribers);
    }

    /// Add an edge explicitly. Used when rebuilding the graph on resume.
    pub fn subscribe(&self, subscriber: AnySubscriber) {
        self.inner.subscribers.lock().insert(subscriber);
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber: SubscriberId) {
        self.inner.subscribers.lock().remove(subscriber);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Live subscribers in subscription order.
    pub fn subscribers(&self) -> Vec<AnySubscriber> {
        self.inner.subscribers.lock().snapshot()
    }

    /// This signal as a type-erased source.
    pub fn as_source(&self) -> AnySource {
        AnySource::new(self.inner.clone() as Arc<dyn Source>)
    }

    /// Whether both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::context::with_observer;
    use crate::reactive::batch;
    use crate::reactive::subscriber::{CallbackSubscriber, Subscriber};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counting_subscriber() -> (Arc<CallbackSubscriber>, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let sub = CallbackSubscriber::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (sub, count)
    }

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        assert!(signal.set(42));
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn tracked_read_registers_once() {
        let signal = Signal::new(1);
        let (sub, _) = counting_subscriber();

        let (_, sources) = with_observer(AnySubscriber::new(&sub), || {
            signal.get();
            signal.get();
            signal.with(|v| *v)
        });

        assert_eq!(signal.subscriber_count(), 1);
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let signal = Signal::new(1);
        signal.get();
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn write_notifies_and_keeps_subscription() {
        let signal = Signal::new(0);
        let (sub, count) = counting_subscriber();
        with_observer(AnySubscriber::new(&sub), || signal.get());

        signal.set(1);
        signal.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(signal.subscriber_count(), 1);
    }

    #[test]
    fn equal_write_is_a_no_op() {
        let signal = Signal::new(String::from("same"));
        let (sub, count) = counting_subscriber();
        with_observer(AnySubscriber::new(&sub), || signal.get());

        assert!(!signal.set(signal.get_untracked()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn batched_writes_notify_once() {
        let signal = Signal::new(0);
        let (sub, count) = counting_subscriber();
        with_observer(AnySubscriber::new(&sub), || signal.get());

        batch(|| {
            signal.set(1);
            signal.set(2);
            signal.set(3);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pruning_drops_stale_edge() {
        let signal = Signal::new(0);
        let (sub, count) = counting_subscriber();
        let (_, mut sources) = with_observer(AnySubscriber::new(&sub), || signal.get());

        sources.clear_for(sub.id());
        signal.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1, signal2);
        assert_ne!(signal1, Signal::new(42));
    }
}

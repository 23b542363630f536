//! Computed signals.
//!
//! A computed signal is a cached derived value. It is both a source (others
//! track it) and a subscriber (it tracks what its function reads).
//!
//! # How it works
//!
//! 1. On first read the function runs inside a tracking frame and the result
//!    is cached.
//!
//! 2. Reads while clean return the cache.
//!
//! 3. When a dependency changes the computed flips to dirty and forwards the
//!    notification to its own subscribers, so a component reading a computed
//!    re-renders without the computed having re-run yet.
//!
//! 4. The next read recomputes, prunes dependencies that were not read again,
//!    and caches the new value.
//!
//! Reading a computed signal while its own function is running is reported as
//! [`CoreError::ComputedCycle`] rather than returning a stale value.
//!
//! A failed evaluation leaves the computed errored. It recomputes on every
//! read until one succeeds, and the next dependency change still reaches its
//! subscribers.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value as Json;

use crate::error::{CoreError, Result};
use crate::qrl::{ComputedFn, Qrl};

use super::context::{with_observer, ReactiveContext};
use super::runtime::Runtime;
use super::subscriber::{
    next_source_id, AnySource, AnySubscriber, Source, SourceKey, SourceSet, Subscriber,
    SubscriberId, SubscriberSet, SubscriberTarget,
};

/// Dirty state for a computed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed; recompute on next read.
    Dirty,

    /// The last evaluation failed; recompute on next read.
    Errored,
}

type ComputeFn<T> = dyn Fn() -> Result<T> + Send + Sync;

/// A cached derived value that recomputes only when dependencies change.
pub struct Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    id: u64,
    subscriber_id: SubscriberId,
    compute: Box<ComputeFn<T>>,
    value: RwLock<Option<T>>,
    state: Mutex<ComputedState>,
    computing: AtomicBool,
    sources: Mutex<SourceSet>,
    subscribers: Mutex<SubscriberSet>,
    /// Set when the function came from a symbol, which is what makes the
    /// computed signal resumable.
    origin: Option<Qrl<ComputedFn>>,
}

impl<T> Subscriber for ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn invalidate(&self) {
        {
            let mut state = self.state.lock();
            if *state == ComputedState::Dirty {
                return;
            }
            *state = ComputedState::Dirty;
        }
        let subscribers = self.subscribers.lock().snapshot();
        Runtime::notify(subscribers);
    }

    fn target(&self) -> SubscriberTarget {
        SubscriberTarget::Computed(self.id)
    }
}

impl<T> Source for ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn source_key(&self) -> SourceKey {
        SourceKey { id: self.id, key: None }
    }

    fn unsubscribe(&self, subscriber: SubscriberId) {
        self.subscribers.lock().remove(subscriber);
    }
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed signal. The function does not run until first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::build(Box::new(compute), None)
    }

    fn build(compute: Box<ComputeFn<T>>, origin: Option<Qrl<ComputedFn>>) -> Self {
        let inner = Arc::new(ComputedInner {
            id: next_source_id(),
            subscriber_id: SubscriberId::new(),
            compute,
            value: RwLock::new(None),
            state: Mutex::new(ComputedState::Dirty),
            computing: AtomicBool::new(false),
            sources: Mutex::new(SourceSet::new()),
            subscribers: Mutex::new(SubscriberSet::new()),
            origin,
        });
        Self { inner }
    }

    /// Get the computed signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the current value, recomputing if dirty.
    pub fn get(&self) -> Result<T> {
        if ReactiveContext::is_active() {
            let source = || AnySource::new(self.inner.clone() as Arc<dyn Source>);
            if let Some(subscriber) = ReactiveContext::track(source) {
                self.inner.subscribers.lock().insert(subscriber);
            }
        }
        self.get_untracked()
    }

    /// Get the current value without tracking, recomputing unless clean.
    pub fn get_untracked(&self) -> Result<T> {
        if self.inner.computing.load(Ordering::SeqCst) {
            return Err(CoreError::ComputedCycle(self.inner.id));
        }
        if *self.inner.state.lock() == ComputedState::Clean {
            if let Some(value) = self.inner.value.read().clone() {
                return Ok(value);
            }
        }
        self.recompute()
    }

    fn recompute(&self) -> Result<T> {
        let inner = &self.inner;
        inner.sources.lock().clear_for(inner.subscriber_id);

        let (result, sources) = {
            let _computing = ComputingGuard::enter(&inner.computing);
            with_observer(AnySubscriber::new(inner), || (inner.compute)())
        };
        inner.sources.lock().merge(sources);

        match result {
            Ok(value) => {
                *inner.value.write() = Some(value.clone());
                *inner.state.lock() = ComputedState::Clean;
                Ok(value)
            }
            Err(error) => {
                *inner.state.lock() = ComputedState::Errored;
                Err(error)
            }
        }
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        *self.inner.state.lock()
    }

    /// Get the number of dependents.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Number of sources read by the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.lock().len()
    }

    /// Check if the computed signal has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Live subscribers of this computed signal.
    pub fn subscribers(&self) -> Vec<AnySubscriber> {
        self.inner.subscribers.lock().snapshot()
    }

    /// The symbol this computed signal was built from, if any.
    pub fn origin(&self) -> Option<&Qrl<ComputedFn>> {
        self.inner.origin.as_ref()
    }

    /// This computed signal as a type-erased subscriber.
    pub fn as_subscriber(&self) -> AnySubscriber {
        AnySubscriber::new(&self.inner)
    }

    /// This computed signal as a type-erased source.
    pub fn as_source(&self) -> AnySource {
        AnySource::new(self.inner.clone() as Arc<dyn Source>)
    }

    /// Add a dependent explicitly. Used when rebuilding the graph on resume.
    pub fn subscribe(&self, subscriber: AnySubscriber) {
        self.inner.subscribers.lock().insert(subscriber);
    }

    /// Record `source` as a dependency so the next evaluation prunes it.
    pub fn add_source(&self, source: AnySource) {
        self.inner.sources.lock().insert(source);
    }

    /// Seed the cache with a known value and mark it clean.
    pub fn restore(&self, value: T) {
        *self.inner.value.write() = Some(value);
        *self.inner.state.lock() = ComputedState::Clean;
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Holds the cycle flag for the duration of one evaluation, including an
/// unwinding one.
struct ComputingGuard<'a>(&'a AtomicBool);

impl<'a> ComputingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Computed<Json> {
    /// Build a computed signal from a symbol. The function receives the
    /// symbol's captures and must be resolved before the first read.
    pub fn from_qrl(qrl: Qrl<ComputedFn>) -> Self {
        let handle = qrl.clone();
        let compute = move || {
            let f = handle.resolved()?;
            f(handle.captures())
        };
        Self::build(Box::new(compute), Some(qrl))
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
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
    use crate::reactive::subscriber::CallbackSubscriber;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn computes_on_first_access() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let computed = Computed::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        });

        assert!(!computed.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(computed.get().unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(computed.has_value());
    }

    #[test]
    fn memoizes_until_dependency_changes() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        let source = Signal::new(2);
        let source_clone = source.clone();

        let doubled = Computed::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(source_clone.get() * 2)
        });

        assert_eq!(doubled.get().unwrap(), 4);
        assert_eq!(doubled.get().unwrap(), 4);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        source.set(5);
        assert_eq!(doubled.state(), ComputedState::Dirty);
        assert_eq!(doubled.get().unwrap(), 10);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn forwards_invalidation_to_subscribers() {
        let source = Signal::new(1);
        let source_clone = source.clone();
        let computed = Computed::new(move || Ok(source_clone.get() + 1));

        let notified = Arc::new(AtomicI32::new(0));
        let notified_clone = notified.clone();
        let sub = CallbackSubscriber::new(move || {
            notified_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _ = with_observer(AnySubscriber::new(&sub), || computed.get());

        source.set(2);
        source.set(3);
        // Still dirty after the first write, so the second is absorbed.
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(computed.get().unwrap(), 4);
    }

    #[test]
    fn prunes_branches_not_read_again() {
        let flag = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);
        let (flag_c, a_c, b_c) = (flag.clone(), a.clone(), b.clone());
        let computed = Computed::new(move || Ok(if flag_c.get() { a_c.get() } else { b_c.get() }));

        assert_eq!(computed.get().unwrap(), 1);
        assert_eq!(a.subscriber_count(), 1);

        flag.set(false);
        assert_eq!(computed.get().unwrap(), 2);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
        assert_eq!(computed.dependency_count(), 2);
    }

    #[test]
    fn self_read_is_a_cycle_error() {
        let slot: Arc<Mutex<Option<Computed<i32>>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let computed = Computed::new(move || {
            let me = slot_clone.lock().clone();
            match me {
                Some(me) => me.get().map(|v| v + 1),
                None => Ok(0),
            }
        });
        *slot.lock() = Some(computed.clone());

        assert!(matches!(computed.get(), Err(CoreError::ComputedCycle(_))));
        // The cycle flag is cleared after the failed evaluation.
        assert!(matches!(computed.get(), Err(CoreError::ComputedCycle(_))));
        *slot.lock() = None;
        assert_eq!(computed.get().unwrap(), 0);
    }

    #[test]
    fn recovers_after_a_failed_evaluation() {
        let source = Signal::new(0);
        let source_clone = source.clone();
        let computed = Computed::new(move || match source_clone.get() {
            1 => Err(CoreError::msg("odd one out")),
            n => Ok(n * 10),
        });

        let notified = Arc::new(AtomicI32::new(0));
        let notified_clone = notified.clone();
        let sub = CallbackSubscriber::new(move || {
            notified_clone.fetch_add(1, Ordering::SeqCst);
        });
        let reader = AnySubscriber::new(&sub);
        let _ = with_observer(reader.clone(), || computed.get());

        source.set(1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(with_observer(reader.clone(), || computed.get()).0.is_err());
        assert_eq!(computed.state(), ComputedState::Errored);

        source.set(2);
        assert_eq!(notified.load(Ordering::SeqCst), 2);
        assert_eq!(computed.get().unwrap(), 20);
        assert_eq!(computed.state(), ComputedState::Clean);
    }

    #[test]
    fn panicking_evaluation_clears_the_cycle_flag() {
        let armed = Arc::new(AtomicBool::new(true));
        let armed_clone = armed.clone();
        let computed = Computed::new(move || {
            if armed_clone.load(Ordering::SeqCst) {
                panic!("boom");
            }
            Ok(7)
        });

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| computed.get()));
        assert!(caught.is_err());
        armed.store(false, Ordering::SeqCst);
        assert_eq!(computed.get().unwrap(), 7);
    }
}

//! Reactive Runtime
//!
//! The runtime decides *when* subscribers hear about a change. Sources hand
//! it the snapshot of their subscribers after a write; outside a batch every
//! subscriber is invalidated immediately, inside a batch the invalidations are
//! collected (one entry per subscriber) and delivered when the outermost batch
//! exits.
//!
//! Invalidating a subscriber never runs user code directly: component, task
//! and binding subscribers enqueue a chore, computed signals only flip their
//! dirty flag and forward the notification.

use std::cell::RefCell;

use indexmap::IndexMap;

use super::subscriber::{AnySubscriber, SubscriberId};

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: IndexMap<SubscriberId, AnySubscriber>,
}

/// Entry point for change propagation.
pub struct Runtime;

impl Runtime {
    /// Deliver a change notification to `subscribers`.
    pub fn notify(subscribers: Vec<AnySubscriber>) {
        if subscribers.is_empty() {
            return;
        }
        let deferred = BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            if batch.depth == 0 {
                return None;
            }
            for subscriber in subscribers.iter() {
                batch
                    .pending
                    .entry(subscriber.id())
                    .or_insert_with(|| subscriber.clone());
            }
            Some(())
        });
        if deferred.is_none() {
            for subscriber in subscribers {
                subscriber.invalidate();
            }
        }
    }

    /// Run `f` with notifications deferred until the outermost batch ends.
    pub fn batch<T>(f: impl FnOnce() -> T) -> T {
        BATCH.with(|batch| batch.borrow_mut().depth += 1);
        let guard = BatchGuard;
        let value = f();
        drop(guard);
        value
    }

    /// Whether writes are currently being batched.
    pub fn is_batching() -> bool {
        BATCH.with(|batch| batch.borrow().depth > 0)
    }
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let pending = BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            batch.depth -= 1;
            if batch.depth == 0 {
                std::mem::take(&mut batch.pending)
            } else {
                IndexMap::new()
            }
        });
        for subscriber in pending.into_values() {
            subscriber.invalidate();
        }
    }
}

/// Run `f` with notifications deferred until it returns.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    Runtime::batch(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::CallbackSubscriber;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notifies_immediately_outside_batch() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let sub = CallbackSubscriber::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        Runtime::notify(vec![AnySubscriber::new(&sub)]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_delivers_once_per_subscriber() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let sub = CallbackSubscriber::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        batch(|| {
            Runtime::notify(vec![AnySubscriber::new(&sub)]);
            batch(|| Runtime::notify(vec![AnySubscriber::new(&sub)]));
            Runtime::notify(vec![AnySubscriber::new(&sub)]);
            assert!(Runtime::is_batching());
            assert_eq!(count.load(Ordering::SeqCst), 0);
        });

        assert!(!Runtime::is_batching());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

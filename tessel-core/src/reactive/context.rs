//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! the current computation is registered as a dependent.
//!
//! # Implementation
//!
//! A thread-local stack holds one frame per running computation. Entering a
//! context pushes a frame and returns a guard; dropping the guard pops it, so
//! the outer context is restored on every exit path, including early `?`
//! returns and panics. An untracked frame (no subscriber) suspends tracking for
//! nested reads.

use std::cell::RefCell;

use super::subscriber::{AnySource, AnySubscriber, SourceSet, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextFrame>> = const { RefCell::new(Vec::new()) };
}

struct ContextFrame {
    /// `None` for untracked frames.
    subscriber: Option<AnySubscriber>,
    /// Sources read while this frame was on top.
    sources: SourceSet,
}

/// Guard that pops its frame when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    depth: usize,
    popped: bool,
}

impl ReactiveContext {
    /// Enter a tracked context for `subscriber`.
    pub fn enter(subscriber: AnySubscriber) -> Self {
        let subscriber_id = Some(subscriber.id());
        Self::push(ContextFrame {
            subscriber: Some(subscriber),
            sources: SourceSet::new(),
        }, subscriber_id)
    }

    /// Enter a frame in which reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(ContextFrame {
            subscriber: None,
            sources: SourceSet::new(),
        }, None)
    }

    fn push(frame: ContextFrame, subscriber_id: Option<SubscriberId>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(frame);
            stack.len()
        });
        Self {
            subscriber_id,
            depth,
            popped: false,
        }
    }

    /// Whether reads on this thread are currently tracked.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|frame| frame.subscriber.is_some())
                .unwrap_or(false)
        })
    }

    /// The subscriber reads are currently attributed to.
    pub fn current_subscriber() -> Option<AnySubscriber> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|frame| frame.subscriber.clone())
        })
    }

    /// Record a read of `source`.
    ///
    /// Returns the subscriber that the source must add to its own set, or
    /// `None` when nothing is tracking.
    pub fn track(source: impl FnOnce() -> AnySource) -> Option<AnySubscriber> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let frame = stack.last_mut()?;
            let subscriber = frame.subscriber.clone()?;
            frame.sources.insert(source());
            Some(subscriber)
        })
    }

    /// Pop the frame and return the sources read inside it.
    pub fn finish(mut self) -> SourceSet {
        let frame = self.pop();
        frame.map(|frame| frame.sources).unwrap_or_default()
    }

    fn pop(&mut self) -> Option<ContextFrame> {
        if self.popped {
            return None;
        }
        self.popped = true;
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext popped out of order"
            );
            let frame = stack.pop();
            if let Some(frame) = &frame {
                debug_assert_eq!(
                    frame.subscriber.as_ref().map(AnySubscriber::id),
                    self.subscriber_id,
                    "ReactiveContext mismatch"
                );
            }
            frame
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // Sources of an abandoned frame are discarded.
        let _ = self.pop();
    }
}

/// Runs `f` without tracking any reads.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ReactiveContext::untracked();
    f()
}

/// Runs `f` with reads attributed to `subscriber`, returning the value and
/// the sources read.
pub fn with_observer<T>(subscriber: AnySubscriber, f: impl FnOnce() -> T) -> (T, SourceSet) {
    let guard = ReactiveContext::enter(subscriber);
    let value = f();
    (value, guard.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::{CallbackSubscriber, Subscriber};

    #[test]
    fn context_tracks_subscriber() {
        let sub = CallbackSubscriber::new(|| {});
        let id = sub.id();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(AnySubscriber::new(&sub));
            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber().map(|s| s.id()), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let outer = CallbackSubscriber::new(|| {});
        let inner = CallbackSubscriber::new(|| {});

        {
            let _ctx1 = ReactiveContext::enter(AnySubscriber::new(&outer));
            {
                let _ctx2 = ReactiveContext::enter(AnySubscriber::new(&inner));
                assert_eq!(
                    ReactiveContext::current_subscriber().map(|s| s.id()),
                    Some(inner.id())
                );
                untrack(|| assert!(!ReactiveContext::is_active()));
                assert!(ReactiveContext::is_active());
            }
            assert_eq!(
                ReactiveContext::current_subscriber().map(|s| s.id()),
                Some(outer.id())
            );
        }
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn context_restored_after_error_return() {
        fn failing(sub: AnySubscriber) -> Result<(), ()> {
            let _ctx = ReactiveContext::enter(sub);
            Err(())
        }

        let sub = CallbackSubscriber::new(|| {});
        assert!(failing(AnySubscriber::new(&sub)).is_err());
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn context_restored_after_panic() {
        let sub = CallbackSubscriber::new(|| {});
        let any = AnySubscriber::new(&sub);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _ctx = ReactiveContext::enter(any);
            panic!("render exploded");
        }));
        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
    }
}

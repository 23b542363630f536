//! Reactive Primitives
//!
//! Signals, stores, computed signals and tasks, plus the tracking context
//! that records which of them a render, task or binding reads.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] holds one value. Reading it under an observer records an
//! edge; writing a different value notifies every subscriber. Writing an
//! equal value does nothing.
//!
//! ## Stores
//!
//! A [`Store`] wraps a JSON object or array and tracks reads per property.
//! Deep stores wrap nested objects in child stores on first access, so a
//! write to `user.name` only notifies readers of `name`.
//!
//! ## Computed signals
//!
//! A [`Computed`] caches a derived value and recomputes lazily, on the first
//! read after one of its sources changed. Computed signals built from a
//! [`Qrl`](crate::qrl::Qrl) survive a server render; closure-built ones do
//! not.
//!
//! ## Tasks
//!
//! A [`Task`] runs a side effect owned by a component, tracking what it
//! reads and running its cleanups before every rerun. A [`Resource`] is a
//! task whose async result is published through a state signal.
//!
//! # Implementation Notes
//!
//! Notifications never run anything inline. A subscriber that is notified
//! marks itself and schedules a chore; the scheduler decides when to run it.
//! Writes inside [`batch`] are coalesced until the outermost batch ends.

mod computed;
mod context;
mod runtime;
mod signal;
mod store;
mod subscriber;
mod task;
mod value;

pub use computed::{Computed, ComputedState};
pub use context::{untrack, with_observer, ReactiveContext};
pub use runtime::{batch, Runtime};
pub use signal::Signal;
pub use store::{PropKey, Store, StoreValue, KEYS};
pub use subscriber::{
    AnySource, AnySubscriber, CallbackSubscriber, Source, SourceKey, SourceSet, Subscriber, SubscriberId,
    SubscriberSet, SubscriberTarget,
};
pub use task::{Resource, ResourceStatus, Task, TaskBody, TaskCtx, TaskId, TaskKind, TaskOutput};
pub use value::Value;

pub(crate) use store::json_kind;
pub(crate) use task::pending_state;

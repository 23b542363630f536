//! Subscriber and source identities.
//!
//! A subscriber is anything that re-runs when a reactive source changes: a
//! component render, a computed signal, a task, or a DOM binding. Sources
//! (signals, computed signals, store keys) keep an ordered set of subscribers;
//! subscribers keep the list of sources they read so stale edges can be
//! pruned before the next evaluation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::reactive::task::TaskId;
use crate::vnode::NodeId;

/// Unique identifier for a subscriber.
///
/// Source subscriber sets are keyed by this ID, which is what keeps a
/// source→subscriber edge from being recorded twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates IDs for signals, computed signals and stores.
pub(crate) fn next_source_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// What a subscriber re-runs. Serialization uses this to rebuild edges on
/// resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberTarget {
    Component(NodeId),
    Task(TaskId),
    Binding { node: NodeId, attr: Option<Arc<str>> },
    /// Carries the computed signal's source ID.
    Computed(u64),
    Callback,
}

/// Any computation that depends on reactive sources.
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    /// Called once per write batch when a tracked source changed.
    fn invalidate(&self);

    fn target(&self) -> SubscriberTarget;
}

/// Type-erased, weakly held subscriber.
///
/// Sources never keep their subscribers alive; once the owning vnode or task
/// is gone the edge is skipped and dropped on the next notification.
#[derive(Clone)]
pub struct AnySubscriber {
    id: SubscriberId,
    inner: Weak<dyn Subscriber>,
}

impl AnySubscriber {
    pub fn new<S>(subscriber: &Arc<S>) -> Self
    where
        S: Subscriber + 'static,
    {
        let inner: Weak<dyn Subscriber> = Arc::downgrade(subscriber) as Weak<dyn Subscriber>;
        Self {
            id: subscriber.id(),
            inner,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn invalidate(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.invalidate();
        }
    }

    pub fn target(&self) -> Option<SubscriberTarget> {
        self.inner.upgrade().map(|inner| inner.target())
    }
}

impl std::fmt::Debug for AnySubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnySubscriber").field(&self.id.0).finish()
    }
}

impl PartialEq for AnySubscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AnySubscriber {}

impl std::hash::Hash for AnySubscriber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Identity of one readable source. Store properties share the store's ID
/// and differ by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub id: u64,
    pub key: Option<Arc<str>>,
}

/// A reactive source that can drop an edge to a subscriber.
pub trait Source: Send + Sync {
    fn source_key(&self) -> SourceKey;

    fn unsubscribe(&self, subscriber: SubscriberId);
}

#[derive(Clone)]
pub struct AnySource(Arc<dyn Source>);

impl AnySource {
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self(source)
    }

    pub fn key(&self) -> SourceKey {
        self.0.source_key()
    }

    pub fn unsubscribe(&self, subscriber: SubscriberId) {
        self.0.unsubscribe(subscriber);
    }
}

impl std::fmt::Debug for AnySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnySource").field(&self.key()).finish()
    }
}

/// The subscriber side of the edge table, owned by each source.
#[derive(Debug, Default)]
pub struct SubscriberSet {
    entries: IndexMap<SubscriberId, AnySubscriber>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge. Returns `false` if it already existed.
    pub fn insert(&mut self, subscriber: AnySubscriber) -> bool {
        if self.entries.contains_key(&subscriber.id()) {
            return false;
        }
        self.entries.insert(subscriber.id(), subscriber);
        true
    }

    pub fn remove(&mut self, id: SubscriberId) {
        self.entries.shift_remove(&id);
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live subscribers in subscription order. Dead edges are pruned.
    pub fn snapshot(&mut self) -> Vec<AnySubscriber> {
        self.entries.retain(|_, sub| sub.is_alive());
        self.entries.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnySubscriber> {
        self.entries.values()
    }
}

/// The source side of the edge table, owned by each subscriber.
#[derive(Debug, Default)]
pub struct SourceSet {
    entries: IndexMap<SourceKey, AnySource>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: AnySource) {
        self.entries.entry(source.key()).or_insert(source);
    }

    pub fn extend(&mut self, sources: impl IntoIterator<Item = AnySource>) {
        for source in sources {
            self.insert(source);
        }
    }

    /// Moves every source of `other` into this set.
    pub fn merge(&mut self, other: SourceSet) {
        for (key, source) in other.entries {
            self.entries.entry(key).or_insert(source);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Drops every recorded edge to `subscriber`.
    pub fn clear_for(&mut self, subscriber: SubscriberId) {
        for (_, source) in self.entries.drain(..) {
            source.unsubscribe(subscriber);
        }
    }
}

/// A subscriber that calls a closure on invalidation.
pub struct CallbackSubscriber {
    id: SubscriberId,
    notify: Box<dyn Fn() + Send + Sync>,
}

impl CallbackSubscriber {
    pub fn new<F>(notify: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: SubscriberId::new(),
            notify: Box::new(notify),
        })
    }
}

impl Subscriber for CallbackSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn invalidate(&self) {
        (self.notify)();
    }

    fn target(&self) -> SubscriberTarget {
        SubscriberTarget::Callback
    }
}

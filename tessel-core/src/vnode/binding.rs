//! DOM bindings.
//!
//! A binding ties one text node or one attribute to a signal or computed
//! signal. When the source changes the binding schedules a `Binding` chore
//! that patches just that node; the component that rendered it does not run.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value as Json;

use crate::error::Result;
use crate::jsx::Reactive;
use crate::reactive::{with_observer, AnySource, AnySubscriber, SourceSet, Subscriber, SubscriberId, SubscriberTarget};
use crate::scheduler::{Chore, Scheduler};

use super::NodeId;

pub struct Binding {
    id: SubscriberId,
    node: NodeId,
    attr: Option<Arc<str>>,
    source: Reactive,
    scheduler: Weak<Scheduler>,
    sources: Mutex<SourceSet>,
}

impl Binding {
    pub(crate) fn new(node: NodeId, attr: Option<&str>, source: Reactive, scheduler: Weak<Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            id: SubscriberId::new(),
            node,
            attr: attr.map(Arc::from),
            source,
            scheduler,
            sources: Mutex::new(SourceSet::new()),
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Bound attribute, `None` for a text binding.
    pub fn attr(&self) -> Option<&str> {
        self.attr.as_deref()
    }

    pub fn source(&self) -> &Reactive {
        &self.source
    }

    /// Read the source, re-tracking it.
    pub fn evaluate(self: &Arc<Self>) -> Result<Json> {
        self.sources.lock().clear_for(self.id);
        let (value, sources) = with_observer(AnySubscriber::new(self), || self.source.read());
        self.sources.lock().merge(sources);
        value
    }

    pub(crate) fn add_source(&self, source: AnySource) {
        self.sources.lock().insert(source);
    }

    /// Drop every edge; the binding will not fire again.
    pub(crate) fn release(&self) {
        self.sources.lock().clear_for(self.id);
    }

    pub fn as_subscriber(self: &Arc<Self>) -> AnySubscriber {
        AnySubscriber::new(self)
    }
}

impl Subscriber for Binding {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn invalidate(&self) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.schedule(Chore::binding(self.node, self.attr.clone()));
        }
    }

    fn target(&self) -> SubscriberTarget {
        SubscriberTarget::Binding {
            node: self.node,
            attr: self.attr.clone(),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("node", &self.node)
            .field("attr", &self.attr)
            .field("source", &self.source.source_id())
            .finish()
    }
}

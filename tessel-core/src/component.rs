//! Component instances and the render context.
//!
//! Each component host vnode owns a [`ComponentState`]: the render
//! subscriber that re-schedules the component when something it read
//! changes, and the ordered hook slots that give `use_*` calls stable
//! identities across renders.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value as Json;

use crate::container::{ContainerInner, RenderMode};
use crate::error::{CoreError, Result};
use crate::jsx::Props;
use crate::qrl::{ComputedFn, Qrl, ResourceFn, TaskFn};
use crate::reactive::{
    pending_state, AnySource, AnySubscriber, Computed, Resource, Signal, SourceSet, Store, Subscriber,
    SubscriberId, SubscriberTarget, Task, TaskBody, TaskId, TaskKind, Value,
};
use crate::scheduler::{Chore, Scheduler};
use crate::vnode::NodeId;

/// Subscriber that re-renders a component.
pub struct RenderSubscriber {
    id: SubscriberId,
    node: NodeId,
    symbol: Arc<str>,
    scheduler: Weak<Scheduler>,
    sources: Mutex<SourceSet>,
    disposed: AtomicBool,
}

impl Subscriber for RenderSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn invalidate(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.schedule(Chore::component(self.node, &self.symbol));
        }
    }

    fn target(&self) -> SubscriberTarget {
        SubscriberTarget::Component(self.node)
    }
}

/// One `use_*` slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Hook {
    Value(Value),
    Task(TaskId),
}

pub struct ComponentState {
    node: NodeId,
    subscriber: Arc<RenderSubscriber>,
    hooks: Mutex<Vec<Hook>>,
    tasks: Mutex<Vec<TaskId>>,
    renders: AtomicUsize,
}

impl ComponentState {
    pub(crate) fn new(node: NodeId, symbol: &str, scheduler: Weak<Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            node,
            subscriber: Arc::new(RenderSubscriber {
                id: SubscriberId::new(),
                node,
                symbol: Arc::from(symbol),
                scheduler,
                sources: Mutex::new(SourceSet::new()),
                disposed: AtomicBool::new(false),
            }),
            hooks: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            renders: AtomicUsize::new(0),
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn hooks(&self) -> Vec<Hook> {
        self.hooks.lock().clone()
    }

    pub fn tasks(&self) -> Vec<TaskId> {
        self.tasks.lock().clone()
    }

    pub fn as_subscriber(&self) -> AnySubscriber {
        AnySubscriber::new(&self.subscriber)
    }

    pub fn dependency_count(&self) -> usize {
        self.subscriber.sources.lock().len()
    }

    /// Drop edges read by the previous render.
    pub(crate) fn begin_render(&self) {
        self.renders.fetch_add(1, Ordering::SeqCst);
        let id = self.subscriber.id;
        self.subscriber.sources.lock().clear_for(id);
    }

    pub(crate) fn end_render(&self, sources: SourceSet) {
        self.subscriber.sources.lock().merge(sources);
    }

    pub(crate) fn add_source(&self, source: AnySource) {
        self.subscriber.sources.lock().insert(source);
    }

    /// Restore hooks and owned tasks of a resumed instance.
    pub(crate) fn restore(&self, hooks: Vec<Hook>) {
        let tasks = hooks
            .iter()
            .filter_map(|hook| match hook {
                Hook::Task(id) => Some(*id),
                Hook::Value(_) => None,
            })
            .collect();
        *self.hooks.lock() = hooks;
        *self.tasks.lock() = tasks;
    }

    /// Stop reacting. Returns the tasks the instance owned.
    pub(crate) fn dispose(&self) -> Vec<TaskId> {
        self.subscriber.disposed.store(true, Ordering::SeqCst);
        let id = self.subscriber.id;
        self.subscriber.sources.lock().clear_for(id);
        std::mem::take(&mut *self.tasks.lock())
    }

    pub fn is_disposed(&self) -> bool {
        self.subscriber.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentState")
            .field("node", &self.node)
            .field("symbol", &self.subscriber.symbol)
            .field("renders", &self.render_count())
            .field("hooks", &self.hooks.lock().len())
            .finish()
    }
}

/// Passed to a component's render function.
///
/// Hooks are matched to their slot by call order, so a component must call
/// the same `use_*` functions in the same order on every render.
pub struct RenderCtx<'a> {
    container: &'a ContainerInner,
    state: &'a ComponentState,
    props: &'a Props,
    captures: &'a [Value],
    cursor: Cell<usize>,
}

impl<'a> RenderCtx<'a> {
    pub(crate) fn new(
        container: &'a ContainerInner,
        state: &'a ComponentState,
        props: &'a Props,
        captures: &'a [Value],
    ) -> Self {
        Self {
            container,
            state,
            props,
            captures,
            cursor: Cell::new(0),
        }
    }

    pub fn node(&self) -> NodeId {
        self.state.node
    }

    pub fn props(&self) -> &Props {
        self.props
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    /// A prop that must be present.
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.prop(name)
            .ok_or_else(|| CoreError::msg(format!("missing prop `{name}`")))
    }

    /// Values captured by the component's own symbol.
    pub fn captures(&self) -> &[Value] {
        self.captures
    }

    /// Number of renders of this instance, including the current one.
    pub fn render_count(&self) -> usize {
        self.state.render_count()
    }

    fn next_slot(&self) -> usize {
        let slot = self.cursor.get();
        self.cursor.set(slot + 1);
        slot
    }

    /// Existing hook at the next slot, or the one `create` produces.
    fn hook(&self, create: impl FnOnce() -> Result<Hook>) -> Result<Hook> {
        let slot = self.next_slot();
        if let Some(hook) = self.state.hooks.lock().get(slot).cloned() {
            return Ok(hook);
        }
        let hook = create()?;
        let mut hooks = self.state.hooks.lock();
        if hooks.len() != slot {
            return Err(CoreError::msg(format!(
                "hook slot {slot} created out of order ({} slots exist)",
                hooks.len()
            )));
        }
        hooks.push(hook.clone());
        Ok(hook)
    }

    fn value_hook(&self, create: impl FnOnce() -> Result<Value>) -> Result<Value> {
        match self.hook(|| create().map(Hook::Value))? {
            Hook::Value(value) => Ok(value),
            Hook::Task(_) => Err(CoreError::TypeMismatch {
                expected: "value hook",
                found: "task hook",
            }),
        }
    }

    pub fn use_signal(&self, initial: impl Into<Json>) -> Result<Signal<Json>> {
        let value = self.value_hook(|| Ok(Value::Signal(Signal::new(initial.into()))))?;
        value.as_signal().cloned()
    }

    pub fn use_store(&self, initial: Json) -> Result<Store> {
        let value = self.value_hook(|| Store::new(initial).map(Value::Store))?;
        value.as_store().cloned()
    }

    pub fn use_computed(&self, qrl: Qrl<ComputedFn>) -> Result<Computed<Json>> {
        let value = self.value_hook(|| Ok(Value::Computed(Computed::from_qrl(qrl))))?;
        value.as_computed().cloned()
    }

    /// A task that runs before rendering settles, on the server too.
    pub fn use_task(&self, qrl: Qrl<TaskFn>) -> Result<TaskId> {
        self.task_hook(TaskKind::Task, || TaskBody::Task(qrl))
            .map(|task| task.id())
    }

    /// A task that runs on the client only.
    pub fn use_visible_task(&self, qrl: Qrl<TaskFn>) -> Result<TaskId> {
        self.task_hook(TaskKind::Visible, || TaskBody::Task(qrl))
            .map(|task| task.id())
    }

    pub fn use_resource(&self, qrl: Qrl<ResourceFn>) -> Result<Resource> {
        let task = self.task_hook(TaskKind::Resource, || TaskBody::Resource {
            qrl,
            state: Signal::new(pending_state()),
        })?;
        let state = task.resource_state().cloned().ok_or(CoreError::TypeMismatch {
            expected: "resource",
            found: "task",
        })?;
        Ok(Resource::new(state, task.id()))
    }

    fn task_hook(&self, kind: TaskKind, body: impl FnOnce() -> TaskBody) -> Result<Task> {
        let hook = self.hook(|| {
            let task = Task::new(
                self.state.node,
                kind,
                body(),
                Arc::downgrade(&self.container.scheduler),
            );
            let id = task.id();
            self.container.tasks.insert(id, task.clone());
            self.state.tasks.lock().push(id);
            if self.should_schedule(kind) {
                self.container.scheduler.schedule(task.chore());
            }
            tracing::trace!(task = id.raw(), symbol = task.symbol(), ?kind, "task created");
            Ok(Hook::Task(id))
        })?;
        let Hook::Task(id) = hook else {
            return Err(CoreError::TypeMismatch {
                expected: "task hook",
                found: "value hook",
            });
        };
        let task = self
            .container
            .tasks
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoreError::msg(format!("task {} is gone", id.raw())))?;
        if task.kind() != kind {
            return Err(CoreError::msg(format!(
                "hook order changed: expected a {kind:?} task, found {:?}",
                task.kind()
            )));
        }
        Ok(task)
    }

    fn should_schedule(&self, kind: TaskKind) -> bool {
        kind != TaskKind::Visible
            || self.container.mode == RenderMode::Client
            || self.container.config.run_visible_tasks_on_server
    }
}

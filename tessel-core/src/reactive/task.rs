//! Tasks, visible tasks and resources.
//!
//! A task is a side effect owned by a component host. Unlike a component
//! render, its body runs untracked: only reads wrapped in
//! [`TaskCtx::track`] subscribe the task. When a tracked source changes the
//! task schedules a chore for itself; it never re-runs inline.
//!
//! # Cleanup
//!
//! Cleanups registered through [`TaskCtx::cleanup`] run in reverse
//! registration order before the next run and when the owning host is
//! removed.
//!
//! # Resources
//!
//! A resource is a task whose body produces a future of a JSON value. Its
//! state lives in a `Signal<Json>` shaped as
//! `{"status": "pending" | "resolved" | "rejected", "value" | "error": ...}`
//! so it serializes and resumes like any other signal.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::error::{CoreError, Result};
use crate::qrl::{Qrl, ResourceFn, SymbolLoader, TaskFn};
use crate::scheduler::{Chore, ChoreKind, ChoreOutcome, ChoreTarget, Scheduler};
use crate::vnode::NodeId;

use super::context::{untrack, with_observer};
use super::signal::Signal;
use super::subscriber::{AnySource, AnySubscriber, SourceSet, Subscriber, SubscriberId, SubscriberTarget};
use super::value::Value;

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Runs before rendering settles.
    Task,
    /// Runs on the client only, after render work.
    Visible,
    /// Produces an async value into a state signal.
    Resource,
}

impl TaskKind {
    pub fn chore_kind(self) -> ChoreKind {
        match self {
            TaskKind::Task => ChoreKind::Task,
            TaskKind::Visible => ChoreKind::VisibleTask,
            TaskKind::Resource => ChoreKind::Resource,
        }
    }
}

/// What a task body returns.
pub enum TaskOutput {
    Done(Result<()>),
    Pending(BoxFuture<'static, Result<()>>),
}

impl TaskOutput {
    pub fn done() -> Self {
        TaskOutput::Done(Ok(()))
    }

    pub fn from_future<F>(future: F) -> Self
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        TaskOutput::Pending(Box::pin(future))
    }
}

impl From<Result<()>> for TaskOutput {
    fn from(result: Result<()>) -> Self {
        TaskOutput::Done(result)
    }
}

impl From<TaskOutput> for ChoreOutcome {
    fn from(output: TaskOutput) -> Self {
        match output {
            TaskOutput::Done(result) => ChoreOutcome::Done(result),
            TaskOutput::Pending(future) => ChoreOutcome::Pending(future),
        }
    }
}

/// The function a task runs.
#[derive(Clone)]
pub enum TaskBody {
    Task(Qrl<TaskFn>),
    Resource {
        qrl: Qrl<ResourceFn>,
        state: Signal<Json>,
    },
}

impl TaskBody {
    pub fn chunk(&self) -> &str {
        match self {
            TaskBody::Task(qrl) => qrl.chunk(),
            TaskBody::Resource { qrl, .. } => qrl.chunk(),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            TaskBody::Task(qrl) => qrl.symbol(),
            TaskBody::Resource { qrl, .. } => qrl.symbol(),
        }
    }

    pub fn captures(&self) -> &[Value] {
        match self {
            TaskBody::Task(qrl) => qrl.captures(),
            TaskBody::Resource { qrl, .. } => qrl.captures(),
        }
    }

    fn is_resolved(&self) -> bool {
        match self {
            TaskBody::Task(qrl) => qrl.is_resolved(),
            TaskBody::Resource { qrl, .. } => qrl.is_resolved(),
        }
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;

struct TaskInner {
    id: TaskId,
    subscriber_id: SubscriberId,
    host: NodeId,
    kind: TaskKind,
    body: TaskBody,
    sources: Mutex<SourceSet>,
    cleanups: Mutex<Vec<Cleanup>>,
    scheduler: Weak<Scheduler>,
    runs: AtomicUsize,
    disposed: AtomicBool,
}

impl TaskInner {
    fn chore(&self) -> Chore {
        Chore::new(self.kind.chore_kind(), ChoreTarget::Task(self.id))
            .with_host(self.host)
            .with_runnable(self.body.symbol())
    }
}

impl Subscriber for TaskInner {
    fn id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn invalidate(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.schedule(self.chore());
        }
    }

    fn target(&self) -> SubscriberTarget {
        SubscriberTarget::Task(self.id)
    }
}

/// A scheduled side effect owned by a component host.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    pub(crate) fn new(host: NodeId, kind: TaskKind, body: TaskBody, scheduler: Weak<Scheduler>) -> Self {
        Self::with_id(TaskId::new(), host, kind, body, scheduler)
    }

    /// A task with a preallocated ID, for resume.
    pub(crate) fn with_id(
        id: TaskId,
        host: NodeId,
        kind: TaskKind,
        body: TaskBody,
        scheduler: Weak<Scheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id,
                subscriber_id: SubscriberId::new(),
                host,
                kind,
                body,
                sources: Mutex::new(SourceSet::new()),
                cleanups: Mutex::new(Vec::new()),
                scheduler,
                runs: AtomicUsize::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn host(&self) -> NodeId {
        self.inner.host
    }

    pub fn kind(&self) -> TaskKind {
        self.inner.kind
    }

    pub fn body(&self) -> &TaskBody {
        &self.inner.body
    }

    pub fn symbol(&self) -> &str {
        self.inner.body.symbol()
    }

    /// The chore that re-runs this task.
    pub fn chore(&self) -> Chore {
        self.inner.chore()
    }

    /// Times the body has been invoked.
    pub fn run_count(&self) -> usize {
        self.inner.runs.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.body.is_resolved()
    }

    /// Load the body through `loader`.
    pub async fn resolve(&self, loader: &dyn SymbolLoader) -> Result<()> {
        match &self.inner.body {
            TaskBody::Task(qrl) => qrl.resolve(loader).await.map(|_| ()),
            TaskBody::Resource { qrl, .. } => qrl.resolve(loader).await.map(|_| ()),
        }
    }

    /// State signal of a resource task.
    pub fn resource_state(&self) -> Option<&Signal<Json>> {
        match &self.inner.body {
            TaskBody::Resource { state, .. } => Some(state),
            TaskBody::Task(_) => None,
        }
    }

    pub fn as_subscriber(&self) -> AnySubscriber {
        AnySubscriber::new(&self.inner)
    }

    /// Record `source` as a dependency. Used when rebuilding the graph on
    /// resume.
    pub fn add_source(&self, source: AnySource) {
        self.inner.sources.lock().insert(source);
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.sources.lock().len()
    }

    /// Run registered cleanups, newest first.
    pub(crate) fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.inner.cleanups.lock());
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }

    /// Tear down before a re-run: cleanups first, then stale edges.
    pub(crate) fn prepare(&self) {
        self.run_cleanups();
        self.inner.sources.lock().clear_for(self.inner.subscriber_id);
    }

    /// Permanently stop the task. Pending invalidations become no-ops.
    pub(crate) fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::trace!(task = self.inner.id.0, symbol = self.symbol(), "task disposed");
        self.prepare();
    }

    /// Invoke the body. The body must be resolved.
    pub(crate) fn invoke(&self) -> TaskOutput {
        self.inner.runs.fetch_add(1, Ordering::SeqCst);
        let ctx = TaskCtx { task: self.clone() };
        match &self.inner.body {
            TaskBody::Task(qrl) => match qrl.resolved() {
                Ok(body) => untrack(|| body(ctx)),
                Err(err) => TaskOutput::Done(Err(err)),
            },
            TaskBody::Resource { qrl, state } => {
                let body = match qrl.resolved() {
                    Ok(body) => body,
                    Err(err) => return TaskOutput::Done(Err(err)),
                };
                state.set(json!({ "status": "pending" }));
                let future = untrack(|| body(ctx));
                let state = state.clone();
                TaskOutput::from_future(async move {
                    match future.await {
                        Ok(value) => {
                            state.set(json!({ "status": "resolved", "value": value }));
                        }
                        Err(err) => {
                            state.set(json!({ "status": "rejected", "error": err.message() }));
                        }
                    }
                    Ok(())
                })
            }
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("symbol", &self.symbol())
            .field("runs", &self.run_count())
            .finish()
    }
}

/// Handle passed to a task body.
#[derive(Clone)]
pub struct TaskCtx {
    task: Task,
}

impl TaskCtx {
    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    /// Run `f` with reads attributed to this task.
    pub fn track<T>(&self, f: impl FnOnce() -> T) -> T {
        let (value, sources) = with_observer(self.task.as_subscriber(), f);
        self.task.inner.sources.lock().merge(sources);
        value
    }

    /// Register a cleanup for the next re-run or removal of the host.
    pub fn cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.task.inner.cleanups.lock().push(Box::new(f));
    }

    /// Values captured by the task's symbol.
    pub fn captures(&self) -> &[Value] {
        self.task.body().captures()
    }

    pub fn capture(&self, index: usize) -> Result<&Value> {
        self.captures().get(index).ok_or_else(|| {
            CoreError::msg(format!(
                "task `{}` has no capture at index {index}",
                self.task.symbol()
            ))
        })
    }
}

/// Status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Pending,
    Resolved,
    Rejected,
}

/// Handle to an async value produced by a resource task.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    state: Signal<Json>,
    task: TaskId,
}

impl Resource {
    pub(crate) fn new(state: Signal<Json>, task: TaskId) -> Self {
        Self { state, task }
    }

    pub fn task_id(&self) -> TaskId {
        self.task
    }

    pub fn state_signal(&self) -> &Signal<Json> {
        &self.state
    }

    /// Whole state object, tracked.
    pub fn state(&self) -> Json {
        self.state.get()
    }

    pub fn status(&self) -> ResourceStatus {
        self.state.with(|state| match state.get("status").and_then(Json::as_str) {
            Some("resolved") => ResourceStatus::Resolved,
            Some("rejected") => ResourceStatus::Rejected,
            _ => ResourceStatus::Pending,
        })
    }

    /// Resolved value, if any.
    pub fn value(&self) -> Option<Json> {
        self.state.with(|state| state.get("value").cloned())
    }

    /// Rejection message, if any.
    pub fn error(&self) -> Option<String> {
        self.state
            .with(|state| state.get("error").and_then(Json::as_str).map(str::to_string))
    }
}

/// Initial state of a resource signal.
pub(crate) fn pending_state() -> Json {
    json!({ "status": "pending" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::vnode::NodeId;
    use std::sync::Arc;

    fn task_with(body: impl Fn(TaskCtx) -> TaskOutput + Send + Sync + 'static) -> (Task, Arc<Scheduler>) {
        let scheduler = Scheduler::new(&ContainerConfig::default());
        let qrl = Qrl::<TaskFn>::task("tests", "task", body);
        let task = Task::new(
            NodeId::default(),
            TaskKind::Task,
            TaskBody::Task(qrl),
            Arc::downgrade(&scheduler),
        );
        (task, scheduler)
    }

    #[test]
    fn only_tracked_reads_subscribe() {
        let tracked = Signal::new(json!(1));
        let ignored = Signal::new(json!(2));
        let (t, i) = (tracked.clone(), ignored.clone());
        let (task, scheduler) = task_with(move |ctx| {
            ctx.track(|| t.get());
            i.get();
            TaskOutput::done()
        });

        assert!(matches!(task.invoke(), TaskOutput::Done(Ok(()))));
        assert_eq!(tracked.subscriber_count(), 1);
        assert_eq!(ignored.subscriber_count(), 0);

        tracked.set(json!(5));
        ignored.set(json!(6));
        assert_eq!(scheduler.pending_chores().len(), 1);
    }

    #[test]
    fn cleanups_run_newest_first_before_rerun() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let (task, _scheduler) = task_with(move |ctx| {
            let first = log_clone.clone();
            let second = log_clone.clone();
            ctx.cleanup(move || first.lock().push("first"));
            ctx.cleanup(move || second.lock().push("second"));
            TaskOutput::done()
        });

        let _ = task.invoke();
        task.prepare();
        assert_eq!(*log.lock(), vec!["second", "first"]);

        // Cleanups are consumed.
        task.prepare();
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn disposed_task_ignores_invalidation() {
        let source = Signal::new(json!(0));
        let s = source.clone();
        let (task, scheduler) = task_with(move |ctx| {
            ctx.track(|| s.get());
            TaskOutput::done()
        });
        let _ = task.invoke();
        task.dispose();
        source.set(json!(1));
        assert!(scheduler.pending_chores().is_empty());
        assert_eq!(source.subscriber_count(), 0);
    }
}

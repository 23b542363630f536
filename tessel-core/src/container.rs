//! The container: one vnode tree, one scheduler, one host root.
//!
//! A [`Container`] mounts JSX into a host element and owns everything that
//! happens afterwards: component renders, task runs, binding updates and
//! event dispatch all go through its scheduler. Chores are executed by the
//! container itself (it is the scheduler's [`ChoreRunner`]).
//!
//! # Commit
//!
//! A render never touches attached host nodes directly. The diff produces a
//! [`DiffOutput`], and the commit
//!
//! 1. cancels pending chores of removed vnodes,
//! 2. disposes the tasks of removed components (running their cleanups),
//! 3. applies the journal to the host,
//! 4. queues chores for new or re-propped components and one cleanup chore
//!    per removed subtree.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::component::RenderCtx;
use crate::config::ContainerConfig;
use crate::diff::{normalize, DiffOutput, Differ, Journal, Op};
use crate::error::{CoreError, Result};
use crate::events::{Event, Scope};
use crate::host::{Host, HostNode, HostNodeKind};
use crate::jsx::{json_text, JsxNode};
use crate::qrl::{HandlerFn, Qrl, SymbolLoader};
use crate::reactive::{batch, untrack, with_observer, Task, TaskId, TaskOutput};
use crate::scheduler::{Chore, ChoreKind, ChoreOutcome, ChoreRunner, ChoreTarget, DrainStats, Priority, Scheduler};
use crate::vnode::{NodeId, VNode, VNodeKind, VTree};

/// Where a container renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Interactive: visible tasks run, listeners are dispatched.
    Client,
    /// Server-side rendering into a document that is serialized afterwards.
    Server,
}

pub(crate) struct ContainerInner {
    me: Weak<ContainerInner>,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) root: HostNode,
    pub(crate) tree: Mutex<VTree>,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) loader: Arc<dyn SymbolLoader>,
    pub(crate) config: ContainerConfig,
    pub(crate) tasks: DashMap<TaskId, Task>,
    pub(crate) mode: RenderMode,
}

/// Handle to a mounted container. Cheap to clone.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("root", &self.inner.root)
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// A client container rendering into the element `root` of `host`.
    pub fn new(
        host: Arc<dyn Host>,
        root: HostNode,
        loader: Arc<dyn SymbolLoader>,
        config: ContainerConfig,
    ) -> Result<Self> {
        Self::with_mode(host, root, loader, config, RenderMode::Client)
    }

    pub fn with_mode(
        host: Arc<dyn Host>,
        root: HostNode,
        loader: Arc<dyn SymbolLoader>,
        config: ContainerConfig,
        mode: RenderMode,
    ) -> Result<Self> {
        let tree = match host.kind(root) {
            Some(HostNodeKind::Element { tag, ns }) => VTree::new(root, &tag, ns),
            _ => return Err(CoreError::UnknownNode("container root must be an element".into())),
        };
        let scheduler = Scheduler::new(&config);
        Ok(Self::from_tree(host, root, loader, config, mode, tree, scheduler))
    }

    /// Wrap an already built tree whose vnodes report to `scheduler`. Used
    /// by resume.
    pub(crate) fn from_tree(
        host: Arc<dyn Host>,
        root: HostNode,
        loader: Arc<dyn SymbolLoader>,
        config: ContainerConfig,
        mode: RenderMode,
        tree: VTree,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        let inner = Arc::new_cyclic(|me| ContainerInner {
            me: me.clone(),
            host,
            root,
            tree: Mutex::new(tree),
            scheduler,
            loader,
            config,
            tasks: DashMap::new(),
            mode,
        });
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<ContainerInner> {
        &self.inner
    }

    /// Diff `jsx` into the root element. Component renders it discovers are
    /// queued, not run; call [`Container::flush`] to settle.
    pub fn mount(&self, jsx: impl Into<JsxNode>) -> Result<()> {
        let jsx = jsx.into();
        let out = {
            let mut tree = self.inner.tree.lock();
            let root = tree.root();
            let mut differ = Differ::new(&mut tree, &*self.inner.host, &self.inner.scheduler);
            differ.render_into(root, jsx, None)?;
            differ.finish()
        };
        self.inner.commit(out)
    }

    /// Mount and flush.
    pub async fn render(&self, jsx: impl Into<JsxNode>) -> Result<DrainStats> {
        self.mount(jsx)?;
        self.flush().await
    }

    /// Run chores until the queue and the in-flight set are empty.
    pub async fn flush(&self) -> Result<DrainStats> {
        self.inner.scheduler.drain(&*self.inner).await
    }

    /// Run chores up to and including tier `priority`.
    pub async fn flush_until(&self, priority: Priority) -> Result<DrainStats> {
        self.inner.scheduler.drain_until(priority, &*self.inner).await
    }

    /// Deliver `event` to element listeners for `name` on `target` and its
    /// ancestors, then flush. Returns the number of handlers invoked.
    pub async fn dispatch(&self, target: HostNode, name: &str, event: Event) -> Result<usize> {
        let groups = {
            let tree = self.inner.tree.lock();
            let node = tree
                .find_by_host(target)
                .ok_or_else(|| CoreError::UnknownNode(format!("host node {target:?} is not rendered")))?;
            std::iter::once(node)
                .chain(tree.ancestors(node))
                .filter_map(|id| listeners_of(&tree, id, Scope::Element, name))
                .collect::<Vec<_>>()
        };
        self.run_handlers(groups, name, &event).await
    }

    /// Deliver `event` to every `document:` or `window:` listener for `name`,
    /// in document order, then flush.
    pub async fn dispatch_scoped(&self, scope: Scope, name: &str, event: Event) -> Result<usize> {
        let groups = {
            let tree = self.inner.tree.lock();
            tree.descendants(tree.root())
                .into_iter()
                .filter_map(|id| listeners_of(&tree, id, scope, name))
                .collect::<Vec<_>>()
        };
        self.run_handlers(groups, name, &event).await
    }

    async fn run_handlers(&self, groups: Vec<Vec<Qrl<HandlerFn>>>, name: &str, event: &Event) -> Result<usize> {
        let mut invoked = 0;
        let mut failure = None;
        'groups: for group in groups {
            for qrl in group {
                let result = match qrl.resolve(&*self.inner.loader).await {
                    Ok(handler) => {
                        invoked += 1;
                        batch(|| untrack(|| handler(event, qrl.captures())))
                    }
                    Err(error) => Err(error),
                };
                if let Err(error) = result {
                    failure = Some(CoreError::Handler {
                        handler: qrl.symbol().to_string(),
                        event: name.to_string(),
                        message: error.message(),
                    });
                    break 'groups;
                }
            }
            if event.is_propagation_stopped() {
                tracing::trace!(event = name, "propagation stopped");
                break;
            }
        }
        let flushed = self.flush().await;
        match failure {
            Some(error) => {
                if let Err(flush_error) = flushed {
                    tracing::warn!(error = %flush_error, "flush after failed handler also failed");
                }
                Err(error)
            }
            None => flushed.map(|_| invoked),
        }
    }

    pub fn pending_chores(&self) -> Vec<Chore> {
        self.inner.scheduler.pending_chores()
    }

    /// Live tasks, oldest first.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.inner.tasks.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_by_key(|task| task.id().raw());
        tasks
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.inner.tasks.get(&id).map(|entry| entry.value().clone())
    }

    /// Read access to the vnode tree.
    pub fn with_tree<T>(&self, f: impl FnOnce(&VTree) -> T) -> T {
        f(&self.inner.tree.lock())
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.inner.host
    }

    pub fn root_host(&self) -> HostNode {
        self.inner.root
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.inner.scheduler
    }

    pub fn mode(&self) -> RenderMode {
        self.inner.mode
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }
}

fn listeners_of(tree: &VTree, id: NodeId, scope: Scope, name: &str) -> Option<Vec<Qrl<HandlerFn>>> {
    let element = tree.get(id).and_then(VNode::as_element)?;
    let handlers: Vec<_> = element
        .listeners
        .iter()
        .filter(|listener| listener.scope == scope && listener.event == name)
        .map(|listener| listener.handler.clone())
        .collect();
    (!handlers.is_empty()).then_some(handlers)
}

/// Attribute a render failure to its component. Failures of the machinery
/// itself pass through unchanged.
fn render_error(component: &str, error: CoreError) -> CoreError {
    match error {
        CoreError::Render { .. }
        | CoreError::RecursiveDrain
        | CoreError::SchedulerIntegrity(_)
        | CoreError::ComputedCycle(_) => error,
        other => CoreError::Render {
            component: component.to_string(),
            message: other.message(),
        },
    }
}

fn task_error(task: &str, error: CoreError) -> CoreError {
    match error {
        CoreError::Task { .. } | CoreError::RecursiveDrain | CoreError::SchedulerIntegrity(_) => error,
        other => CoreError::Task {
            task: task.to_string(),
            message: other.message(),
        },
    }
}

fn task_outcome(symbol: String, output: TaskOutput) -> ChoreOutcome {
    match output {
        TaskOutput::Done(result) => ChoreOutcome::Done(result.map_err(|e| task_error(&symbol, e))),
        TaskOutput::Pending(future) => {
            ChoreOutcome::Pending(Box::pin(async move { future.await.map_err(|e| task_error(&symbol, e)) }))
        }
    }
}

impl ContainerInner {
    fn this(&self) -> Result<Arc<ContainerInner>> {
        self.me
            .upgrade()
            .ok_or_else(|| CoreError::msg("container dropped during a drain"))
    }

    pub(crate) fn commit(&self, out: DiffOutput) -> Result<()> {
        let DiffOutput {
            journal,
            removed,
            cancelled,
            disposed,
            scheduled,
            stats,
        } = out;
        let pruned = self.scheduler.cancel_hosts(&cancelled);
        for id in disposed.iter().rev() {
            if let Some((_, task)) = self.tasks.remove(id) {
                task.dispose();
            }
        }
        let applied = journal.apply(&*self.host)?;
        for chore in scheduled {
            if !chore.host.is_some_and(|host| cancelled.contains(&host)) {
                self.scheduler.schedule(chore);
            }
        }
        for id in removed {
            self.scheduler.schedule(Chore::cleanup(id));
        }
        tracing::trace!(
            created = stats.created,
            removed = stats.removed,
            pruned,
            disposed = disposed.len(),
            ops = applied.ops,
            moved = applied.moved,
            "commit"
        );
        Ok(())
    }

    fn run_component(&self, node: NodeId) -> ChoreOutcome {
        let qrl = match self.tree.lock().component(node) {
            Some(host) => host.qrl.clone(),
            None => return ChoreOutcome::Done(Ok(())),
        };
        if qrl.is_resolved() {
            return ChoreOutcome::Done(self.render_component(node));
        }
        let this = match self.this() {
            Ok(this) => this,
            Err(error) => return ChoreOutcome::Done(Err(error)),
        };
        ChoreOutcome::Pending(Box::pin(async move {
            let loader = this.loader.clone();
            qrl.resolve(&*loader)
                .await
                .map_err(|e| render_error(qrl.symbol(), e))?;
            if !this.tree.lock().is_attached(node) {
                return Ok(());
            }
            this.render_component(node)
        }))
    }

    /// Render the component at `node` and commit the diff of its output.
    fn render_component(&self, node: NodeId) -> Result<()> {
        let (qrl, props, state) = {
            let tree = self.tree.lock();
            let host = tree
                .component(node)
                .ok_or_else(|| CoreError::UnknownNode(format!("{node:?} is not a component")))?;
            (host.qrl.clone(), host.props.clone(), host.state.clone())
        };
        let render = qrl.resolved()?;
        state.begin_render();
        let (result, sources) = {
            let ctx = RenderCtx::new(self, &state, &props, qrl.captures());
            with_observer(state.as_subscriber(), || render(&ctx))
        };
        state.end_render(sources);
        let jsx = result.map_err(|e| render_error(qrl.symbol(), e))?;

        let out = {
            let mut tree = self.tree.lock();
            if !tree.is_attached(node) {
                return Ok(());
            }
            let mut differ = Differ::new(&mut tree, &*self.host, &self.scheduler);
            differ.render_into(node, jsx, Some(node))?;
            differ.finish()
        };
        tracing::debug!(?node, component = qrl.symbol(), renders = state.render_count(), "component rendered");
        self.commit(out)
    }

    fn run_task(&self, id: TaskId) -> ChoreOutcome {
        let Some(task) = self.tasks.get(&id).map(|entry| entry.value().clone()) else {
            return ChoreOutcome::Done(Ok(()));
        };
        if task.is_disposed() {
            return ChoreOutcome::Done(Ok(()));
        }
        let symbol = task.symbol().to_string();
        if task.is_resolved() {
            task.prepare();
            return task_outcome(symbol, task.invoke());
        }
        let loader = self.loader.clone();
        ChoreOutcome::Pending(Box::pin(async move {
            task.resolve(&*loader).await.map_err(|e| task_error(&symbol, e))?;
            if task.is_disposed() {
                return Ok(());
            }
            task.prepare();
            let result = match task.invoke() {
                TaskOutput::Done(result) => result,
                TaskOutput::Pending(future) => future.await,
            };
            result.map_err(|e| task_error(&symbol, e))
        }))
    }

    fn run_binding(&self, node: NodeId, attr: Option<&str>) -> Result<()> {
        let (binding, host, tag) = {
            let tree = self.tree.lock();
            let Some(vnode) = tree.get(node) else {
                return Ok(());
            };
            let Some(host) = vnode.host else {
                return Ok(());
            };
            match (&vnode.kind, attr) {
                (VNodeKind::Text(data), None) => (data.binding.clone(), host, None),
                (VNodeKind::Element(data), Some(attr)) => {
                    (data.bindings.get(attr).cloned(), host, Some(data.tag.clone()))
                }
                _ => (None, host, None),
            }
        };
        let Some(binding) = binding else {
            return Ok(());
        };
        let value = binding.evaluate()?;
        let op = match (tag, attr) {
            (Some(tag), Some(attr)) => Op::from_patch(host, normalize(&tag, attr, &value)?),
            _ => {
                let text = json_text(&value);
                let mut tree = self.tree.lock();
                if let Some(VNodeKind::Text(data)) = tree.get_mut(node).map(|vnode| &mut vnode.kind) {
                    if data.text == text {
                        return Ok(());
                    }
                    data.text = text.clone();
                }
                Op::SetText { node: host, text }
            }
        };
        let mut journal = Journal::new();
        journal.push(op);
        journal.apply(&*self.host)?;
        Ok(())
    }

    /// Nearest boundary above `origin` that is not already showing its
    /// fallback.
    fn find_boundary(&self, origin: NodeId) -> Option<NodeId> {
        let mut tree = self.tree.lock();
        let mut current = origin;
        loop {
            let boundary = tree.nearest_boundary(current)?;
            match tree.boundary_mut(boundary) {
                Some(host) if host.error.is_none() => return Some(boundary),
                _ => current = boundary,
            }
        }
    }

    fn show_fallback(&self, boundary: NodeId, error: &CoreError) -> Result<()> {
        let (fallback, author) = {
            let mut tree = self.tree.lock();
            let host = tree
                .boundary_mut(boundary)
                .ok_or_else(|| CoreError::UnknownNode(format!("{boundary:?} is not a boundary")))?;
            host.error = Some(error.clone());
            (host.fallback.clone(), host.author)
        };
        let render = fallback.resolved()?;
        let jsx = untrack(|| render(error))?;
        let out = {
            let mut tree = self.tree.lock();
            let mut differ = Differ::new(&mut tree, &*self.host, &self.scheduler);
            differ.render_into(boundary, jsx, author)?;
            differ.finish()
        };
        self.commit(out)
    }
}

impl ChoreRunner for ContainerInner {
    fn run(&self, chore: &Chore) -> ChoreOutcome {
        match (chore.kind(), chore.target()) {
            (ChoreKind::Component, ChoreTarget::Node(node)) => self.run_component(*node),
            (ChoreKind::Task | ChoreKind::VisibleTask | ChoreKind::Resource, ChoreTarget::Task(id)) => {
                self.run_task(*id)
            }
            (ChoreKind::Binding, ChoreTarget::Binding { node, attr }) => {
                ChoreOutcome::Done(self.run_binding(*node, attr.as_deref()))
            }
            (ChoreKind::Cleanup, ChoreTarget::Node(node)) => {
                let freed = self.tree.lock().free(*node);
                tracing::trace!(?node, freed, "detached subtree freed");
                ChoreOutcome::Done(Ok(()))
            }
            (kind, target) => ChoreOutcome::Done(Err(CoreError::SchedulerIntegrity(format!(
                "{kind:?} chore cannot target {target:?}"
            )))),
        }
    }

    fn handle_error(&self, chore: &Chore, error: CoreError) -> Result<()> {
        let Some(origin) = chore.host else {
            return Err(error);
        };
        let Some(boundary) = self.find_boundary(origin) else {
            return Err(error);
        };
        self.show_fallback(boundary, &error)?;
        tracing::warn!(key = %chore.key, %error, ?boundary, "error routed to boundary");
        Ok(())
    }

    fn is_live(&self, host: NodeId) -> bool {
        self.tree.lock().is_attached(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDocument;
    use crate::jsx::{component, el};
    use crate::qrl::{ComponentFn, SymbolRegistry};
    use crate::vnode::Namespace;
    use serde_json::json;

    fn container() -> (Container, Arc<MemoryDocument>) {
        let doc = Arc::new(MemoryDocument::new());
        let root = doc.create_element("div", Namespace::Html);
        let container = Container::new(
            doc.clone(),
            root,
            Arc::new(SymbolRegistry::new()),
            ContainerConfig::default(),
        )
        .unwrap();
        (container, doc)
    }

    #[tokio::test]
    async fn components_render_on_flush() {
        let (container, doc) = container();
        let hello = Qrl::<ComponentFn>::component("app", "Hello", |ctx| {
            let name = ctx.require("name")?.read()?;
            Ok(el("p").child(format!("hi {}", name.as_str().unwrap_or("?"))).into())
        });
        container.mount(component(hello).prop("name", "ada")).unwrap();
        assert_eq!(doc.inner_html(container.root_host()), "");
        assert_eq!(container.pending_chores().len(), 1);

        container.flush().await.unwrap();
        assert_eq!(doc.inner_html(container.root_host()), "<p>hi ada</p>");
    }

    #[tokio::test]
    async fn render_errors_name_the_component() {
        let (container, _doc) = container();
        let broken = Qrl::<ComponentFn>::component("app", "Broken", |_| Err(CoreError::msg("nope")));
        let err = container.render(component(broken)).await.unwrap_err();
        assert_eq!(
            err,
            CoreError::Render {
                component: "Broken".into(),
                message: "nope".into()
            }
        );
    }

    #[tokio::test]
    async fn signal_writes_rerender_only_the_reader() {
        let (container, doc) = container();
        let counter = Qrl::<ComponentFn>::component("app", "Counter", |ctx| {
            let count = ctx.use_signal(json!(0))?;
            Ok(el("b").child(json_text(&count.get())).into())
        });
        container.render(component(counter)).await.unwrap();
        assert_eq!(doc.inner_html(container.root_host()), "<b>0</b>");

        let state = container.with_tree(|tree| {
            let node = tree.components()[0];
            tree.component(node).map(|host| host.state.clone())
        });
        let state = state.unwrap();
        let signal = state.hooks()[0].clone();
        let crate::component::Hook::Value(value) = signal else {
            panic!("expected a value hook");
        };
        value.as_signal().unwrap().set(json!(7));
        container.flush().await.unwrap();
        assert_eq!(doc.inner_html(container.root_host()), "<b>7</b>");
        assert_eq!(state.render_count(), 2);
    }
}

//! Resuming a server-rendered container.
//!
//! [`Container::resume`] rebuilds a live container from the HTML already in
//! the host and the records of an [`SsrOutput`], without running any
//! component:
//!
//! 1. the state arena is rebuilt in one forward pass, and the symbols of
//!    computed signals are resolved so they can recompute on demand,
//! 2. vnodes are recreated in pre-order and matched against the host nodes
//!    under their nearest element (empty text nodes, which leave no markup,
//!    are recreated),
//! 3. tasks, hooks and bindings are restored and the subscription graph is
//!    rewired from the edge records,
//! 4. visible tasks are scheduled and the container is flushed.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::component::{ComponentState, Hook};
use crate::config::ContainerConfig;
use crate::container::{Container, RenderMode};
use crate::diff::{normalize, AttrPatch};
use crate::error::{CoreError, Result};
use crate::host::{Host, HostChildren, HostNode, HostNodeKind};
use crate::jsx::{AttrValue, JsxBoundary, JsxComponent, JsxElement, JsxNode, Listener, Props, Reactive};
use crate::qrl::{FallbackFn, Qrl, SymbolLoader};
use crate::reactive::{
    pending_state, untrack, AnySource, AnySubscriber, Computed, Resource, Signal, Store, Task, TaskBody, TaskId,
    TaskKind, Value,
};
use crate::scheduler::Scheduler;
use crate::ssr::{
    AttrRecord, HookRecord, JsxRecord, ListenerRecord, QrlRecord, SsrOutput, StateBlob, StateRecord,
    SubscriberRecord, ValueRef, VNodeRecordKind,
};
use crate::vnode::{
    Binding, BoundaryHost, ComponentHost, ElementData, NodeId, TextData, VNodeKind, VTree, VirtualData,
    VirtualRole,
};

impl Container {
    /// Continue a server render. `root` must already contain `output.html`.
    pub async fn resume(
        host: Arc<dyn Host>,
        root: HostNode,
        output: &SsrOutput,
        loader: Arc<dyn SymbolLoader>,
        config: ContainerConfig,
    ) -> Result<Container> {
        let scheduler = Scheduler::new(&config);
        let task_ids: Vec<TaskId> = output.state.tasks.iter().map(|_| TaskId::new()).collect();

        let arena = Arena::build(&output.state, &task_ids)?;
        for value in &arena.values {
            if let Value::Computed(computed) = value {
                if let Some(origin) = computed.origin() {
                    origin.resolve(&*loader).await?;
                }
            }
        }

        let (tree, ids, fallbacks) = TreeBuilder::new(&*host, root, &arena, &task_ids, Arc::downgrade(&scheduler))?
            .build(output)?;
        for fallback in &fallbacks {
            fallback.resolve(&*loader).await?;
        }

        let container = Container::from_tree(host, root, loader, config, RenderMode::Client, tree, scheduler);
        let inner = container.inner();
        for (index, record) in output.state.tasks.iter().enumerate() {
            let host = node_at(&ids, record.host)?;
            let qrl = &record.qrl;
            let body = match record.kind {
                TaskKind::Resource => TaskBody::Resource {
                    qrl: arena.qrl(qrl)?,
                    state: match record.state {
                        Some(state) => arena.record(state)?.as_signal()?.clone(),
                        None => Signal::new(pending_state()),
                    },
                },
                TaskKind::Task | TaskKind::Visible => TaskBody::Task(arena.qrl(qrl)?),
            };
            let task = Task::with_id(
                task_ids[index],
                host,
                record.kind,
                body,
                Arc::downgrade(&inner.scheduler),
            );
            inner.tasks.insert(task.id(), task);
        }

        let mut wired = 0;
        for edge in &output.state.edges {
            let source = arena.record(edge.source)?;
            for subscriber in &edge.subscribers {
                let sink = {
                    let tree = inner.tree.lock();
                    Sink::find(&tree, &inner.tasks, &arena, &ids, &task_ids, subscriber)?
                };
                match (source, edge.key.as_deref()) {
                    (Value::Signal(signal), None) => {
                        signal.subscribe(sink.subscriber());
                        sink.add_source(signal.as_source());
                    }
                    (Value::Computed(computed), None) => {
                        computed.subscribe(sink.subscriber());
                        sink.add_source(computed.as_source());
                    }
                    (Value::Store(store), Some(key)) => {
                        store.subscribe_key(key, sink.subscriber());
                        sink.add_source(store.key_source(key));
                    }
                    (other, _) => {
                        return Err(CoreError::Resume(format!(
                            "state record {} ({}) cannot be an edge source",
                            edge.source,
                            other.kind()
                        )))
                    }
                }
                wired += 1;
            }
        }

        for task in container.tasks() {
            if task.kind() == TaskKind::Visible {
                inner.scheduler.schedule(task.chore());
            }
        }
        tracing::debug!(
            vnodes = ids.len(),
            records = arena.values.len(),
            tasks = task_ids.len(),
            edges = wired,
            "container resumed"
        );
        container.flush().await?;
        Ok(container)
    }
}

fn node_at(ids: &[NodeId], index: u32) -> Result<NodeId> {
    ids.get(index as usize)
        .copied()
        .ok_or_else(|| CoreError::Resume(format!("vnode {index} referenced before it was built")))
}

fn task_at(task_ids: &[TaskId], index: u32) -> Result<TaskId> {
    task_ids
        .get(index as usize)
        .copied()
        .ok_or_else(|| CoreError::Resume(format!("unknown task {index}")))
}

/// The rebuilt state arena.
struct Arena<'a> {
    task_ids: &'a [TaskId],
    values: Vec<Value>,
}

impl<'a> Arena<'a> {
    fn build(state: &StateBlob, task_ids: &'a [TaskId]) -> Result<Self> {
        let mut arena = Self {
            task_ids,
            values: Vec::with_capacity(state.records.len()),
        };
        for record in &state.records {
            let value = match record {
                StateRecord::Signal { value } => Value::Signal(Signal::new(value.clone())),
                StateRecord::Store { value, deep, children } => {
                    let store = if *deep {
                        Store::new(value.clone())?
                    } else {
                        Store::shallow(value.clone())?
                    };
                    for (key, child) in children {
                        store.adopt_child(key, arena.record(*child)?.as_store()?.clone())?;
                    }
                    Value::Store(store)
                }
                StateRecord::Computed { qrl, value } => {
                    let computed = Computed::from_qrl(arena.qrl(qrl)?);
                    if let Some(value) = value {
                        computed.restore(value.clone());
                    }
                    Value::Computed(computed)
                }
                StateRecord::Resource { state, task } => {
                    let signal = arena.record(*state)?.as_signal()?.clone();
                    let task = match task {
                        Some(task) => task_at(arena.task_ids, *task)?,
                        None => TaskId::new(),
                    };
                    Value::Resource(Resource::new(signal, task))
                }
                StateRecord::Jsx { node } => Value::Jsx(arena.jsx(node)?),
            };
            arena.values.push(value);
        }
        Ok(arena)
    }

    fn record(&self, index: u32) -> Result<&Value> {
        self.values
            .get(index as usize)
            .ok_or_else(|| CoreError::Resume(format!("state record {index} referenced before it was built")))
    }

    fn value(&self, value: &ValueRef) -> Result<Value> {
        match value {
            ValueRef::Json(json) => Ok(Value::Primitive(json.clone())),
            ValueRef::Ref(index) => self.record(*index).cloned(),
        }
    }

    fn reactive(&self, index: u32) -> Result<Reactive> {
        match self.record(index)? {
            Value::Signal(signal) => Ok(Reactive::Signal(signal.clone())),
            Value::Computed(computed) => Ok(Reactive::Computed(computed.clone())),
            other => Err(CoreError::TypeMismatch {
                expected: "signal or computed",
                found: other.kind(),
            }),
        }
    }

    fn qrl<F>(&self, record: &QrlRecord) -> Result<Qrl<F>>
    where
        F: ?Sized + Send + Sync + 'static,
    {
        let captures = record
            .captures
            .iter()
            .map(|value| self.value(value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Qrl::lazy(&record.chunk, &record.symbol).with_captures(captures))
    }

    fn attrs(&self, attrs: &[(String, AttrRecord)]) -> Result<IndexMap<String, AttrValue>> {
        attrs
            .iter()
            .map(|(name, record)| {
                let value = match record {
                    AttrRecord::Static { value } => AttrValue::Static(value.clone()),
                    AttrRecord::Bound { record } => AttrValue::Bound(self.reactive(*record)?),
                };
                Ok((name.clone(), value))
            })
            .collect()
    }

    fn listeners(&self, listeners: &[ListenerRecord]) -> Result<Vec<Listener>> {
        listeners
            .iter()
            .map(|listener| {
                Ok(Listener {
                    scope: listener.scope,
                    event: listener.event.clone(),
                    handler: self.qrl(&listener.qrl)?,
                })
            })
            .collect()
    }

    fn props(&self, var: &[(String, ValueRef)], consts: &[(String, ValueRef)]) -> Result<Props> {
        let mut props = Props::new();
        for (name, value) in var {
            props.var.insert(name.clone(), self.value(value)?);
        }
        for (name, value) in consts {
            props.consts.insert(name.clone(), self.value(value)?);
        }
        Ok(props)
    }

    fn jsx_list(&self, records: &[JsxRecord]) -> Result<Vec<JsxNode>> {
        records.iter().map(|record| self.jsx(record)).collect()
    }

    fn jsx(&self, record: &JsxRecord) -> Result<JsxNode> {
        Ok(match record {
            JsxRecord::Empty => JsxNode::Empty,
            JsxRecord::Text { text } => JsxNode::Text(text.clone()),
            JsxRecord::Signal { record } => JsxNode::Signal(self.reactive(*record)?),
            JsxRecord::Element {
                tag,
                key,
                props,
                consts,
                listeners,
                children,
                inner_html,
            } => JsxNode::Element(Box::new(JsxElement {
                tag: tag.clone(),
                key: key.clone(),
                props: self.attrs(props)?,
                consts: self.attrs(consts)?,
                listeners: self.listeners(listeners)?,
                children: self.jsx_list(children)?,
                inner_html: inner_html.clone(),
            })),
            JsxRecord::Fragment { key, children } => JsxNode::Fragment {
                key: key.clone(),
                children: self.jsx_list(children)?,
            },
            JsxRecord::Component {
                qrl,
                key,
                var,
                consts,
                children,
            } => JsxNode::Component(Box::new(JsxComponent {
                qrl: self.qrl(qrl)?,
                props: self.props(var, consts)?,
                key: key.clone(),
                children: self.jsx_list(children)?,
            })),
            JsxRecord::Slot { name } => JsxNode::Slot { name: name.clone() },
            JsxRecord::Boundary {
                key,
                fallback,
                children,
            } => JsxNode::ErrorBoundary(Box::new(JsxBoundary {
                key: key.clone(),
                fallback: self.qrl(fallback)?,
                children: self.jsx_list(children)?,
            })),
        })
    }
}

/// Host children of one element, consumed in order.
struct Cursor {
    children: HostChildren,
    next: usize,
}

struct TreeBuilder<'a> {
    host: &'a dyn Host,
    arena: &'a Arena<'a>,
    task_ids: &'a [TaskId],
    scheduler: Weak<Scheduler>,
    tree: VTree,
    cursors: HashMap<NodeId, Cursor>,
}

impl<'a> TreeBuilder<'a> {
    fn new(
        host: &'a dyn Host,
        root: HostNode,
        arena: &'a Arena<'a>,
        task_ids: &'a [TaskId],
        scheduler: Weak<Scheduler>,
    ) -> Result<Self> {
        let tree = match host.kind(root) {
            Some(HostNodeKind::Element { tag, ns }) => VTree::new(root, &tag, ns),
            _ => return Err(CoreError::Resume("container root must be an element".into())),
        };
        Ok(Self {
            host,
            arena,
            task_ids,
            scheduler,
            tree,
            cursors: HashMap::new(),
        })
    }

    fn build(mut self, output: &SsrOutput) -> Result<(VTree, Vec<NodeId>, Vec<Qrl<FallbackFn>>)> {
        let mut ids = Vec::with_capacity(output.vnodes.len());
        let mut fallbacks = Vec::new();
        for (index, record) in output.vnodes.iter().enumerate() {
            if index == 0 {
                if record.parent.is_some() || !matches!(record.kind, VNodeRecordKind::Element { .. }) {
                    return Err(CoreError::Resume("first vnode record must be the root element".into()));
                }
                ids.push(self.tree.root());
                continue;
            }
            let parent = record
                .parent
                .ok_or_else(|| CoreError::Resume(format!("vnode {index} has no parent")))
                .and_then(|p| node_at(&ids, p))?;
            let id = self.vnode(parent, &record.kind, &ids)?;
            if let VNodeKind::Virtual(VirtualData {
                role: VirtualRole::Boundary(boundary),
                ..
            }) = &self.tree.node(id)?.kind
            {
                fallbacks.push(boundary.fallback.clone());
            }
            self.tree.node_mut(parent)?.children.push(id);
            ids.push(id);
        }

        for (element, cursor) in &self.cursors {
            let left = cursor.children[cursor.next.min(cursor.children.len())..]
                .iter()
                .filter(|node| !matches!(self.host.kind(**node), Some(HostNodeKind::Comment)))
                .count();
            if left > 0 {
                return Err(CoreError::Resume(format!(
                    "{left} host nodes under {element:?} have no vnode"
                )));
            }
        }
        Ok((self.tree, ids, fallbacks))
    }

    fn vnode(&mut self, parent: NodeId, kind: &VNodeRecordKind, ids: &[NodeId]) -> Result<NodeId> {
        let arena = self.arena;
        match kind {
            VNodeRecordKind::Element {
                tag,
                key,
                props,
                consts,
                listeners,
                inner_html,
            } => {
                let host = self.claim(parent)?;
                match self.host.kind(host) {
                    Some(HostNodeKind::Element { tag: found, .. }) if found == *tag => {}
                    other => {
                        return Err(CoreError::Resume(format!(
                            "expected <{tag}>, found {other:?} in the host tree"
                        )))
                    }
                }
                let ns = self.tree.child_namespace(parent).for_element(tag);
                let mut data = ElementData::new(tag, ns);
                data.key = key.clone();
                data.props = arena.attrs(props)?;
                data.consts = arena.attrs(consts)?;
                data.listeners = arena.listeners(listeners)?;
                data.inner_html = inner_html.clone();
                let id = self.tree.insert_with(Some(parent), |_| VNodeKind::Element(data));
                self.tree.set_host(id, host);
                self.hydrate_element(id, host)?;
                Ok(id)
            }
            VNodeRecordKind::Text { bound, empty } => {
                let id = self
                    .tree
                    .insert_with(Some(parent), |_| VNodeKind::Text(TextData::default()));
                let (host, text) = if *empty {
                    (self.insert_empty_text(parent)?, String::new())
                } else {
                    let host = self.claim(parent)?;
                    if self.host.kind(host) != Some(HostNodeKind::Text) {
                        return Err(CoreError::Resume(format!(
                            "expected text, found {:?} in the host tree",
                            self.host.kind(host)
                        )));
                    }
                    (host, self.host.text(host).unwrap_or_default())
                };
                let binding = match bound {
                    Some(record) => Some(Binding::new(id, None, arena.reactive(*record)?, self.scheduler.clone())),
                    None => None,
                };
                self.tree.set_host(id, host);
                if let VNodeKind::Text(data) = &mut self.tree.node_mut(id)?.kind {
                    data.text = text;
                    data.binding = binding;
                }
                Ok(id)
            }
            VNodeRecordKind::Fragment { key } => Ok(self.tree.insert_with(Some(parent), |_| {
                VNodeKind::Virtual(VirtualData {
                    key: key.clone(),
                    role: VirtualRole::Fragment,
                })
            })),
            VNodeRecordKind::Component {
                key,
                qrl,
                var,
                consts,
                projected,
                hooks,
                author,
            } => {
                let qrl = arena.qrl(qrl)?;
                let props = arena.props(var, consts)?;
                let projected = arena.jsx_list(projected)?;
                let author = author.map(|a| node_at(ids, a)).transpose()?;
                let mut restored = Vec::with_capacity(hooks.len());
                for hook in hooks {
                    restored.push(match hook {
                        HookRecord::Value { value } => Hook::Value(arena.value(value)?),
                        HookRecord::Task { task } => Hook::Task(task_at(self.task_ids, *task)?),
                    });
                }
                let symbol = qrl.symbol().to_string();
                let scheduler = self.scheduler.clone();
                let id = self.tree.insert_with(Some(parent), |id| {
                    let state = ComponentState::new(id, &symbol, scheduler);
                    state.restore(restored);
                    VNodeKind::Virtual(VirtualData {
                        key: key.clone(),
                        role: VirtualRole::Component(ComponentHost {
                            qrl,
                            props,
                            projected,
                            slots: Vec::new(),
                            author,
                            state,
                        }),
                    })
                });
                Ok(id)
            }
            VNodeRecordKind::Projection { name, component } => {
                let component = component.map(|c| node_at(ids, c)).transpose()?;
                let id = self.tree.insert_with(Some(parent), |_| {
                    VNodeKind::Virtual(VirtualData {
                        key: None,
                        role: VirtualRole::Projection {
                            name: name.clone(),
                            component,
                        },
                    })
                });
                if let Some(host) = component.and_then(|c| self.tree.component_mut(c)) {
                    host.slots.push(id);
                }
                Ok(id)
            }
            VNodeRecordKind::Boundary {
                key,
                fallback,
                children,
                error,
                author,
            } => {
                let boundary = BoundaryHost {
                    fallback: arena.qrl(fallback)?,
                    children: arena.jsx_list(children)?,
                    error: error.as_ref().map(CoreError::msg),
                    author: author.map(|a| node_at(ids, a)).transpose()?,
                };
                Ok(self.tree.insert_with(Some(parent), |_| {
                    VNodeKind::Virtual(VirtualData {
                        key: key.clone(),
                        role: VirtualRole::Boundary(boundary),
                    })
                }))
            }
        }
    }

    fn cursor(&mut self, parent: NodeId) -> Result<(HostNode, &mut Cursor)> {
        let element = self
            .tree
            .host_parent(parent)
            .ok_or_else(|| CoreError::Resume(format!("{parent:?} has no element ancestor")))?;
        let host = self
            .tree
            .node(element)?
            .host
            .ok_or_else(|| CoreError::Resume(format!("{element:?} has no host node")))?;
        let dom = self.host;
        let cursor = self.cursors.entry(element).or_insert_with(|| Cursor {
            children: dom.children(host),
            next: 0,
        });
        while cursor
            .children
            .get(cursor.next)
            .is_some_and(|node| dom.kind(*node) == Some(HostNodeKind::Comment))
        {
            cursor.next += 1;
        }
        Ok((host, cursor))
    }

    /// The next unclaimed host node under the element that hosts `parent`.
    fn claim(&mut self, parent: NodeId) -> Result<HostNode> {
        let (_, cursor) = self.cursor(parent)?;
        let node = cursor
            .children
            .get(cursor.next)
            .copied()
            .ok_or_else(|| CoreError::Resume(format!("host tree ends early under {parent:?}")))?;
        cursor.next += 1;
        Ok(node)
    }

    fn insert_empty_text(&mut self, parent: NodeId) -> Result<HostNode> {
        let dom = self.host;
        let (element, cursor) = self.cursor(parent)?;
        let anchor = cursor.children.get(cursor.next).copied();
        let text = dom.create_text("");
        dom.insert_before(element, text, anchor)?;
        Ok(text)
    }

    /// Recreate bindings and live form properties of a claimed element.
    fn hydrate_element(&mut self, id: NodeId, host: HostNode) -> Result<()> {
        let (tag, attrs) = match &self.tree.node(id)?.kind {
            VNodeKind::Element(data) => (
                data.tag.clone(),
                data.consts
                    .iter()
                    .chain(data.props.iter())
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect::<Vec<_>>(),
            ),
            _ => return Ok(()),
        };
        let mut bindings = Vec::new();
        for (name, value) in attrs {
            let json = match &value {
                AttrValue::Static(json) => json.clone(),
                AttrValue::Bound(reactive) => {
                    bindings.push(Binding::new(id, Some(&name), reactive.clone(), self.scheduler.clone()));
                    untrack(|| reactive.read())?
                }
            };
            if let AttrPatch::Property { name, value } = normalize(&tag, &name, &json)? {
                if tag == "textarea" && name == "value" {
                    for child in self.host.children(host) {
                        self.host.remove(child)?;
                    }
                }
                self.host.set_property(host, &name, &value)?;
            }
        }
        if let VNodeKind::Element(data) = &mut self.tree.node_mut(id)?.kind {
            for binding in bindings {
                if let Some(attr) = binding.attr().map(Arc::<str>::from) {
                    data.bindings.insert(attr, binding);
                }
            }
        }
        Ok(())
    }
}

/// The subscriber end of a restored edge.
enum Sink {
    Component(Arc<ComponentState>),
    Task(Task),
    Binding(Arc<Binding>),
    Computed(Computed<serde_json::Value>),
}

impl Sink {
    fn find(
        tree: &VTree,
        tasks: &dashmap::DashMap<TaskId, Task>,
        arena: &Arena<'_>,
        ids: &[NodeId],
        task_ids: &[TaskId],
        record: &SubscriberRecord,
    ) -> Result<Self> {
        let missing = || CoreError::Resume(format!("edge subscriber {record:?} does not exist"));
        Ok(match record {
            SubscriberRecord::Component { node } => {
                let id = node_at(ids, *node)?;
                Sink::Component(tree.component(id).ok_or_else(missing)?.state.clone())
            }
            SubscriberRecord::Task { task } => {
                let id = task_at(task_ids, *task)?;
                Sink::Task(tasks.get(&id).map(|entry| entry.value().clone()).ok_or_else(missing)?)
            }
            SubscriberRecord::Binding { node, attr } => {
                let vnode = tree.node(node_at(ids, *node)?)?;
                let binding = match (&vnode.kind, attr) {
                    (VNodeKind::Text(data), None) => data.binding.clone(),
                    (VNodeKind::Element(data), Some(attr)) => data.bindings.get(attr.as_str()).cloned(),
                    _ => None,
                };
                Sink::Binding(binding.ok_or_else(missing)?)
            }
            SubscriberRecord::Computed { record } => Sink::Computed(arena.record(*record)?.as_computed()?.clone()),
        })
    }

    fn subscriber(&self) -> AnySubscriber {
        match self {
            Sink::Component(state) => state.as_subscriber(),
            Sink::Task(task) => task.as_subscriber(),
            Sink::Binding(binding) => binding.as_subscriber(),
            Sink::Computed(computed) => computed.as_subscriber(),
        }
    }

    fn add_source(&self, source: AnySource) {
        match self {
            Sink::Component(state) => state.add_source(source),
            Sink::Task(task) => task.add_source(source),
            Sink::Binding(binding) => binding.add_source(source),
            Sink::Computed(computed) => computed.add_source(source),
        }
    }
}

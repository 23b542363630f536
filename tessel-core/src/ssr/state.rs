//! The state arena and vnode records.
//!
//! Everything a resumed client needs that is not visible in the HTML is
//! written here: reactive values reachable from the tree, tasks, hooks,
//! listeners and the subscription graph.
//!
//! # Layout
//!
//! Reactive values are flattened into `records`. A value that refers to
//! another reactive value stores its index ([`ValueRef::Ref`]). Records are
//! allocated post-order, so every reference points to a lower index and a
//! resume can rebuild the arena in a single forward pass. Identity is
//! preserved: a signal reachable from two places is written once.
//!
//! Vnodes are written in pre-order with the root at index 0, each naming its
//! parent. Edges name a source record and the subscribers that read it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::component::Hook;
use crate::error::{CoreError, Result};
use crate::events::Scope;
use crate::jsx::{AttrValue, JsxNode, Listener, Props, Reactive};
use crate::qrl::Qrl;
use crate::reactive::{
    AnySubscriber, Computed, ComputedState, Resource, Signal, Store, SubscriberTarget, Task, TaskBody, TaskId,
    TaskKind, Value,
};
use crate::vnode::{NodeId, VNodeKind, VTree, VirtualRole};

/// A value inline, or a reference into the record arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRef {
    Json(Json),
    Ref(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateRecord {
    Signal {
        value: Json,
    },
    Store {
        value: Json,
        deep: bool,
        /// Child stores that exist as objects of their own.
        children: Vec<(String, u32)>,
    },
    Computed {
        qrl: QrlRecord,
        /// Cached value, when it was clean at serialization time.
        value: Option<Json>,
    },
    Resource {
        state: u32,
        task: Option<u32>,
    },
    Jsx {
        node: JsxRecord,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrlRecord {
    pub chunk: String,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captures: Vec<ValueRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub kind: TaskKind,
    /// Vnode index of the owning component.
    pub host: u32,
    pub qrl: QrlRecord,
    /// State signal record of a resource.
    pub state: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriberRecord {
    Component { node: u32 },
    Task { task: u32 },
    Binding { node: u32, attr: Option<String> },
    Computed { record: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: u32,
    /// Store property, for store sources.
    pub key: Option<String>,
    pub subscribers: Vec<SubscriberRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateBlob {
    pub records: Vec<StateRecord>,
    pub tasks: Vec<TaskRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttrRecord {
    Static { value: Json },
    Bound { record: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerRecord {
    pub scope: Scope,
    pub event: String,
    pub qrl: QrlRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsxRecord {
    Empty,
    Text {
        text: String,
    },
    Signal {
        record: u32,
    },
    Element {
        tag: String,
        key: Option<String>,
        props: Vec<(String, AttrRecord)>,
        consts: Vec<(String, AttrRecord)>,
        listeners: Vec<ListenerRecord>,
        children: Vec<JsxRecord>,
        inner_html: Option<String>,
    },
    Fragment {
        key: Option<String>,
        children: Vec<JsxRecord>,
    },
    Component {
        qrl: QrlRecord,
        key: Option<String>,
        var: Vec<(String, ValueRef)>,
        consts: Vec<(String, ValueRef)>,
        children: Vec<JsxRecord>,
    },
    Slot {
        name: Option<String>,
    },
    Boundary {
        key: Option<String>,
        fallback: QrlRecord,
        children: Vec<JsxRecord>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookRecord {
    Value { value: ValueRef },
    Task { task: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VNodeRecord {
    pub parent: Option<u32>,
    pub kind: VNodeRecordKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VNodeRecordKind {
    Element {
        tag: String,
        key: Option<String>,
        props: Vec<(String, AttrRecord)>,
        consts: Vec<(String, AttrRecord)>,
        listeners: Vec<ListenerRecord>,
        inner_html: Option<String>,
    },
    Text {
        /// Signal or computed record the text is bound to.
        bound: Option<u32>,
        /// Empty text leaves no trace in the HTML and is recreated on resume.
        empty: bool,
    },
    Fragment {
        key: Option<String>,
    },
    Component {
        key: Option<String>,
        qrl: QrlRecord,
        var: Vec<(String, ValueRef)>,
        consts: Vec<(String, ValueRef)>,
        projected: Vec<JsxRecord>,
        hooks: Vec<HookRecord>,
        author: Option<u32>,
    },
    Projection {
        name: Option<String>,
        component: Option<u32>,
    },
    Boundary {
        key: Option<String>,
        fallback: QrlRecord,
        children: Vec<JsxRecord>,
        error: Option<String>,
        author: Option<u32>,
    },
}

/// Something that can be the source of an edge.
enum SourceHandle {
    Signal(Signal<Json>),
    Computed(Computed<Json>),
    Store(Store),
}

/// Writes a container's vnodes and reachable state.
pub(crate) struct StateWriter<'a> {
    tree: &'a VTree,
    tasks: &'a HashMap<TaskId, Task>,
    records: Vec<StateRecord>,
    by_source: HashMap<u64, u32>,
    resources: HashMap<u64, u32>,
    nodes: HashMap<NodeId, u32>,
    task_index: HashMap<TaskId, u32>,
    sources: Vec<(u32, SourceHandle)>,
}

impl<'a> StateWriter<'a> {
    pub(crate) fn new(tree: &'a VTree, tasks: &'a HashMap<TaskId, Task>) -> Self {
        let nodes = tree
            .descendants(tree.root())
            .into_iter()
            .enumerate()
            .map(|(index, id)| (id, index as u32))
            .collect();
        let mut task_index = HashMap::new();
        for component in tree.components() {
            let Some(host) = tree.component(component) else {
                continue;
            };
            for hook in host.state.hooks() {
                if let Hook::Task(id) = hook {
                    if tasks.contains_key(&id) {
                        let next = task_index.len() as u32;
                        task_index.entry(id).or_insert(next);
                    }
                }
            }
        }
        Self {
            tree,
            tasks,
            records: Vec::new(),
            by_source: HashMap::new(),
            resources: HashMap::new(),
            nodes,
            task_index,
            sources: Vec::new(),
        }
    }

    /// Vnode records and the state blob.
    pub(crate) fn write(mut self) -> Result<(Vec<VNodeRecord>, StateBlob)> {
        let order = self.tree.descendants(self.tree.root());
        let mut vnodes = Vec::with_capacity(order.len());
        for id in &order {
            let parent = self.tree.parent(*id).and_then(|p| self.nodes.get(&p).copied());
            let kind = self.vnode_kind(*id)?;
            vnodes.push(VNodeRecord { parent, kind });
        }

        let mut ordered: Vec<(TaskId, u32)> = self.task_index.iter().map(|(id, index)| (*id, *index)).collect();
        ordered.sort_by_key(|(_, index)| *index);
        let mut tasks = Vec::with_capacity(ordered.len());
        for (id, _) in ordered {
            let task = self
                .tasks
                .get(&id)
                .cloned()
                .ok_or_else(|| CoreError::Serialization(format!("task {} vanished", id.raw())))?;
            tasks.push(self.task(&task)?);
        }

        let edges = self.edges();
        Ok((
            vnodes,
            StateBlob {
                records: self.records,
                tasks,
                edges,
            },
        ))
    }

    fn node_index(&self, id: NodeId) -> Result<u32> {
        self.nodes
            .get(&id)
            .copied()
            .ok_or_else(|| CoreError::Serialization(format!("{id:?} is not attached")))
    }

    fn vnode_kind(&mut self, id: NodeId) -> Result<VNodeRecordKind> {
        let tree = self.tree;
        let vnode = tree.node(id)?;
        Ok(match &vnode.kind {
            VNodeKind::Element(data) => VNodeRecordKind::Element {
                tag: data.tag.clone(),
                key: data.key.clone(),
                props: self.attrs(data.props.iter())?,
                consts: self.attrs(data.consts.iter())?,
                listeners: self.listeners(&data.listeners)?,
                inner_html: data.inner_html.clone(),
            },
            VNodeKind::Text(data) => VNodeRecordKind::Text {
                bound: match &data.binding {
                    Some(binding) => Some(self.reactive(binding.source())?),
                    None => None,
                },
                empty: data.text.is_empty(),
            },
            VNodeKind::Virtual(virt) => match &virt.role {
                VirtualRole::Fragment => VNodeRecordKind::Fragment { key: virt.key.clone() },
                VirtualRole::Component(host) => {
                    let mut hooks = Vec::new();
                    for hook in host.state.hooks() {
                        hooks.push(match hook {
                            Hook::Value(value) => HookRecord::Value {
                                value: self.value(&value)?,
                            },
                            Hook::Task(task) => HookRecord::Task {
                                task: self.task_index.get(&task).copied().ok_or_else(|| {
                                    CoreError::Serialization(format!("task {} is not live", task.raw()))
                                })?,
                            },
                        });
                    }
                    let (var, consts) = self.props(&host.props)?;
                    VNodeRecordKind::Component {
                        key: virt.key.clone(),
                        qrl: self.qrl(&host.qrl)?,
                        var,
                        consts,
                        projected: self.jsx_list(&host.projected)?,
                        hooks,
                        author: host.author.map(|a| self.node_index(a)).transpose()?,
                    }
                }
                VirtualRole::Projection { name, component } => VNodeRecordKind::Projection {
                    name: name.clone(),
                    component: component.map(|c| self.node_index(c)).transpose()?,
                },
                VirtualRole::Boundary(host) => VNodeRecordKind::Boundary {
                    key: virt.key.clone(),
                    fallback: self.qrl(&host.fallback)?,
                    children: self.jsx_list(&host.children)?,
                    error: host.error.as_ref().map(CoreError::message),
                    author: host.author.map(|a| self.node_index(a)).transpose()?,
                },
            },
        })
    }

    fn task(&mut self, task: &Task) -> Result<TaskRecord> {
        let host = self.node_index(task.host())?;
        let (qrl, state) = match task.body() {
            TaskBody::Task(qrl) => (self.qrl(qrl)?, None),
            TaskBody::Resource { qrl, state } => (self.qrl(qrl)?, Some(self.signal(state))),
        };
        Ok(TaskRecord {
            kind: task.kind(),
            host,
            qrl,
            state,
        })
    }

    fn push(&mut self, record: StateRecord) -> u32 {
        self.records.push(record);
        (self.records.len() - 1) as u32
    }

    pub(crate) fn value(&mut self, value: &Value) -> Result<ValueRef> {
        Ok(match value {
            Value::Primitive(json) => ValueRef::Json(json.clone()),
            Value::Signal(signal) => ValueRef::Ref(self.signal(signal)),
            Value::Computed(computed) => ValueRef::Ref(self.computed(computed)?),
            Value::Store(store) => ValueRef::Ref(self.store(store)),
            Value::Resource(resource) => ValueRef::Ref(self.resource(resource)),
            Value::Jsx(node) => {
                let node = self.jsx(node)?;
                ValueRef::Ref(self.push(StateRecord::Jsx { node }))
            }
        })
    }

    fn signal(&mut self, signal: &Signal<Json>) -> u32 {
        if let Some(index) = self.by_source.get(&signal.id()) {
            return *index;
        }
        let index = self.push(StateRecord::Signal {
            value: signal.get_untracked(),
        });
        self.by_source.insert(signal.id(), index);
        self.sources.push((index, SourceHandle::Signal(signal.clone())));
        index
    }

    fn computed(&mut self, computed: &Computed<Json>) -> Result<u32> {
        if let Some(index) = self.by_source.get(&computed.id()) {
            return Ok(*index);
        }
        let origin = computed.origin().ok_or_else(|| {
            CoreError::Serialization(format!(
                "computed signal {} has no symbol and cannot be resumed",
                computed.id()
            ))
        })?;
        let qrl = self.qrl(origin)?;
        let value = match computed.state() {
            ComputedState::Clean if computed.has_value() => computed.get_untracked().ok(),
            _ => None,
        };
        let index = self.push(StateRecord::Computed { qrl, value });
        self.by_source.insert(computed.id(), index);
        self.sources.push((index, SourceHandle::Computed(computed.clone())));
        Ok(index)
    }

    fn store(&mut self, store: &Store) -> u32 {
        if let Some(index) = self.by_source.get(&store.id()) {
            return *index;
        }
        let children = store
            .materialized_children()
            .into_iter()
            .map(|(key, child)| (key, self.store(&child)))
            .collect();
        let index = self.push(StateRecord::Store {
            value: store.snapshot(),
            deep: store.is_deep(),
            children,
        });
        self.by_source.insert(store.id(), index);
        self.sources.push((index, SourceHandle::Store(store.clone())));
        index
    }

    fn resource(&mut self, resource: &Resource) -> u32 {
        let signal = resource.state_signal();
        if let Some(index) = self.resources.get(&signal.id()) {
            return *index;
        }
        let state = self.signal(signal);
        let task = self.task_index.get(&resource.task_id()).copied();
        let index = self.push(StateRecord::Resource { state, task });
        self.resources.insert(signal.id(), index);
        index
    }

    fn reactive(&mut self, reactive: &Reactive) -> Result<u32> {
        match reactive {
            Reactive::Signal(signal) => Ok(self.signal(signal)),
            Reactive::Computed(computed) => self.computed(computed),
        }
    }

    fn qrl<F>(&mut self, qrl: &Qrl<F>) -> Result<QrlRecord>
    where
        F: ?Sized + Send + Sync + 'static,
    {
        let captures = qrl
            .captures()
            .iter()
            .map(|value| self.value(value))
            .collect::<Result<_>>()?;
        Ok(QrlRecord {
            chunk: qrl.chunk().to_string(),
            symbol: qrl.symbol().to_string(),
            captures,
        })
    }

    fn props(&mut self, props: &Props) -> Result<(Vec<(String, ValueRef)>, Vec<(String, ValueRef)>)> {
        let mut var = Vec::with_capacity(props.var.len());
        for (name, value) in &props.var {
            var.push((name.clone(), self.value(value)?));
        }
        let mut consts = Vec::with_capacity(props.consts.len());
        for (name, value) in &props.consts {
            consts.push((name.clone(), self.value(value)?));
        }
        Ok((var, consts))
    }

    fn attrs<'v>(&mut self, attrs: impl Iterator<Item = (&'v String, &'v AttrValue)>) -> Result<Vec<(String, AttrRecord)>> {
        let mut out = Vec::new();
        for (name, value) in attrs {
            let record = match value {
                AttrValue::Static(value) => AttrRecord::Static { value: value.clone() },
                AttrValue::Bound(reactive) => AttrRecord::Bound {
                    record: self.reactive(reactive)?,
                },
            };
            out.push((name.clone(), record));
        }
        Ok(out)
    }

    fn listeners(&mut self, listeners: &[Listener]) -> Result<Vec<ListenerRecord>> {
        listeners
            .iter()
            .map(|listener| {
                Ok(ListenerRecord {
                    scope: listener.scope,
                    event: listener.event.clone(),
                    qrl: self.qrl(&listener.handler)?,
                })
            })
            .collect()
    }

    fn jsx_list(&mut self, nodes: &[JsxNode]) -> Result<Vec<JsxRecord>> {
        nodes.iter().map(|node| self.jsx(node)).collect()
    }

    fn jsx(&mut self, node: &JsxNode) -> Result<JsxRecord> {
        Ok(match node {
            JsxNode::Empty => JsxRecord::Empty,
            JsxNode::Text(text) => JsxRecord::Text { text: text.clone() },
            JsxNode::Signal(reactive) => JsxRecord::Signal {
                record: self.reactive(reactive)?,
            },
            JsxNode::Element(element) => JsxRecord::Element {
                tag: element.tag.clone(),
                key: element.key.clone(),
                props: self.attrs(element.props.iter())?,
                consts: self.attrs(element.consts.iter())?,
                listeners: self.listeners(&element.listeners)?,
                children: self.jsx_list(&element.children)?,
                inner_html: element.inner_html.clone(),
            },
            JsxNode::Fragment { key, children } => JsxRecord::Fragment {
                key: key.clone(),
                children: self.jsx_list(children)?,
            },
            JsxNode::Component(component) => {
                let (var, consts) = self.props(&component.props)?;
                JsxRecord::Component {
                    qrl: self.qrl(&component.qrl)?,
                    key: component.key.clone(),
                    var,
                    consts,
                    children: self.jsx_list(&component.children)?,
                }
            }
            JsxNode::Slot { name } => JsxRecord::Slot { name: name.clone() },
            JsxNode::ErrorBoundary(boundary) => JsxRecord::Boundary {
                key: boundary.key.clone(),
                fallback: self.qrl(&boundary.fallback)?,
                children: self.jsx_list(&boundary.children)?,
            },
        })
    }

    fn subscriber(&self, subscriber: &AnySubscriber) -> Option<SubscriberRecord> {
        Some(match subscriber.target()? {
            SubscriberTarget::Component(node) => SubscriberRecord::Component {
                node: *self.nodes.get(&node)?,
            },
            SubscriberTarget::Task(task) => SubscriberRecord::Task {
                task: *self.task_index.get(&task)?,
            },
            SubscriberTarget::Binding { node, attr } => SubscriberRecord::Binding {
                node: *self.nodes.get(&node)?,
                attr: attr.map(|a| a.to_string()),
            },
            SubscriberTarget::Computed(id) => SubscriberRecord::Computed {
                record: *self.by_source.get(&id)?,
            },
            SubscriberTarget::Callback => return None,
        })
    }

    fn edges(&self) -> Vec<EdgeRecord> {
        let mut edges = Vec::new();
        for (index, source) in &self.sources {
            match source {
                SourceHandle::Signal(signal) => {
                    self.push_edge(&mut edges, *index, None, signal.subscribers());
                }
                SourceHandle::Computed(computed) => {
                    self.push_edge(&mut edges, *index, None, computed.subscribers());
                }
                SourceHandle::Store(store) => {
                    let mut by_key: indexmap::IndexMap<String, Vec<AnySubscriber>> = indexmap::IndexMap::new();
                    for (key, subscriber) in store.subscriptions() {
                        by_key.entry(key.to_string()).or_default().push(subscriber);
                    }
                    by_key.sort_keys();
                    for (key, subscribers) in by_key {
                        self.push_edge(&mut edges, *index, Some(key), subscribers);
                    }
                }
            }
        }
        edges
    }

    fn push_edge(&self, edges: &mut Vec<EdgeRecord>, source: u32, key: Option<String>, subscribers: Vec<AnySubscriber>) {
        let subscribers: Vec<SubscriberRecord> = subscribers.iter().filter_map(|s| self.subscriber(s)).collect();
        if !subscribers.is_empty() {
            edges.push(EdgeRecord {
                source,
                key,
                subscribers,
            });
        }
    }
}

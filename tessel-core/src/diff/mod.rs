//! JSX reconciler.
//!
//! A [`Differ`] brings the children of one vnode in line with new JSX. It
//! updates the vnode tree in place, creates detached host nodes for new
//! content, and records every change to attached host nodes in a
//! [`Journal`]. The container applies the journal once the whole diff
//! succeeded.
//!
//! # Algorithm
//!
//! 1. New children are normalized: `Empty` is dropped and adjacent static
//!    text merges into one text node.
//! 2. Old children are indexed by key. Unkeyed old children form a queue in
//!    document order.
//! 3. Each new child takes the old child with the same key, or the next
//!    unkeyed old child. A candidate of a different type (tag, component
//!    symbol, slot name) is removed and the child is created from scratch.
//! 4. Old children that were not taken are removed: their bindings and
//!    render subscriptions are released, their tasks collected for disposal,
//!    and their chores cancelled.
//! 5. When the child list changed, the nearest host element is marked dirty.
//!    [`Differ::finish`] emits one `Arrange` per dirty element.
//!
//! Component children are never rendered inline. A new instance, or one
//! whose variable props changed, gets a `Component` chore.

mod attrs;
mod journal;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value as Json;

use crate::component::ComponentState;
use crate::error::{CoreError, Result};
use crate::host::{Host, HostNode};
use crate::jsx::{json_text, AttrValue, JsxBoundary, JsxComponent, JsxElement, JsxNode, Reactive};
use crate::reactive::TaskId;
use crate::scheduler::{Chore, Scheduler};
use crate::vnode::{
    Binding, BoundaryHost, ComponentHost, ElementData, Namespace, NodeId, TextData, VNode, VNodeKind,
    VTree, VirtualData, VirtualRole,
};

pub use attrs::{normalize, validate, AttrPatch};
pub use journal::{longest_increasing_subsequence, Journal, JournalStats, Op};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffStats {
    pub created: usize,
    pub patched: usize,
    pub removed: usize,
}

/// Everything a diff produced, to be committed by the container.
#[derive(Debug, Default)]
pub struct DiffOutput {
    pub journal: Journal,
    /// Roots of detached subtrees.
    pub removed: Vec<NodeId>,
    /// Every vnode in a removed subtree.
    pub cancelled: HashSet<NodeId>,
    /// Tasks owned by removed component instances, in document order.
    pub disposed: Vec<TaskId>,
    /// Component chores for new or re-propped instances.
    pub scheduled: Vec<Chore>,
    pub stats: DiffStats,
}

#[derive(Debug, Clone, Copy)]
struct DiffCtx {
    /// Namespace of elements created at this level.
    ns: Namespace,
    /// Component whose render produced the JSX being diffed.
    author: Option<NodeId>,
}

pub struct Differ<'a> {
    tree: &'a mut VTree,
    host: &'a dyn Host,
    scheduler: &'a Arc<Scheduler>,
    out: DiffOutput,
    dirty: IndexSet<NodeId>,
}

impl<'a> Differ<'a> {
    pub fn new(tree: &'a mut VTree, host: &'a dyn Host, scheduler: &'a Arc<Scheduler>) -> Self {
        Self {
            tree,
            host,
            scheduler,
            out: DiffOutput::default(),
            dirty: IndexSet::new(),
        }
    }

    /// Diff the children of `parent` against `jsx`, attributing the JSX to
    /// `author`.
    pub fn render_into(&mut self, parent: NodeId, jsx: JsxNode, author: Option<NodeId>) -> Result<()> {
        self.tree.node(parent)?;
        self.preflight(&jsx, author)?;
        let cx = DiffCtx {
            ns: self.tree.child_namespace(parent),
            author,
        };
        self.diff_children(parent, vec![jsx], cx)
    }

    /// Emit child arrangements and hand over the output.
    pub fn finish(mut self) -> DiffOutput {
        for element in std::mem::take(&mut self.dirty) {
            let Some(node) = self.tree.get(element) else {
                continue;
            };
            let (Some(parent), Some(data)) = (node.host, node.as_element()) else {
                continue;
            };
            if data.inner_html.is_some() {
                continue;
            }
            let children = self.tree.host_children(element);
            self.out.journal.push(Op::Arrange { parent, children });
        }
        tracing::debug!(
            created = self.out.stats.created,
            patched = self.out.stats.patched,
            removed = self.out.stats.removed,
            ops = self.out.journal.len(),
            "diff finished"
        );
        self.out
    }

    fn preflight(&self, node: &JsxNode, author: Option<NodeId>) -> Result<()> {
        validate(node)?;
        self.preflight_slots(node, author)
    }

    fn preflight_slots(&self, node: &JsxNode, author: Option<NodeId>) -> Result<()> {
        match node {
            JsxNode::Slot { name } => {
                let Some(host) = author.and_then(|c| self.tree.component(c)) else {
                    return Ok(());
                };
                let outer = host.author;
                host.slot_content(name.as_deref())
                    .iter()
                    .try_for_each(|child| self.preflight(child, outer))
            }
            JsxNode::Element(element) => element
                .children
                .iter()
                .try_for_each(|child| self.preflight_slots(child, author)),
            JsxNode::Fragment { children, .. } => children
                .iter()
                .try_for_each(|child| self.preflight_slots(child, author)),
            JsxNode::Component(component) => component
                .children
                .iter()
                .try_for_each(|child| self.preflight_slots(child, author)),
            JsxNode::ErrorBoundary(boundary) => boundary
                .children
                .iter()
                .try_for_each(|child| self.preflight_slots(child, author)),
            JsxNode::Empty | JsxNode::Text(_) | JsxNode::Signal(_) => Ok(()),
        }
    }

    fn diff_children(&mut self, parent: NodeId, jsx: Vec<JsxNode>, cx: DiffCtx) -> Result<()> {
        let new = normalize_children(jsx);
        let old = self.tree.children(parent).to_vec();

        let mut keyed: IndexMap<String, NodeId> = IndexMap::new();
        let mut unkeyed: VecDeque<NodeId> = VecDeque::new();
        let mut leftovers = Vec::new();
        for id in &old {
            match self.tree.get(*id).and_then(VNode::key) {
                Some(key) => {
                    if let Some(duplicate) = keyed.insert(key.to_string(), *id) {
                        leftovers.push(duplicate);
                    }
                }
                None => unkeyed.push_back(*id),
            }
        }

        let mut next = Vec::with_capacity(new.len());
        for node in new {
            let candidate = match node.key() {
                Some(key) => keyed.shift_remove(key),
                None => unkeyed.pop_front(),
            };
            let id = match candidate {
                Some(old_id) if self.compatible(old_id, &node) => {
                    self.patch(old_id, node, cx)?;
                    old_id
                }
                Some(old_id) => {
                    tracing::trace!(?old_id, "replacing incompatible node");
                    self.remove(old_id);
                    self.create(parent, node, cx)?
                }
                None => self.create(parent, node, cx)?,
            };
            next.push(id);
        }
        leftovers.extend(keyed.into_values());
        leftovers.extend(unkeyed);
        for id in leftovers {
            self.remove(id);
        }

        if next != old {
            self.mark_dirty(parent);
        }
        self.tree.set_children(parent, next);
        Ok(())
    }

    fn mark_dirty(&mut self, id: NodeId) {
        if let Some(element) = self.tree.host_parent(id) {
            self.dirty.insert(element);
        }
    }

    fn compatible(&self, id: NodeId, node: &JsxNode) -> bool {
        let Some(vnode) = self.tree.get(id) else {
            return false;
        };
        match (&vnode.kind, node) {
            (VNodeKind::Element(data), JsxNode::Element(element)) => data.tag == element.tag,
            (VNodeKind::Text(_), JsxNode::Text(_) | JsxNode::Signal(_)) => true,
            (VNodeKind::Virtual(virt), _) => match (&virt.role, node) {
                (VirtualRole::Fragment, JsxNode::Fragment { .. }) => true,
                (VirtualRole::Component(host), JsxNode::Component(component)) => {
                    host.qrl.same_symbol(&component.qrl)
                }
                (VirtualRole::Projection { name, .. }, JsxNode::Slot { name: wanted }) => name == wanted,
                (VirtualRole::Boundary(host), JsxNode::ErrorBoundary(boundary)) => {
                    host.fallback.same_symbol(&boundary.fallback)
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn create(&mut self, parent: NodeId, node: JsxNode, cx: DiffCtx) -> Result<NodeId> {
        self.out.stats.created += 1;
        let id = match node {
            JsxNode::Empty => self.insert_virtual(parent, None, VirtualRole::Fragment),
            JsxNode::Text(text) => {
                let host = self.host.create_text(&text);
                let id = self.tree.insert_with(Some(parent), |_| {
                    VNodeKind::Text(TextData { text, binding: None })
                });
                self.tree.set_host(id, host);
                id
            }
            JsxNode::Signal(reactive) => {
                let id = self
                    .tree
                    .insert_with(Some(parent), |_| VNodeKind::Text(TextData::default()));
                let binding = Binding::new(id, None, reactive, Arc::downgrade(self.scheduler));
                let text = json_text(&binding.evaluate()?);
                let host = self.host.create_text(&text);
                self.tree.set_host(id, host);
                if let VNodeKind::Text(data) = &mut self.tree.node_mut(id)?.kind {
                    data.text = text;
                    data.binding = Some(binding);
                }
                id
            }
            JsxNode::Element(element) => self.create_element(parent, *element, cx)?,
            JsxNode::Fragment { key, children } => {
                let id = self.insert_virtual(parent, key, VirtualRole::Fragment);
                self.diff_children(id, children, cx)?;
                id
            }
            JsxNode::Component(component) => self.create_component(parent, *component, cx),
            JsxNode::Slot { name } => {
                let id = self.insert_virtual(
                    parent,
                    None,
                    VirtualRole::Projection {
                        name,
                        component: cx.author,
                    },
                );
                self.fill_projection(id, cx.ns)?;
                id
            }
            JsxNode::ErrorBoundary(boundary) => {
                let JsxBoundary {
                    key,
                    fallback,
                    children,
                } = *boundary;
                let id = self.insert_virtual(
                    parent,
                    key,
                    VirtualRole::Boundary(BoundaryHost {
                        fallback,
                        children: children.clone(),
                        error: None,
                        author: cx.author,
                    }),
                );
                self.diff_children(id, children, cx)?;
                id
            }
        };
        Ok(id)
    }

    fn insert_virtual(&mut self, parent: NodeId, key: Option<String>, role: VirtualRole) -> NodeId {
        self.tree
            .insert_with(Some(parent), |_| VNodeKind::Virtual(VirtualData { key, role }))
    }

    fn create_element(&mut self, parent: NodeId, element: JsxElement, cx: DiffCtx) -> Result<NodeId> {
        let JsxElement {
            tag,
            key,
            props,
            consts,
            listeners,
            children,
            inner_html,
        } = element;
        let ns = cx.ns.for_element(&tag);
        let host = self.host.create_element(&tag, ns);
        let id = self.tree.insert_with(Some(parent), |_| {
            let mut data = ElementData::new(&tag, ns);
            data.key = key;
            data.listeners = listeners;
            VNodeKind::Element(data)
        });
        self.tree.set_host(id, host);

        for (name, value) in consts.iter().chain(props.iter()) {
            self.apply_attr(id, host, &tag, name, value)?;
        }
        {
            let data = self.element_mut(id)?;
            data.props = props;
            data.consts = consts;
        }
        match inner_html {
            Some(html) => {
                self.out.journal.push(Op::SetInnerHtml {
                    node: host,
                    html: html.clone(),
                });
                self.element_mut(id)?.inner_html = Some(html);
            }
            None => {
                let child_cx = DiffCtx {
                    ns: ns.for_children(&tag),
                    author: cx.author,
                };
                self.diff_children(id, children, child_cx)?;
            }
        }
        Ok(id)
    }

    fn create_component(&mut self, parent: NodeId, component: JsxComponent, cx: DiffCtx) -> NodeId {
        let JsxComponent {
            qrl,
            props,
            key,
            children,
        } = component;
        let symbol = qrl.symbol().to_string();
        let scheduler = Arc::downgrade(self.scheduler);
        let id = self.tree.insert_with(Some(parent), |id| {
            VNodeKind::Virtual(VirtualData {
                key,
                role: VirtualRole::Component(ComponentHost {
                    qrl,
                    props,
                    projected: children,
                    slots: Vec::new(),
                    author: cx.author,
                    state: ComponentState::new(id, &symbol, scheduler),
                }),
            })
        });
        tracing::trace!(?id, %symbol, "component instance created");
        self.out.scheduled.push(Chore::component(id, &symbol));
        id
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData> {
        match &mut self.tree.node_mut(id)?.kind {
            VNodeKind::Element(data) => Ok(data),
            _ => Err(CoreError::UnknownNode(format!("{id:?} is not an element"))),
        }
    }

    /// Record the host update for one attribute and keep its binding.
    fn apply_attr(&mut self, id: NodeId, host: HostNode, tag: &str, name: &str, value: &AttrValue) -> Result<()> {
        let json = match value {
            AttrValue::Static(json) => {
                if let Some(old) = self.element_mut(id)?.bindings.shift_remove(name) {
                    old.release();
                }
                json.clone()
            }
            AttrValue::Bound(reactive) => {
                let binding = Binding::new(id, Some(name), reactive.clone(), Arc::downgrade(self.scheduler));
                let json = binding.evaluate()?;
                if let Some(old) = self.element_mut(id)?.bindings.insert(Arc::from(name), binding) {
                    old.release();
                }
                json
            }
        };
        let patch = normalize(tag, name, &json)?;
        self.out.journal.push(Op::from_patch(host, patch));
        Ok(())
    }

    fn clear_attr(&mut self, id: NodeId, host: HostNode, tag: &str, name: &str) -> Result<()> {
        if let Some(old) = self.element_mut(id)?.bindings.shift_remove(name) {
            old.release();
        }
        let patch = normalize(tag, name, &Json::Null)?;
        self.out.journal.push(Op::from_patch(host, patch));
        Ok(())
    }

    fn patch(&mut self, id: NodeId, node: JsxNode, cx: DiffCtx) -> Result<()> {
        self.out.stats.patched += 1;
        match node {
            JsxNode::Text(text) => self.patch_text(id, None, Some(text)),
            JsxNode::Signal(reactive) => self.patch_text(id, Some(reactive), None),
            JsxNode::Element(element) => self.patch_element(id, *element, cx),
            JsxNode::Fragment { children, .. } => self.diff_children(id, children, cx),
            JsxNode::Component(component) => self.patch_component(id, *component, cx),
            JsxNode::Slot { .. } => self.fill_projection(id, cx.ns),
            JsxNode::ErrorBoundary(boundary) => {
                let JsxBoundary {
                    fallback, children, ..
                } = *boundary;
                let caught = match self.tree.boundary_mut(id) {
                    Some(host) => {
                        host.fallback = fallback;
                        host.children = children.clone();
                        host.author = cx.author;
                        host.error.is_some()
                    }
                    None => return Err(CoreError::UnknownNode(format!("{id:?} is not a boundary"))),
                };
                if caught {
                    Ok(())
                } else {
                    self.diff_children(id, children, cx)
                }
            }
            JsxNode::Empty => Ok(()),
        }
    }

    fn patch_text(&mut self, id: NodeId, reactive: Option<Reactive>, text: Option<String>) -> Result<()> {
        let scheduler = Arc::downgrade(self.scheduler);
        let vnode = self.tree.node_mut(id)?;
        let host = vnode.host;
        let VNodeKind::Text(data) = &mut vnode.kind else {
            return Err(CoreError::UnknownNode(format!("{id:?} is not a text node")));
        };
        let same_source = match (&data.binding, &reactive) {
            (Some(binding), Some(reactive)) => binding.source() == reactive,
            _ => false,
        };
        if same_source {
            return Ok(());
        }
        if let Some(old) = data.binding.take() {
            old.release();
        }
        let text = match (reactive, text) {
            (Some(reactive), _) => {
                let binding = Binding::new(id, None, reactive, scheduler);
                let text = json_text(&binding.evaluate()?);
                data.binding = Some(binding);
                text
            }
            (None, text) => text.unwrap_or_default(),
        };
        if data.text != text {
            data.text = text.clone();
            if let Some(host) = host {
                self.out.journal.push(Op::SetText { node: host, text });
            }
        }
        Ok(())
    }

    fn patch_element(&mut self, id: NodeId, element: JsxElement, cx: DiffCtx) -> Result<()> {
        let JsxElement {
            tag,
            props,
            listeners,
            children,
            inner_html,
            ..
        } = element;
        let (host, ns, old_props, old_html) = {
            let vnode = self.tree.node_mut(id)?;
            let host = vnode.host.ok_or_else(|| CoreError::UnknownNode(format!("{id:?} has no host")))?;
            let VNodeKind::Element(data) = &mut vnode.kind else {
                return Err(CoreError::UnknownNode(format!("{id:?} is not an element")));
            };
            data.listeners = listeners;
            (host, data.ns, std::mem::take(&mut data.props), data.inner_html.clone())
        };

        for (name, value) in &props {
            if old_props.get(name) != Some(value) {
                self.apply_attr(id, host, &tag, name, value)?;
            }
        }
        for name in old_props.keys() {
            if !props.contains_key(name) {
                self.clear_attr(id, host, &tag, name)?;
            }
        }
        self.element_mut(id)?.props = props;

        match (old_html, inner_html) {
            (old, Some(html)) => {
                if old.is_none() {
                    for child in self.tree.children(id).to_vec() {
                        self.remove(child);
                    }
                    self.tree.set_children(id, Vec::new());
                }
                if old.as_deref() != Some(html.as_str()) {
                    self.out.journal.push(Op::SetInnerHtml {
                        node: host,
                        html: html.clone(),
                    });
                }
                self.element_mut(id)?.inner_html = Some(html);
                Ok(())
            }
            (Some(_), None) => {
                self.out.journal.push(Op::SetInnerHtml {
                    node: host,
                    html: String::new(),
                });
                self.element_mut(id)?.inner_html = None;
                let child_cx = DiffCtx {
                    ns: ns.for_children(&tag),
                    author: cx.author,
                };
                self.diff_children(id, children, child_cx)
            }
            (None, None) => {
                let child_cx = DiffCtx {
                    ns: ns.for_children(&tag),
                    author: cx.author,
                };
                self.diff_children(id, children, child_cx)
            }
        }
    }

    fn patch_component(&mut self, id: NodeId, component: JsxComponent, cx: DiffCtx) -> Result<()> {
        let (rerender, reproject, slots, symbol) = {
            let host = self
                .tree
                .component_mut(id)
                .ok_or_else(|| CoreError::UnknownNode(format!("{id:?} is not a component")))?;
            let rerender = host.props.var != component.props.var;
            let reproject = host.projected != component.children;
            host.props.var = component.props.var;
            host.projected = component.children;
            host.author = cx.author;
            (rerender, reproject, host.slots.clone(), host.qrl.symbol().to_string())
        };
        if rerender {
            tracing::trace!(?id, %symbol, "props changed");
            self.out.scheduled.push(Chore::component(id, &symbol));
        }
        if reproject {
            for slot in slots {
                if self.tree.is_attached(slot) {
                    let ns = self.tree.child_namespace(slot);
                    self.fill_projection(slot, ns)?;
                }
            }
        }
        Ok(())
    }

    /// Diff a projection against the projected children of its component.
    fn fill_projection(&mut self, id: NodeId, ns: Namespace) -> Result<()> {
        let (name, component) = match &self.tree.node(id)?.kind {
            VNodeKind::Virtual(VirtualData {
                role: VirtualRole::Projection { name, component },
                ..
            }) => (name.clone(), *component),
            _ => return Err(CoreError::UnknownNode(format!("{id:?} is not a projection"))),
        };
        let (content, author) = match component.and_then(|c| self.tree.component_mut(c)) {
            Some(host) => {
                if !host.slots.contains(&id) {
                    host.slots.push(id);
                }
                (host.slot_content(name.as_deref()), host.author)
            }
            None => (Vec::new(), None),
        };
        self.diff_children(id, content, DiffCtx { ns, author })
    }

    /// Detach the subtree at `id` and release everything it owns.
    fn remove(&mut self, id: NodeId) {
        let mut unlinked_slots = Vec::new();
        for node in self.tree.descendants(id) {
            self.out.cancelled.insert(node);
            let Some(vnode) = self.tree.get(node) else {
                continue;
            };
            match &vnode.kind {
                VNodeKind::Element(data) => {
                    for binding in data.bindings.values() {
                        binding.release();
                    }
                }
                VNodeKind::Text(data) => {
                    if let Some(binding) = &data.binding {
                        binding.release();
                    }
                }
                VNodeKind::Virtual(virt) => match &virt.role {
                    VirtualRole::Component(host) => self.out.disposed.extend(host.state.dispose()),
                    VirtualRole::Projection {
                        component: Some(component),
                        ..
                    } => unlinked_slots.push((*component, node)),
                    _ => {}
                },
            }
        }
        for (component, slot) in unlinked_slots {
            if let Some(host) = self.tree.component_mut(component) {
                host.slots.retain(|s| *s != slot);
            }
        }
        for host in self.tree.host_nodes(id) {
            self.out.journal.push(Op::Remove { node: host });
        }
        self.tree.detach(id);
        self.out.removed.push(id);
        self.out.stats.removed += 1;
    }
}

/// Drop `Empty` and merge adjacent static text.
fn normalize_children(children: Vec<JsxNode>) -> Vec<JsxNode> {
    let mut out: Vec<JsxNode> = Vec::with_capacity(children.len());
    for child in children {
        match child {
            JsxNode::Empty => {}
            JsxNode::Text(text) => match out.last_mut() {
                Some(JsxNode::Text(previous)) => previous.push_str(&text),
                _ => out.push(JsxNode::Text(text)),
            },
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::host::MemoryDocument;
    use crate::jsx::{el, fragment, text};
    use crate::reactive::Signal;
    use serde_json::json;

    struct Fixture {
        doc: MemoryDocument,
        root: HostNode,
        tree: VTree,
        scheduler: Arc<Scheduler>,
    }

    impl Fixture {
        fn new() -> Self {
            let doc = MemoryDocument::new();
            let root = doc.create_element("div", Namespace::Html);
            let tree = VTree::new(root, "div", Namespace::Html);
            Self {
                doc,
                root,
                tree,
                scheduler: Scheduler::new(&ContainerConfig::default()),
            }
        }

        fn render(&mut self, jsx: impl Into<JsxNode>) -> DiffOutput {
            let root = self.tree.root();
            let mut differ = Differ::new(&mut self.tree, &self.doc, &self.scheduler);
            differ.render_into(root, jsx.into(), None).unwrap();
            let out = differ.finish();
            out.journal.apply(&self.doc).unwrap();
            out
        }

        fn html(&self) -> String {
            self.doc.inner_html(self.root)
        }
    }

    fn list(keys: &[&str]) -> JsxNode {
        el("ul")
            .children(keys.iter().map(|k| el("li").key(*k).child(*k)))
            .into()
    }

    #[test]
    fn creates_nested_output() {
        let mut fx = Fixture::new();
        fx.render(el("p").attr("class", "x").child("a").child("b").child(el("b").child("c")));
        assert_eq!(fx.html(), r#"<p class="x">ab<b>c</b></p>"#);
    }

    #[test]
    fn keyed_children_are_moved_not_recreated() {
        let mut fx = Fixture::new();
        fx.render(list(&["a", "b", "c"]));
        let created = fx.doc.creation_count();

        let out = fx.render(list(&["c", "a", "b"]));
        assert_eq!(fx.html(), "<ul><li>c</li><li>a</li><li>b</li></ul>");
        assert_eq!(fx.doc.creation_count(), created);
        assert_eq!(out.stats.removed, 0);
    }

    #[test]
    fn unmatched_keys_are_removed_and_inserted() {
        let mut fx = Fixture::new();
        fx.render(list(&["a", "b"]));
        let out = fx.render(list(&["b", "d"]));
        assert_eq!(fx.html(), "<ul><li>b</li><li>d</li></ul>");
        assert_eq!(out.stats.removed, 1);
        assert_eq!(out.removed.len(), 1);
    }

    #[test]
    fn tag_change_replaces_the_node() {
        let mut fx = Fixture::new();
        fx.render(el("span").child("x"));
        let out = fx.render(el("div").child("x"));
        assert_eq!(fx.html(), "<div>x</div>");
        assert_eq!(out.stats.removed, 1);
    }

    #[test]
    fn unreadable_binding_aborts_before_any_change() {
        let mut fx = Fixture::new();
        fx.render(list(&["a", "b"]));
        let root = fx.tree.root();
        let before = fx.tree.children(root).to_vec();

        let broken = crate::reactive::Computed::<Json>::new(|| Err(CoreError::msg("unbound")));
        let mut differ = Differ::new(&mut fx.tree, &fx.doc, &fx.scheduler);
        assert!(differ.render_into(root, el("p").child(broken).into(), None).is_err());
        let out = differ.finish();

        assert_eq!(out.journal.len(), 0);
        assert!(out.removed.is_empty());
        assert_eq!(fx.tree.children(root), before.as_slice());
        assert_eq!(fx.html(), "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn empty_renders_nothing_and_text_merges() {
        let mut fx = Fixture::new();
        fx.render(fragment(vec![text("a"), JsxNode::Empty, text("b"), JsxNode::from(false)]));
        let root = fx.tree.root();
        let frag = fx.tree.children(root)[0];
        assert_eq!(fx.tree.children(frag).len(), 1);
        assert_eq!(fx.html(), "ab");
    }

    #[test]
    fn attributes_are_patched_and_removed() {
        let mut fx = Fixture::new();
        fx.render(el("a").attr("href", "/x").attr("title", "t"));
        fx.render(el("a").attr("href", "/y"));
        assert_eq!(fx.html(), r#"<a href="/y"></a>"#);
    }

    #[test]
    fn bound_text_tracks_its_signal() {
        let mut fx = Fixture::new();
        let count = Signal::new(json!(1));
        fx.render(el("b").child(count.clone()));
        assert_eq!(fx.html(), "<b>1</b>");
        assert_eq!(count.subscriber_count(), 1);

        count.set(json!(2));
        let pending = fx.scheduler.pending_chores();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind(), crate::scheduler::ChoreKind::Binding);

        // Re-rendering with the same signal keeps the binding.
        fx.render(el("b").child(count.clone()));
        assert_eq!(count.subscriber_count(), 1);
    }

    #[test]
    fn inner_html_is_opaque() {
        let mut fx = Fixture::new();
        fx.render(el("div").child("old"));
        fx.render(el("div").inner_html("<i>raw</i>").child("ignored"));
        assert_eq!(fx.html(), "<div><i>raw</i></div>");
        let root = fx.tree.root();
        let div = fx.tree.children(root)[0];
        assert!(fx.tree.children(div).is_empty());
    }

    #[test]
    fn svg_subtree_switches_namespace() {
        let mut fx = Fixture::new();
        fx.render(el("svg").child(el("circle")).child(el("foreignObject").child(el("p"))));
        let circle = fx.doc.find_by_tag(fx.root, "circle").unwrap();
        let p = fx.doc.find_by_tag(fx.root, "p").unwrap();
        assert_eq!(fx.doc.namespace(circle), Some(Namespace::Svg));
        assert_eq!(fx.doc.namespace(p), Some(Namespace::Html));
    }
}

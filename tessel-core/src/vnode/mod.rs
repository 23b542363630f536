//! The vnode tree.
//!
//! Rendered output is an arena of [`VNode`]s keyed by [`NodeId`]. Element and
//! text vnodes are backed by a host node; virtual vnodes (fragments,
//! component hosts, projections, error boundaries) only group children, and
//! their children's host nodes are placed in the nearest element ancestor.
//!
//! The tree is owned by one container and only mutated from its drain loop.
//! Removed subtrees are detached first, which makes them unreachable from the
//! root (see [`VTree::is_attached`]), and are freed by a later cleanup chore.

mod binding;
mod namespace;
mod node;

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::error::{CoreError, Result};
use crate::host::HostNode;

pub use binding::Binding;
pub use namespace::{attribute_namespace, Namespace, HTML_NS, MATHML_NS, SVG_NS, XLINK_NS, XML_NS};
pub use node::{
    BoundaryHost, ComponentHost, ElementData, TextData, VNode, VNodeKind, VirtualData, VirtualRole,
};

new_key_type! {
    /// Identifies a vnode within its tree.
    pub struct NodeId;
}

#[derive(Debug)]
pub struct VTree {
    nodes: SlotMap<NodeId, VNode>,
    root: NodeId,
    by_host: HashMap<HostNode, NodeId>,
}

impl VTree {
    /// A tree whose root element is backed by `root_host`.
    pub fn new(root_host: HostNode, tag: &str, ns: Namespace) -> Self {
        let mut nodes = SlotMap::with_key();
        let mut root = VNode::new(None, VNodeKind::Element(ElementData::new(tag, ns)));
        root.host = Some(root_host);
        let root = nodes.insert(root);
        let mut by_host = HashMap::new();
        by_host.insert(root_host, root);
        Self { nodes, root, by_host }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&VNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut VNode> {
        self.nodes.get_mut(id)
    }

    pub fn node(&self, id: NodeId) -> Result<&VNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| CoreError::UnknownNode(format!("{id:?}")))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut VNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownNode(format!("{id:?}")))
    }

    /// Insert a detached node whose payload may refer to its own ID.
    pub(crate) fn insert_with(&mut self, parent: Option<NodeId>, kind: impl FnOnce(NodeId) -> VNodeKind) -> NodeId {
        self.nodes
            .insert_with_key(|id| VNode::new(parent, kind(id)))
    }

    pub(crate) fn set_host(&mut self, id: NodeId, host: HostNode) {
        if let Some(node) = self.nodes.get_mut(id) {
            if let Some(old) = node.host.replace(host) {
                self.by_host.remove(&old);
            }
            self.by_host.insert(host, id);
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Replace the child list of `id`, re-parenting every child.
    pub(crate) fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        for child in &children {
            if let Some(node) = self.nodes.get_mut(*child) {
                node.parent = Some(id);
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.children = children;
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.parent
    }

    pub fn find_by_host(&self, host: HostNode) -> Option<NodeId> {
        self.by_host.get(&host).copied()
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes.get(current).and_then(|node| node.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Ancestors of `id`, nearest first, excluding `id`.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// `id` and everything below it, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                out.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Nearest element at or above `id`.
    pub fn host_parent(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|current| self.nodes.get(*current).is_some_and(VNode::is_element))
    }

    /// Top-level host nodes of the subtree at `id`: the node's own host, or
    /// for a virtual node the flattened hosts of its children.
    pub fn host_nodes(&self, id: NodeId) -> Vec<HostNode> {
        let mut out = Vec::new();
        self.collect_hosts(id, &mut out);
        out
    }

    fn collect_hosts(&self, id: NodeId, out: &mut Vec<HostNode>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match node.host {
            Some(host) => out.push(host),
            None => {
                for child in &node.children {
                    self.collect_hosts(*child, out);
                }
            }
        }
    }

    /// Host children an element should have, in order.
    pub fn host_children(&self, element: NodeId) -> Vec<HostNode> {
        let mut out = Vec::new();
        for child in self.children(element) {
            self.collect_hosts(*child, &mut out);
        }
        out
    }

    /// Unlink `id` from its parent.
    pub(crate) fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(id).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|child| *child != id);
        }
    }

    /// Drop the subtree at `id` from the arena. Returns the number of nodes
    /// freed.
    pub(crate) fn free(&mut self, id: NodeId) -> usize {
        self.detach(id);
        let doomed = self.descendants(id);
        for node in &doomed {
            if let Some(node) = self.nodes.remove(*node) {
                if let Some(host) = node.host {
                    self.by_host.remove(&host);
                }
            }
        }
        doomed.len()
    }

    /// Nearest component host at or above `id`.
    pub fn nearest_component(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|current| self.component(*current).is_some())
    }

    /// Nearest error boundary strictly above `id`.
    pub fn nearest_boundary(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id).find(|current| {
            matches!(
                self.nodes.get(*current).map(|node| &node.kind),
                Some(VNodeKind::Virtual(VirtualData {
                    role: VirtualRole::Boundary(_),
                    ..
                }))
            )
        })
    }

    /// Namespace of elements created as children of `id`.
    pub fn child_namespace(&self, id: NodeId) -> Namespace {
        self.host_parent(id)
            .and_then(|element| self.nodes.get(element))
            .and_then(VNode::as_element)
            .map(|element| element.ns.for_children(&element.tag))
            .unwrap_or_default()
    }

    pub fn component(&self, id: NodeId) -> Option<&ComponentHost> {
        self.nodes.get(id)?.as_component()
    }

    pub fn component_mut(&mut self, id: NodeId) -> Option<&mut ComponentHost> {
        match &mut self.nodes.get_mut(id)?.kind {
            VNodeKind::Virtual(VirtualData {
                role: VirtualRole::Component(host),
                ..
            }) => Some(host),
            _ => None,
        }
    }

    pub fn boundary_mut(&mut self, id: NodeId) -> Option<&mut BoundaryHost> {
        match &mut self.nodes.get_mut(id)?.kind {
            VNodeKind::Virtual(VirtualData {
                role: VirtualRole::Boundary(host),
                ..
            }) => Some(host),
            _ => None,
        }
    }

    /// Every live component host, in document order.
    pub fn components(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.component(*id).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_ids(n: usize) -> Vec<HostNode> {
        let mut arena: SlotMap<HostNode, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    fn element(tree: &mut VTree, parent: NodeId, tag: &str, host: HostNode) -> NodeId {
        let id = tree.insert_with(Some(parent), |_| {
            VNodeKind::Element(ElementData::new(tag, Namespace::Html))
        });
        tree.set_host(id, host);
        id
    }

    fn fragment(tree: &mut VTree, parent: NodeId) -> NodeId {
        tree.insert_with(Some(parent), |_| {
            VNodeKind::Virtual(VirtualData {
                key: None,
                role: VirtualRole::Fragment,
            })
        })
    }

    #[test]
    fn virtual_children_flatten_into_the_host_parent() {
        let hosts = host_ids(4);
        let mut tree = VTree::new(hosts[0], "div", Namespace::Html);
        let root = tree.root();
        let a = element(&mut tree, root, "a", hosts[1]);
        let frag = fragment(&mut tree, root);
        let b = element(&mut tree, frag, "b", hosts[2]);
        let c = element(&mut tree, root, "c", hosts[3]);
        tree.set_children(frag, vec![b]);
        tree.set_children(root, vec![a, frag, c]);

        assert_eq!(tree.host_children(root), vec![hosts[1], hosts[2], hosts[3]]);
        assert_eq!(tree.host_nodes(frag), vec![hosts[2]]);
        assert_eq!(tree.host_parent(b), Some(b));
        assert_eq!(tree.host_parent(frag), Some(root));
        assert_eq!(tree.descendants(root), vec![root, a, frag, b, c]);
    }

    #[test]
    fn detached_subtrees_are_not_attached_and_free_cleanly() {
        let hosts = host_ids(3);
        let mut tree = VTree::new(hosts[0], "div", Namespace::Html);
        let root = tree.root();
        let frag = fragment(&mut tree, root);
        let inner = element(&mut tree, frag, "p", hosts[1]);
        tree.set_children(frag, vec![inner]);
        tree.set_children(root, vec![frag]);
        assert!(tree.is_attached(inner));

        tree.detach(frag);
        assert!(!tree.is_attached(inner));
        assert!(tree.children(root).is_empty());

        assert_eq!(tree.free(frag), 2);
        assert!(tree.find_by_host(hosts[1]).is_none());
        assert!(tree.get(inner).is_none());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn child_namespace_follows_the_nearest_element() {
        let hosts = host_ids(3);
        let mut tree = VTree::new(hosts[0], "div", Namespace::Html);
        let root = tree.root();
        let svg = tree.insert_with(Some(root), |_| {
            VNodeKind::Element(ElementData::new("svg", Namespace::Svg))
        });
        let frag = fragment(&mut tree, svg);
        let foreign = tree.insert_with(Some(frag), |_| {
            VNodeKind::Element(ElementData::new("foreignObject", Namespace::Svg))
        });
        assert_eq!(tree.child_namespace(root), Namespace::Html);
        assert_eq!(tree.child_namespace(frag), Namespace::Svg);
        assert_eq!(tree.child_namespace(foreign), Namespace::Html);
    }
}

//! The host document abstraction.
//!
//! The reconciler never touches a concrete DOM. It talks to a [`Host`]:
//! create nodes, set attributes and properties, move nodes around. Host
//! nodes are opaque [`HostNode`] keys handed out by the implementation.
//!
//! [`MemoryDocument`] is the in-process implementation used for server
//! rendering and tests.

mod memory;

use serde_json::Value as Json;
use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::error::Result;
use crate::vnode::Namespace;

pub use memory::MemoryDocument;
pub(crate) use memory::{is_void, write_attribute};

new_key_type! {
    /// A node owned by a [`Host`].
    pub struct HostNode;
}

/// Child list of a host node. Most elements have only a few children.
pub type HostChildren = SmallVec<[HostNode; 8]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostNodeKind {
    Element { tag: String, ns: Namespace },
    Text,
    Comment,
}

/// A document the reconciler can mutate.
pub trait Host: Send + Sync {
    fn create_element(&self, tag: &str, ns: Namespace) -> HostNode;

    fn create_text(&self, text: &str) -> HostNode;

    fn set_text(&self, node: HostNode, text: &str) -> Result<()>;

    /// Text of a text node.
    fn text(&self, node: HostNode) -> Option<String>;

    /// Set an attribute, optionally in the namespace `ns`.
    fn set_attribute(&self, node: HostNode, name: &str, value: &str, ns: Option<&str>) -> Result<()>;

    fn remove_attribute(&self, node: HostNode, name: &str) -> Result<()>;

    fn attribute(&self, node: HostNode, name: &str) -> Option<String>;

    /// Attributes in insertion order.
    fn attributes(&self, node: HostNode) -> Vec<(String, String)>;

    /// Set a live property such as `value` or `checked`.
    fn set_property(&self, node: HostNode, name: &str, value: &Json) -> Result<()>;

    fn property(&self, node: HostNode, name: &str) -> Option<Json>;

    /// Insert `child` under `parent` before `before`, or at the end. A child
    /// that already has a parent is moved.
    fn insert_before(&self, parent: HostNode, child: HostNode, before: Option<HostNode>) -> Result<()>;

    /// Detach `node` from its parent.
    fn remove(&self, node: HostNode) -> Result<()>;

    /// Replace the children of `node` with parsed markup.
    fn set_inner_html(&self, node: HostNode, html: &str) -> Result<()>;

    fn children(&self, node: HostNode) -> HostChildren;

    fn parent(&self, node: HostNode) -> Option<HostNode>;

    fn kind(&self, node: HostNode) -> Option<HostNodeKind>;
}

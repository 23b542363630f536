//! VNode payloads.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::component::ComponentState;
use crate::error::CoreError;
use crate::host::HostNode;
use crate::jsx::{AttrValue, JsxNode, Listener, Props};
use crate::qrl::{ComponentFn, FallbackFn, Qrl};

use super::binding::Binding;
use super::namespace::Namespace;
use super::NodeId;

/// A node of the rendered tree.
#[derive(Debug)]
pub struct VNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Backing host node. Virtual nodes have none.
    pub host: Option<HostNode>,
    pub kind: VNodeKind,
}

impl VNode {
    pub(crate) fn new(parent: Option<NodeId>, kind: VNodeKind) -> Self {
        Self {
            parent,
            children: Vec::new(),
            host: None,
            kind,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match &self.kind {
            VNodeKind::Element(element) => element.key.as_deref(),
            VNodeKind::Virtual(virt) => virt.key.as_deref(),
            VNodeKind::Text(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.kind {
            VNodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextData> {
        match &self.kind {
            VNodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentHost> {
        match &self.kind {
            VNodeKind::Virtual(VirtualData {
                role: VirtualRole::Component(host),
                ..
            }) => Some(host),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, VNodeKind::Element(_))
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, VNodeKind::Virtual(_))
    }
}

#[derive(Debug)]
pub enum VNodeKind {
    Element(ElementData),
    Text(TextData),
    Virtual(VirtualData),
}

#[derive(Debug)]
pub struct ElementData {
    pub tag: String,
    pub ns: Namespace,
    pub key: Option<String>,
    pub props: IndexMap<String, AttrValue>,
    pub consts: IndexMap<String, AttrValue>,
    pub listeners: Vec<Listener>,
    /// Live attribute bindings by attribute name.
    pub bindings: IndexMap<Arc<str>, Arc<Binding>>,
    /// Set when the children are opaque markup.
    pub inner_html: Option<String>,
}

impl ElementData {
    pub fn new(tag: &str, ns: Namespace) -> Self {
        Self {
            tag: tag.to_string(),
            ns,
            key: None,
            props: IndexMap::new(),
            consts: IndexMap::new(),
            listeners: Vec::new(),
            bindings: IndexMap::new(),
            inner_html: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct TextData {
    pub text: String,
    pub binding: Option<Arc<Binding>>,
}

#[derive(Debug)]
pub struct VirtualData {
    pub key: Option<String>,
    pub role: VirtualRole,
}

#[derive(Debug)]
pub enum VirtualRole {
    Fragment,
    Component(ComponentHost),
    /// Where a component displays projected content.
    Projection {
        name: Option<String>,
        /// The component whose projected children are shown here.
        component: Option<NodeId>,
    },
    Boundary(BoundaryHost),
}

/// Per-instance data of a component host.
#[derive(Debug)]
pub struct ComponentHost {
    pub qrl: Qrl<ComponentFn>,
    pub props: Props,
    /// Children passed by the authoring component.
    pub projected: Vec<JsxNode>,
    /// Projection nodes currently showing `projected`.
    pub slots: Vec<NodeId>,
    /// Component whose render produced this instance. Projected content is
    /// owned by it.
    pub author: Option<NodeId>,
    pub state: Arc<ComponentState>,
}

impl ComponentHost {
    /// Projected children that belong in the slot called `name`.
    pub fn slot_content(&self, name: Option<&str>) -> Vec<JsxNode> {
        self.projected
            .iter()
            .filter(|child| child.slot_name().as_deref() == name)
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
pub struct BoundaryHost {
    pub fallback: Qrl<FallbackFn>,
    /// Content shown while no error is caught.
    pub children: Vec<JsxNode>,
    pub error: Option<CoreError>,
    pub author: Option<NodeId>,
}

//! An in-memory document.
//!
//! Nodes live in a slot map behind one lock. The document can serialize any
//! subtree to HTML and parse HTML back into nodes, which is all a server
//! render and a resume round trip need.

use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value as Json;
use slotmap::SlotMap;

use crate::error::{CoreError, Result};
use crate::vnode::Namespace;

use super::{Host, HostChildren, HostNode, HostNodeKind};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is not parsed as markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub(crate) fn is_raw_text(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

#[derive(Debug)]
struct ElementData {
    tag: String,
    ns: Namespace,
    attrs: IndexMap<String, String>,
    props: IndexMap<String, Json>,
    children: Vec<HostNode>,
}

#[derive(Debug)]
enum NodeData {
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct MemNode {
    parent: Option<HostNode>,
    data: NodeData,
}

/// A [`Host`] backed by plain Rust data.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    nodes: Mutex<SlotMap<HostNode, MemNode>>,
    created: AtomicUsize,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes created through [`Host::create_element`] and
    /// [`Host::create_text`]. Parsed markup does not count.
    pub fn creation_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn namespace(&self, node: HostNode) -> Option<Namespace> {
        match &self.nodes.lock().get(node)?.data {
            NodeData::Element(element) => Some(element.ns),
            _ => None,
        }
    }

    /// Outer HTML of `node`.
    pub fn to_html(&self, node: HostNode) -> String {
        let nodes = self.nodes.lock();
        let mut out = String::new();
        write_node(&nodes, node, &mut out);
        out
    }

    /// HTML of the children of `node`.
    pub fn inner_html(&self, node: HostNode) -> String {
        let nodes = self.nodes.lock();
        let mut out = String::new();
        if let Some(MemNode {
            data: NodeData::Element(element),
            ..
        }) = nodes.get(node)
        {
            write_children(&nodes, element, &mut out);
        }
        out
    }

    /// Concatenated text of every text node under `node`.
    pub fn text_content(&self, node: HostNode) -> String {
        let nodes = self.nodes.lock();
        let mut out = String::new();
        collect_text(&nodes, node, &mut out);
        out
    }

    /// First element with tag `tag` under `root`, in document order. `root`
    /// itself is included.
    pub fn find_by_tag(&self, root: HostNode, tag: &str) -> Option<HostNode> {
        self.find_all(root, tag).into_iter().next()
    }

    /// Every element with tag `tag` under `root`, in document order.
    pub fn find_all(&self, root: HostNode, tag: &str) -> Vec<HostNode> {
        self.find(root, |element| element.tag == tag)
    }

    /// First element under `root` whose attribute `name` equals `value`.
    pub fn find_by_attr(&self, root: HostNode, name: &str, value: &str) -> Option<HostNode> {
        self.find(root, |element| element.attrs.get(name).is_some_and(|v| v == value))
            .into_iter()
            .next()
    }

    fn find(&self, root: HostNode, matches: impl Fn(&ElementData) -> bool) -> Vec<HostNode> {
        let nodes = self.nodes.lock();
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(MemNode {
                data: NodeData::Element(element),
                ..
            }) = nodes.get(id)
            {
                if matches(element) {
                    found.push(id);
                }
                stack.extend(element.children.iter().rev().copied());
            }
        }
        found
    }

    /// Parse `html` and append the resulting nodes to `parent`.
    pub fn append_html(&self, parent: HostNode, html: &str) -> Result<Vec<HostNode>> {
        let ns = match self.kind(parent) {
            Some(HostNodeKind::Element { tag, ns }) => ns.for_children(&tag),
            Some(_) => return Err(CoreError::msg("markup can only be appended to an element")),
            None => return Err(CoreError::UnknownNode(format!("{parent:?}"))),
        };
        let mut nodes = self.nodes.lock();
        let mut parser = Parser {
            input: html,
            pos: 0,
            nodes: &mut nodes,
        };
        parser.parse_into(parent, ns, None)
    }

    fn with_element<T>(&self, node: HostNode, f: impl FnOnce(&mut ElementData) -> T) -> Result<T> {
        let mut nodes = self.nodes.lock();
        match nodes.get_mut(node) {
            Some(MemNode {
                data: NodeData::Element(element),
                ..
            }) => Ok(f(element)),
            Some(_) => Err(CoreError::msg(format!("{node:?} is not an element"))),
            None => Err(CoreError::UnknownNode(format!("{node:?}"))),
        }
    }
}

impl Host for MemoryDocument {
    fn create_element(&self, tag: &str, ns: Namespace) -> HostNode {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.nodes.lock().insert(MemNode {
            parent: None,
            data: NodeData::Element(ElementData {
                tag: tag.to_string(),
                ns,
                attrs: IndexMap::new(),
                props: IndexMap::new(),
                children: Vec::new(),
            }),
        })
    }

    fn create_text(&self, text: &str) -> HostNode {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.nodes.lock().insert(MemNode {
            parent: None,
            data: NodeData::Text(text.to_string()),
        })
    }

    fn set_text(&self, node: HostNode, text: &str) -> Result<()> {
        let mut nodes = self.nodes.lock();
        match nodes.get_mut(node) {
            Some(MemNode {
                data: NodeData::Text(current),
                ..
            }) => {
                *current = text.to_string();
                Ok(())
            }
            Some(_) => Err(CoreError::msg(format!("{node:?} is not a text node"))),
            None => Err(CoreError::UnknownNode(format!("{node:?}"))),
        }
    }

    fn text(&self, node: HostNode) -> Option<String> {
        match &self.nodes.lock().get(node)?.data {
            NodeData::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    fn set_attribute(&self, node: HostNode, name: &str, value: &str, _ns: Option<&str>) -> Result<()> {
        self.with_element(node, |element| {
            element.attrs.insert(name.to_string(), value.to_string());
        })
    }

    fn remove_attribute(&self, node: HostNode, name: &str) -> Result<()> {
        self.with_element(node, |element| {
            element.attrs.shift_remove(name);
        })
    }

    fn attribute(&self, node: HostNode, name: &str) -> Option<String> {
        match &self.nodes.lock().get(node)?.data {
            NodeData::Element(element) => element.attrs.get(name).cloned(),
            _ => None,
        }
    }

    fn attributes(&self, node: HostNode) -> Vec<(String, String)> {
        match self.nodes.lock().get(node).map(|n| &n.data) {
            Some(NodeData::Element(element)) => element
                .attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn set_property(&self, node: HostNode, name: &str, value: &Json) -> Result<()> {
        self.with_element(node, |element| {
            element.props.insert(name.to_string(), value.clone());
        })
    }

    fn property(&self, node: HostNode, name: &str) -> Option<Json> {
        match &self.nodes.lock().get(node)?.data {
            NodeData::Element(element) => element.props.get(name).cloned(),
            _ => None,
        }
    }

    fn insert_before(&self, parent: HostNode, child: HostNode, before: Option<HostNode>) -> Result<()> {
        if parent == child {
            return Err(CoreError::msg("a node cannot be inserted into itself"));
        }
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(child) {
            return Err(CoreError::UnknownNode(format!("{child:?}")));
        }
        detach(&mut nodes, child);
        let Some(MemNode {
            data: NodeData::Element(element),
            ..
        }) = nodes.get_mut(parent)
        else {
            return Err(CoreError::UnknownNode(format!("{parent:?}")));
        };
        let index = match before {
            Some(anchor) => element
                .children
                .iter()
                .position(|c| *c == anchor)
                .ok_or_else(|| CoreError::msg(format!("{anchor:?} is not a child of {parent:?}")))?,
            None => element.children.len(),
        };
        element.children.insert(index, child);
        if let Some(node) = nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    fn remove(&self, node: HostNode) -> Result<()> {
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(node) {
            return Err(CoreError::UnknownNode(format!("{node:?}")));
        }
        detach(&mut nodes, node);
        Ok(())
    }

    fn set_inner_html(&self, node: HostNode, html: &str) -> Result<()> {
        let old = self.with_element(node, |element| std::mem::take(&mut element.children))?;
        {
            let mut nodes = self.nodes.lock();
            for child in old {
                if let Some(child) = nodes.get_mut(child) {
                    child.parent = None;
                }
            }
        }
        self.append_html(node, html).map(|_| ())
    }

    fn children(&self, node: HostNode) -> HostChildren {
        match self.nodes.lock().get(node).map(|n| &n.data) {
            Some(NodeData::Element(element)) => element.children.iter().copied().collect(),
            _ => HostChildren::new(),
        }
    }

    fn parent(&self, node: HostNode) -> Option<HostNode> {
        self.nodes.lock().get(node)?.parent
    }

    fn kind(&self, node: HostNode) -> Option<HostNodeKind> {
        Some(match &self.nodes.lock().get(node)?.data {
            NodeData::Element(element) => HostNodeKind::Element {
                tag: element.tag.clone(),
                ns: element.ns,
            },
            NodeData::Text(_) => HostNodeKind::Text,
            NodeData::Comment(_) => HostNodeKind::Comment,
        })
    }
}

fn detach(nodes: &mut SlotMap<HostNode, MemNode>, node: HostNode) {
    let Some(parent) = nodes.get_mut(node).and_then(|n| n.parent.take()) else {
        return;
    };
    if let Some(MemNode {
        data: NodeData::Element(element),
        ..
    }) = nodes.get_mut(parent)
    {
        element.children.retain(|c| *c != node);
    }
}

fn write_node(nodes: &SlotMap<HostNode, MemNode>, id: HostNode, out: &mut String) {
    let Some(node) = nodes.get(id) else {
        return;
    };
    match &node.data {
        NodeData::Text(text) => {
            let raw = node.parent.and_then(|p| nodes.get(p)).is_some_and(|p| match &p.data {
                NodeData::Element(parent) => parent.tag == "script" || parent.tag == "style",
                _ => false,
            });
            if raw {
                out.push_str(text);
            } else {
                out.push_str(&html_escape::encode_text(text));
            }
        }
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeData::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attrs {
                write_attribute(name, value, out);
            }
            out.push('>');
            if is_void(&element.tag) {
                return;
            }
            write_children(nodes, element, out);
            out.push_str("</");
            out.push_str(&element.tag);
            out.push('>');
        }
    }
}

fn write_children(nodes: &SlotMap<HostNode, MemNode>, element: &ElementData, out: &mut String) {
    for child in &element.children {
        write_node(nodes, *child, out);
    }
}

/// Writes ` name="value"`, or a bare ` name` for an empty value.
pub(crate) fn write_attribute(name: &str, value: &str, out: &mut String) {
    out.push(' ');
    out.push_str(name);
    if !value.is_empty() {
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(value));
        out.push('"');
    }
}

fn collect_text(nodes: &SlotMap<HostNode, MemNode>, id: HostNode, out: &mut String) {
    match nodes.get(id).map(|n| &n.data) {
        Some(NodeData::Text(text)) => out.push_str(text),
        Some(NodeData::Element(element)) => {
            for child in &element.children {
                collect_text(nodes, *child, out);
            }
        }
        _ => {}
    }
}

/// Parser for the markup this crate emits: elements, quoted or bare
/// attributes, text and comments. Comments are skipped but still split
/// adjacent text.
struct Parser<'a, 'n> {
    input: &'a str,
    pos: usize,
    nodes: &'n mut SlotMap<HostNode, MemNode>,
}

impl<'a> Parser<'a, '_> {
    fn rest(&self) -> &'a str {
        let input: &'a str = self.input;
        &input[self.pos..]
    }

    fn parse_into(&mut self, parent: HostNode, ns: Namespace, closing: Option<&str>) -> Result<Vec<HostNode>> {
        let mut created = Vec::new();
        let mut text = String::new();
        while self.pos < self.input.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.flush_text(parent, &mut text, &mut created);
                let end = rest[4..]
                    .find("-->")
                    .ok_or_else(|| CoreError::msg("unterminated comment"))?;
                self.pos += 4 + end + 3;
            } else if rest.starts_with("</") {
                self.flush_text(parent, &mut text, &mut created);
                let end = rest.find('>').ok_or_else(|| CoreError::msg("unterminated closing tag"))?;
                let tag = rest[2..end].trim().to_string();
                self.pos += end + 1;
                match closing {
                    Some(expected) if expected == tag => return Ok(created),
                    _ => return Err(CoreError::msg(format!("unexpected closing tag `</{tag}>`"))),
                }
            } else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.flush_text(parent, &mut text, &mut created);
                let node = self.parse_element(parent, ns)?;
                created.push(node);
            } else {
                let first = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                let end = rest[first..].find('<').map(|i| i + first).unwrap_or(rest.len());
                text.push_str(&html_escape::decode_html_entities(&rest[..end]));
                self.pos += end;
            }
        }
        self.flush_text(parent, &mut text, &mut created);
        match closing {
            Some(tag) => Err(CoreError::msg(format!("missing `</{tag}>`"))),
            None => Ok(created),
        }
    }

    fn flush_text(&mut self, parent: HostNode, text: &mut String, created: &mut Vec<HostNode>) {
        if text.is_empty() {
            return;
        }
        let node = self.insert(parent, NodeData::Text(std::mem::take(text)));
        created.push(node);
    }

    fn insert(&mut self, parent: HostNode, data: NodeData) -> HostNode {
        let node = self.nodes.insert(MemNode {
            parent: Some(parent),
            data,
        });
        if let Some(MemNode {
            data: NodeData::Element(element),
            ..
        }) = self.nodes.get_mut(parent)
        {
            element.children.push(node);
        }
        node
    }

    fn parse_element(&mut self, parent: HostNode, ns: Namespace) -> Result<HostNode> {
        self.pos += 1;
        let tag = self.take_while(|c| !c.is_whitespace() && c != '>' && c != '/');
        let element_ns = ns.for_element(&tag);
        let mut attrs = IndexMap::new();
        let self_closing = loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("/>") {
                self.pos += 2;
                break true;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break false;
            }
            if rest.is_empty() {
                return Err(CoreError::msg(format!("unterminated tag `<{tag}`")));
            }
            let name = self.take_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/');
            if name.is_empty() {
                return Err(CoreError::msg(format!("malformed attribute in `<{tag}>`")));
            }
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.attribute_value()?
            } else {
                String::new()
            };
            attrs.insert(name, value);
        };

        let node = self.insert(
            parent,
            NodeData::Element(ElementData {
                tag: tag.clone(),
                ns: element_ns,
                attrs,
                props: IndexMap::new(),
                children: Vec::new(),
            }),
        );
        if self_closing || is_void(&tag) {
            return Ok(node);
        }
        if is_raw_text(&tag) {
            let close = format!("</{tag}>");
            let end = self
                .rest()
                .find(&close)
                .ok_or_else(|| CoreError::msg(format!("missing `{close}`")))?;
            let raw = &self.input[self.pos..self.pos + end];
            if !raw.is_empty() {
                let content = if tag == "script" || tag == "style" {
                    raw.to_string()
                } else {
                    html_escape::decode_html_entities(raw).into_owned()
                };
                self.insert(node, NodeData::Text(content));
            }
            self.pos += end + close.len();
            return Ok(node);
        }
        self.parse_into(node, element_ns.for_children(&tag), Some(&tag))?;
        Ok(node)
    }

    fn attribute_value(&mut self) -> Result<String> {
        let rest = self.rest();
        let quote = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                let raw = self.take_while(|c| !c.is_whitespace() && c != '>');
                return Ok(html_escape::decode_html_entities(&raw).into_owned());
            }
        };
        let end = rest[1..]
            .find(quote)
            .ok_or_else(|| CoreError::msg("unterminated attribute value"))?;
        let raw = &rest[1..1 + end];
        let value = html_escape::decode_html_entities(raw).into_owned();
        self.pos += end + 2;
        Ok(value)
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let rest = self.rest();
        let end = rest.find(|c: char| !keep(c)).unwrap_or(rest.len());
        let taken = rest[..end].to_string();
        self.pos += end;
        taken
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }
}

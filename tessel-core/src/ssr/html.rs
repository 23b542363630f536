//! HTML output for a server-rendered tree.
//!
//! The markup is written from the vnode tree rather than the document so it
//! can carry what a resume needs to line host nodes up with vnodes again:
//!
//! - `<!---->` between adjacent text vnodes, which a parser would otherwise
//!   merge into one text node,
//! - optional `<!--v-->` / `<!--/v-->` around virtual nodes,
//! - live form properties (`value`, `checked`, `selected`) as attributes,
//! - listeners as `on:<event>="chunk#symbol"` attributes.

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::host::{is_void, write_attribute, Host};
use crate::jsx::json_text;
use crate::vnode::{ElementData, NodeId, VNodeKind, VTree};

pub(crate) struct HtmlWriter<'a> {
    tree: &'a VTree,
    host: &'a dyn Host,
    markers: bool,
    out: String,
}

impl<'a> HtmlWriter<'a> {
    pub(crate) fn new(tree: &'a VTree, host: &'a dyn Host, markers: bool) -> Self {
        Self {
            tree,
            host,
            markers,
            out: String::new(),
        }
    }

    /// Markup of everything below the root element.
    pub(crate) fn write(mut self) -> String {
        let mut after_text = false;
        for child in self.tree.children(self.tree.root()) {
            self.node(*child, false, &mut after_text);
        }
        self.out
    }

    fn node(&mut self, id: NodeId, raw: bool, after_text: &mut bool) {
        let tree = self.tree;
        let Some(vnode) = tree.get(id) else {
            return;
        };
        match &vnode.kind {
            VNodeKind::Text(data) => {
                if *after_text {
                    self.out.push_str("<!---->");
                }
                if raw {
                    self.out.push_str(&data.text);
                } else {
                    self.out.push_str(&html_escape::encode_text(&data.text));
                }
                *after_text = true;
            }
            VNodeKind::Element(data) => {
                if let Some(host) = vnode.host {
                    self.element(host, data, &vnode.children);
                }
                *after_text = false;
            }
            VNodeKind::Virtual(_) => {
                if self.markers {
                    self.out.push_str("<!--v-->");
                    *after_text = false;
                }
                for child in &vnode.children {
                    self.node(*child, raw, after_text);
                }
                if self.markers {
                    self.out.push_str("<!--/v-->");
                    *after_text = false;
                }
            }
        }
    }

    fn element(&mut self, host: crate::host::HostNode, data: &ElementData, children: &[NodeId]) {
        let tag = data.tag.as_str();
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in self.host.attributes(host) {
            write_attribute(&name, &value, &mut self.out);
        }
        for flag in ["checked", "selected"] {
            if self.host.property(host, flag) == Some(Json::Bool(true)) {
                write_attribute(flag, "", &mut self.out);
            }
        }
        let value = self.host.property(host, "value").filter(|v| !v.is_null());
        if tag != "textarea" {
            if let Some(value) = &value {
                write_attribute("value", &json_text(value), &mut self.out);
            }
        }

        let mut listeners: IndexMap<String, Vec<String>> = IndexMap::new();
        for listener in &data.listeners {
            listeners
                .entry(format!("{}{}", listener.scope.prefix(), listener.event))
                .or_default()
                .push(listener.handler.key());
        }
        for (name, symbols) in listeners {
            write_attribute(&name, &symbols.join(" "), &mut self.out);
        }
        self.out.push('>');
        if is_void(tag) {
            return;
        }

        if let Some(html) = &data.inner_html {
            self.out.push_str(html);
        } else if tag == "textarea" {
            if let Some(Json::String(text)) = &value {
                self.out.push_str(&html_escape::encode_text(text));
            }
        } else {
            let raw = tag == "script" || tag == "style";
            let mut after_text = false;
            for child in children {
                self.node(*child, raw, &mut after_text);
            }
        }
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }
}

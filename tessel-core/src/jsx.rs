//! JSX node values.
//!
//! Component render functions return a [`JsxNode`] tree. Nodes are plain
//! data: reactive values appear as [`Reactive`] bindings, components and
//! event handlers as [`Qrl`] handles, so a tree can be diffed, kept as
//! projected slot content, or serialized.
//!
//! ```rust
//! use serde_json::json;
//! use tessel_core::jsx::{el, JsxNode};
//! use tessel_core::reactive::Signal;
//!
//! let label = Signal::new(json!("Save"));
//! let node: JsxNode = el("button")
//!     .attr("class", json!(["btn", "primary"]))
//!     .attr("disabled", false)
//!     .child(label)
//!     .into();
//! assert_eq!(node.key(), None);
//! ```

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::error::Result;
use crate::events::Scope;
use crate::qrl::{ComponentFn, FallbackFn, HandlerFn, Qrl};
use crate::reactive::{Computed, Signal, Value};

/// A reactive value bound into the output.
#[derive(Debug, Clone, PartialEq)]
pub enum Reactive {
    Signal(Signal<Json>),
    Computed(Computed<Json>),
}

impl Reactive {
    /// Tracked read.
    pub fn read(&self) -> Result<Json> {
        match self {
            Reactive::Signal(signal) => Ok(signal.get()),
            Reactive::Computed(computed) => computed.get(),
        }
    }

    pub fn source_id(&self) -> u64 {
        match self {
            Reactive::Signal(signal) => signal.id(),
            Reactive::Computed(computed) => computed.id(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Reactive::Signal(signal) => Value::Signal(signal.clone()),
            Reactive::Computed(computed) => Value::Computed(computed.clone()),
        }
    }
}

impl From<Signal<Json>> for Reactive {
    fn from(signal: Signal<Json>) -> Self {
        Reactive::Signal(signal)
    }
}

impl From<Computed<Json>> for Reactive {
    fn from(computed: Computed<Json>) -> Self {
        Reactive::Computed(computed)
    }
}

/// An attribute value: static JSON or a binding.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Static(Json),
    Bound(Reactive),
}

impl From<Json> for AttrValue {
    fn from(json: Json) -> Self {
        AttrValue::Static(json)
    }
}

impl From<&str> for AttrValue {
    fn from(text: &str) -> Self {
        AttrValue::Static(Json::String(text.to_string()))
    }
}

impl From<String> for AttrValue {
    fn from(text: String) -> Self {
        AttrValue::Static(Json::String(text))
    }
}

impl From<bool> for AttrValue {
    fn from(flag: bool) -> Self {
        AttrValue::Static(Json::Bool(flag))
    }
}

impl From<i64> for AttrValue {
    fn from(number: i64) -> Self {
        AttrValue::Static(Json::from(number))
    }
}

impl From<f64> for AttrValue {
    fn from(number: f64) -> Self {
        AttrValue::Static(Json::from(number))
    }
}

impl From<Signal<Json>> for AttrValue {
    fn from(signal: Signal<Json>) -> Self {
        AttrValue::Bound(Reactive::Signal(signal))
    }
}

impl From<Computed<Json>> for AttrValue {
    fn from(computed: Computed<Json>) -> Self {
        AttrValue::Bound(Reactive::Computed(computed))
    }
}

/// An event listener declared on an element.
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub scope: Scope,
    pub event: String,
    pub handler: Qrl<HandlerFn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsxElement {
    pub tag: String,
    pub key: Option<String>,
    /// Re-diffed on every render.
    pub props: IndexMap<String, AttrValue>,
    /// Applied once when the element is created.
    pub consts: IndexMap<String, AttrValue>,
    pub listeners: Vec<Listener>,
    pub children: Vec<JsxNode>,
    /// Opaque markup that replaces the children.
    pub inner_html: Option<String>,
}

impl JsxElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            key: None,
            props: IndexMap::new(),
            consts: IndexMap::new(),
            listeners: Vec::new(),
            children: Vec::new(),
            inner_html: None,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn const_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.consts.insert(name.into(), value.into());
        self
    }

    pub fn on(self, event: impl Into<String>, handler: Qrl<HandlerFn>) -> Self {
        self.listen(Scope::Element, event, handler)
    }

    pub fn on_document(self, event: impl Into<String>, handler: Qrl<HandlerFn>) -> Self {
        self.listen(Scope::Document, event, handler)
    }

    pub fn on_window(self, event: impl Into<String>, handler: Qrl<HandlerFn>) -> Self {
        self.listen(Scope::Window, event, handler)
    }

    fn listen(mut self, scope: Scope, event: impl Into<String>, handler: Qrl<HandlerFn>) -> Self {
        self.listeners.push(Listener {
            scope,
            event: event.into(),
            handler,
        });
        self
    }

    pub fn child(mut self, child: impl Into<JsxNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, C>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<JsxNode>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn inner_html(mut self, html: impl Into<String>) -> Self {
        self.inner_html = Some(html.into());
        self
    }

    /// Value of a var or const prop.
    pub fn prop(&self, name: &str) -> Option<&AttrValue> {
        self.props.get(name).or_else(|| self.consts.get(name))
    }
}

/// Props passed to a component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    pub var: IndexMap<String, Value>,
    pub consts: IndexMap<String, Value>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Var props take precedence over consts of the same name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.var.get(name).or_else(|| self.consts.get(name))
    }

    pub fn is_empty(&self) -> bool {
        self.var.is_empty() && self.consts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsxComponent {
    pub qrl: Qrl<ComponentFn>,
    pub props: Props,
    pub key: Option<String>,
    /// Projected into the component's slots.
    pub children: Vec<JsxNode>,
}

impl JsxComponent {
    pub fn new(qrl: Qrl<ComponentFn>) -> Self {
        Self {
            qrl,
            props: Props::new(),
            key: None,
            children: Vec::new(),
        }
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.var.insert(name.into(), value.into());
        self
    }

    pub fn const_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.consts.insert(name.into(), value.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn child(mut self, child: impl Into<JsxNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, C>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<JsxNode>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsxBoundary {
    pub key: Option<String>,
    pub fallback: Qrl<FallbackFn>,
    pub children: Vec<JsxNode>,
}

impl JsxBoundary {
    pub fn child(mut self, child: impl Into<JsxNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum JsxNode {
    /// Renders nothing.
    #[default]
    Empty,
    Text(String),
    /// A text node bound to a reactive value.
    Signal(Reactive),
    Element(Box<JsxElement>),
    Fragment {
        key: Option<String>,
        children: Vec<JsxNode>,
    },
    Component(Box<JsxComponent>),
    /// Where projected children appear. `None` is the default slot.
    Slot { name: Option<String> },
    ErrorBoundary(Box<JsxBoundary>),
}

impl JsxNode {
    pub fn key(&self) -> Option<&str> {
        match self {
            JsxNode::Element(element) => element.key.as_deref(),
            JsxNode::Fragment { key, .. } => key.as_deref(),
            JsxNode::Component(component) => component.key.as_deref(),
            JsxNode::ErrorBoundary(boundary) => boundary.key.as_deref(),
            JsxNode::Empty | JsxNode::Text(_) | JsxNode::Signal(_) | JsxNode::Slot { .. } => None,
        }
    }

    /// Name of the slot this node is projected into.
    pub fn slot_name(&self) -> Option<String> {
        match self {
            JsxNode::Element(element) => match element.prop("q:slot") {
                Some(AttrValue::Static(Json::String(name))) => Some(name.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, JsxNode::Empty)
    }
}

pub fn el(tag: impl Into<String>) -> JsxElement {
    JsxElement::new(tag)
}

pub fn text(text: impl Into<String>) -> JsxNode {
    JsxNode::Text(text.into())
}

pub fn fragment<I, C>(children: I) -> JsxNode
where
    I: IntoIterator<Item = C>,
    C: Into<JsxNode>,
{
    JsxNode::Fragment {
        key: None,
        children: children.into_iter().map(Into::into).collect(),
    }
}

pub fn keyed_fragment<I, C>(key: impl Into<String>, children: I) -> JsxNode
where
    I: IntoIterator<Item = C>,
    C: Into<JsxNode>,
{
    JsxNode::Fragment {
        key: Some(key.into()),
        children: children.into_iter().map(Into::into).collect(),
    }
}

pub fn component(qrl: Qrl<ComponentFn>) -> JsxComponent {
    JsxComponent::new(qrl)
}

pub fn slot() -> JsxNode {
    JsxNode::Slot { name: None }
}

pub fn named_slot(name: impl Into<String>) -> JsxNode {
    JsxNode::Slot {
        name: Some(name.into()),
    }
}

pub fn error_boundary(fallback: Qrl<FallbackFn>) -> JsxBoundary {
    JsxBoundary {
        key: None,
        fallback,
        children: Vec::new(),
    }
}

pub fn bound(value: impl Into<Reactive>) -> JsxNode {
    JsxNode::Signal(value.into())
}

/// Text form of a JSON value as rendered into a text node.
pub fn json_text(value: &Json) -> String {
    match value {
        Json::Null | Json::Bool(_) => String::new(),
        Json::String(text) => text.clone(),
        Json::Number(number) => match number.as_f64() {
            Some(float) if number.is_f64() => number_text(float),
            _ => number.to_string(),
        },
        other => other.to_string(),
    }
}

fn number_text(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

impl From<JsxElement> for JsxNode {
    fn from(element: JsxElement) -> Self {
        JsxNode::Element(Box::new(element))
    }
}

impl From<JsxComponent> for JsxNode {
    fn from(component: JsxComponent) -> Self {
        JsxNode::Component(Box::new(component))
    }
}

impl From<JsxBoundary> for JsxNode {
    fn from(boundary: JsxBoundary) -> Self {
        JsxNode::ErrorBoundary(Box::new(boundary))
    }
}

impl From<&str> for JsxNode {
    fn from(text: &str) -> Self {
        JsxNode::Text(text.to_string())
    }
}

impl From<String> for JsxNode {
    fn from(text: String) -> Self {
        JsxNode::Text(text)
    }
}

impl From<i64> for JsxNode {
    fn from(number: i64) -> Self {
        JsxNode::Text(number.to_string())
    }
}

impl From<i32> for JsxNode {
    fn from(number: i32) -> Self {
        JsxNode::Text(number.to_string())
    }
}

impl From<usize> for JsxNode {
    fn from(number: usize) -> Self {
        JsxNode::Text(number.to_string())
    }
}

impl From<f64> for JsxNode {
    fn from(number: f64) -> Self {
        JsxNode::Text(number_text(number))
    }
}

impl From<bool> for JsxNode {
    fn from(_: bool) -> Self {
        JsxNode::Empty
    }
}

impl From<Json> for JsxNode {
    fn from(value: Json) -> Self {
        match value {
            Json::Null | Json::Bool(_) => JsxNode::Empty,
            other => JsxNode::Text(json_text(&other)),
        }
    }
}

impl<T: Into<JsxNode>> From<Option<T>> for JsxNode {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(JsxNode::Empty)
    }
}

impl<T: Into<JsxNode>> From<Vec<T>> for JsxNode {
    fn from(children: Vec<T>) -> Self {
        fragment(children)
    }
}

impl From<Signal<Json>> for JsxNode {
    fn from(signal: Signal<Json>) -> Self {
        JsxNode::Signal(Reactive::Signal(signal))
    }
}

impl From<Computed<Json>> for JsxNode {
    fn from(computed: Computed<Json>) -> Self {
        JsxNode::Signal(Reactive::Computed(computed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_normalize() {
        assert_eq!(JsxNode::from(true), JsxNode::Empty);
        assert_eq!(JsxNode::from(Option::<&str>::None), JsxNode::Empty);
        assert_eq!(JsxNode::from(3.0), JsxNode::Text("3".into()));
        assert_eq!(JsxNode::from(2.5), JsxNode::Text("2.5".into()));
        assert_eq!(JsxNode::from(json!(null)), JsxNode::Empty);
    }

    #[test]
    fn json_text_matches_rendering() {
        assert_eq!(json_text(&json!(124)), "124");
        assert_eq!(json_text(&json!(1.0)), "1");
        assert_eq!(json_text(&json!("a")), "a");
        assert_eq!(json_text(&json!(false)), "");
    }

    #[test]
    fn builders_collect_props_and_keys() {
        let node: JsxNode = el("li")
            .key("a")
            .attr("class", "item")
            .const_attr("q:slot", "end")
            .child("x")
            .into();
        assert_eq!(node.key(), Some("a"));
        assert_eq!(node.slot_name(), Some("end".to_string()));
    }
}

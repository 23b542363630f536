//! The closed set of values that flow through props, captures and hooks.
//!
//! Every site that has to treat reactive values differently (diffing a prop,
//! tracking a binding, serializing state) matches on [`Value`] exhaustively
//! instead of probing the value's shape at runtime.

use serde_json::Value as Json;

use crate::error::{CoreError, Result};
use crate::jsx::JsxNode;

use super::computed::Computed;
use super::signal::Signal;
use super::store::{json_kind, Store};
use super::task::Resource;

/// A prop, capture or hook value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Primitive(Json),
    Signal(Signal<Json>),
    Computed(Computed<Json>),
    Store(Store),
    Resource(Resource),
    Jsx(JsxNode),
}

impl Value {
    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Primitive(json) => json_kind(json),
            Value::Signal(_) => "signal",
            Value::Computed(_) => "computed signal",
            Value::Store(_) => "store",
            Value::Resource(_) => "resource",
            Value::Jsx(_) => "jsx",
        }
    }

    /// Current JSON value. Reactive variants are read tracked.
    pub fn read(&self) -> Result<Json> {
        match self {
            Value::Primitive(json) => Ok(json.clone()),
            Value::Signal(signal) => Ok(signal.get()),
            Value::Computed(computed) => computed.get(),
            Value::Store(store) => Ok(store.snapshot()),
            Value::Resource(resource) => Ok(resource.state()),
            Value::Jsx(_) => Err(self.mismatch("json-compatible value")),
        }
    }

    pub fn as_primitive(&self) -> Result<&Json> {
        match self {
            Value::Primitive(json) => Ok(json),
            other => Err(other.mismatch("primitive")),
        }
    }

    pub fn as_signal(&self) -> Result<&Signal<Json>> {
        match self {
            Value::Signal(signal) => Ok(signal),
            other => Err(other.mismatch("signal")),
        }
    }

    pub fn as_computed(&self) -> Result<&Computed<Json>> {
        match self {
            Value::Computed(computed) => Ok(computed),
            other => Err(other.mismatch("computed signal")),
        }
    }

    pub fn as_store(&self) -> Result<&Store> {
        match self {
            Value::Store(store) => Ok(store),
            other => Err(other.mismatch("store")),
        }
    }

    pub fn as_resource(&self) -> Result<&Resource> {
        match self {
            Value::Resource(resource) => Ok(resource),
            other => Err(other.mismatch("resource")),
        }
    }

    pub fn as_jsx(&self) -> Result<&JsxNode> {
        match self {
            Value::Jsx(node) => Ok(node),
            other => Err(other.mismatch("jsx")),
        }
    }

    /// Whether the value can change after creation.
    pub fn is_reactive(&self) -> bool {
        !matches!(self, Value::Primitive(_) | Value::Jsx(_))
    }

    fn mismatch(&self, expected: &'static str) -> CoreError {
        CoreError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::Primitive(json)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Primitive(Json::String(text.to_string()))
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Primitive(Json::String(text))
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Value::Primitive(Json::from(number))
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Primitive(Json::Bool(flag))
    }
}

impl From<Signal<Json>> for Value {
    fn from(signal: Signal<Json>) -> Self {
        Value::Signal(signal)
    }
}

impl From<Computed<Json>> for Value {
    fn from(computed: Computed<Json>) -> Self {
        Value::Computed(computed)
    }
}

impl From<Store> for Value {
    fn from(store: Store) -> Self {
        Value::Store(store)
    }
}

impl From<Resource> for Value {
    fn from(resource: Resource) -> Self {
        Value::Resource(resource)
    }
}

impl From<JsxNode> for Value {
    fn from(node: JsxNode) -> Self {
        Value::Jsx(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_report_mismatches() {
        let value = Value::from(json!(3));
        assert_eq!(value.as_primitive().unwrap(), &json!(3));
        assert_eq!(
            value.as_signal().unwrap_err(),
            CoreError::TypeMismatch {
                expected: "signal",
                found: "number"
            }
        );
    }

    #[test]
    fn reactive_values_compare_by_identity() {
        let signal = Signal::new(json!(1));
        assert_eq!(Value::from(signal.clone()), Value::from(signal));
        assert_ne!(
            Value::from(Signal::new(json!(1))),
            Value::from(Signal::new(json!(1)))
        );
    }

    #[test]
    fn read_unwraps_reactive_values() {
        let signal = Signal::new(json!("hi"));
        assert_eq!(Value::from(signal).read().unwrap(), json!("hi"));
        let store = Store::new(json!({"a": 1})).unwrap();
        assert_eq!(Value::from(store).read().unwrap(), json!({"a": 1}));
        assert!(Value::from(JsxNode::Empty).read().is_err());
    }
}

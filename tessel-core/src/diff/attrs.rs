//! Attribute normalization.
//!
//! JSX attribute values are JSON. Before they reach the host they are mapped
//! to one [`AttrPatch`]: a string attribute, a removal, or a live property.
//! Values that have no sensible attribute form are rejected here, before the
//! diff touches the tree.

use serde_json::Value as Json;

use crate::error::{CoreError, Result};
use crate::jsx::{json_text, AttrValue, JsxNode};
use crate::reactive::{json_kind, untrack};
use crate::vnode::attribute_namespace;

#[derive(Debug, Clone, PartialEq)]
pub enum AttrPatch {
    Set {
        name: String,
        value: String,
        ns: Option<&'static str>,
    },
    Remove {
        name: String,
    },
    /// A live property, for form state that attributes only initialize.
    Property {
        name: String,
        value: Json,
    },
}

fn is_form_property(tag: &str, name: &str) -> bool {
    matches!(
        (tag, name),
        ("input" | "select" | "textarea" | "option", "value")
            | ("input", "checked")
            | ("option", "selected")
    )
}

/// Map `value` for attribute `name` on a `tag` element.
pub fn normalize(tag: &str, name: &str, value: &Json) -> Result<AttrPatch> {
    if tag == "textarea" && name == "value" {
        return match value {
            Json::String(_) => Ok(AttrPatch::Property {
                name: name.to_string(),
                value: value.clone(),
            }),
            other => Err(CoreError::TextareaValue {
                found: json_kind(other),
            }),
        };
    }
    if is_form_property(tag, name) {
        return Ok(AttrPatch::Property {
            name: name.to_string(),
            value: value.clone(),
        });
    }
    let text = match (name, value) {
        (_, Json::Null | Json::Bool(false)) => None,
        ("class", _) => class_value(value)?,
        ("style", _) => style_value(value)?,
        (_, Json::Bool(true)) => Some(String::new()),
        (_, Json::String(text)) => Some(text.clone()),
        (_, Json::Number(_)) => Some(json_text(value)),
        (_, other) => {
            return Err(CoreError::InvalidAttribute {
                name: name.to_string(),
                reason: format!("{} values cannot be rendered as an attribute", json_kind(other)),
            })
        }
    };
    Ok(match text {
        Some(value) => AttrPatch::Set {
            name: name.to_string(),
            value,
            ns: attribute_namespace(name),
        },
        None => AttrPatch::Remove {
            name: name.to_string(),
        },
    })
}

fn is_truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(flag) => *flag,
        Json::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Json::String(text) => !text.is_empty(),
        Json::Array(_) | Json::Object(_) => true,
    }
}

/// `class` accepts a string, a list of class names, or an object mapping
/// class names to a condition.
fn class_value(value: &Json) -> Result<Option<String>> {
    let classes: Vec<String> = match value {
        Json::String(text) => text.split_whitespace().map(str::to_string).collect(),
        Json::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                match item {
                    Json::String(text) => out.extend(text.split_whitespace().map(str::to_string)),
                    Json::Null | Json::Bool(false) => {}
                    other => {
                        return Err(CoreError::InvalidAttribute {
                            name: "class".into(),
                            reason: format!("class list entries must be strings, found {}", json_kind(other)),
                        })
                    }
                }
            }
            out
        }
        Json::Object(map) => map
            .iter()
            .filter(|(_, on)| is_truthy(on))
            .map(|(name, _)| name.clone())
            .collect(),
        other => {
            return Err(CoreError::InvalidAttribute {
                name: "class".into(),
                reason: format!("expected string, list or object, found {}", json_kind(other)),
            })
        }
    };
    Ok((!classes.is_empty()).then(|| classes.join(" ")))
}

/// `style` accepts a string or an object of properties. Object keys may be
/// camelCase.
fn style_value(value: &Json) -> Result<Option<String>> {
    match value {
        Json::String(text) => Ok((!text.is_empty()).then(|| text.clone())),
        Json::Object(map) => {
            let mut parts = Vec::new();
            for (property, value) in map {
                let value = match value {
                    Json::Null | Json::Bool(false) => continue,
                    Json::String(text) => text.clone(),
                    Json::Number(_) => json_text(value),
                    other => {
                        return Err(CoreError::InvalidAttribute {
                            name: "style".into(),
                            reason: format!("`{property}` cannot be a {}", json_kind(other)),
                        })
                    }
                };
                parts.push(format!("{}: {value}", kebab_case(property)));
            }
            Ok((!parts.is_empty()).then(|| parts.join("; ")))
        }
        other => Err(CoreError::InvalidAttribute {
            name: "style".into(),
            reason: format!("expected string or object, found {}", json_kind(other)),
        }),
    }
}

fn kebab_case(property: &str) -> String {
    if property.starts_with("--") {
        return property.to_string();
    }
    let mut out = String::with_capacity(property.len() + 4);
    for c in property.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Check every attribute and bound text in `node` before it is diffed. Bound
/// values are read untracked.
pub fn validate(node: &JsxNode) -> Result<()> {
    match node {
        JsxNode::Element(element) => {
            for (name, value) in element.props.iter().chain(element.consts.iter()) {
                let json = match value {
                    AttrValue::Static(json) => json.clone(),
                    AttrValue::Bound(reactive) => untrack(|| reactive.read())?,
                };
                normalize(&element.tag, name, &json)?;
            }
            element.children.iter().try_for_each(validate)
        }
        JsxNode::Fragment { children, .. } => children.iter().try_for_each(validate),
        JsxNode::Component(component) => component.children.iter().try_for_each(validate),
        JsxNode::ErrorBoundary(boundary) => boundary.children.iter().try_for_each(validate),
        JsxNode::Signal(reactive) => untrack(|| reactive.read()).map(drop),
        JsxNode::Empty | JsxNode::Text(_) | JsxNode::Slot { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsx::el;
    use crate::reactive::Signal;
    use crate::vnode::XLINK_NS;
    use serde_json::json;

    fn set(name: &str, value: &str) -> AttrPatch {
        AttrPatch::Set {
            name: name.into(),
            value: value.into(),
            ns: None,
        }
    }

    #[test]
    fn booleans_map_to_presence() {
        assert_eq!(normalize("button", "disabled", &json!(true)).unwrap(), set("disabled", ""));
        assert_eq!(
            normalize("button", "disabled", &json!(false)).unwrap(),
            AttrPatch::Remove { name: "disabled".into() }
        );
        assert_eq!(
            normalize("div", "title", &Json::Null).unwrap(),
            AttrPatch::Remove { name: "title".into() }
        );
    }

    #[test]
    fn class_and_style_shapes() {
        assert_eq!(
            normalize("div", "class", &json!(["a", null, "b c"])).unwrap(),
            set("class", "a b c")
        );
        assert_eq!(
            normalize("div", "class", &json!({"on": true, "off": false, "n": 1})).unwrap(),
            set("class", "on n")
        );
        assert_eq!(
            normalize("div", "style", &json!({"backgroundColor": "red", "zIndex": 2})).unwrap(),
            set("style", "background-color: red; z-index: 2")
        );
    }

    #[test]
    fn form_state_uses_properties() {
        assert_eq!(
            normalize("input", "checked", &json!(true)).unwrap(),
            AttrPatch::Property {
                name: "checked".into(),
                value: json!(true)
            }
        );
        assert!(matches!(
            normalize("textarea", "value", &json!(3)),
            Err(CoreError::TextareaValue { found: "number" })
        ));
    }

    #[test]
    fn namespaced_attributes_keep_their_namespace() {
        assert_eq!(
            normalize("use", "xlink:href", &json!("#a")).unwrap(),
            AttrPatch::Set {
                name: "xlink:href".into(),
                value: "#a".into(),
                ns: Some(XLINK_NS)
            }
        );
    }

    #[test]
    fn objects_are_rejected_outside_class_and_style() {
        assert!(matches!(
            normalize("div", "title", &json!({"a": 1})),
            Err(CoreError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn validation_reads_bound_values() {
        let value = Signal::new(json!(["not", "a", "string"]));
        let node: JsxNode = el("form").child(el("textarea").attr("value", value)).into();
        assert!(matches!(validate(&node), Err(CoreError::TextareaValue { found: "array" })));
    }
}

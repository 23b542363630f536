//! Element and attribute namespaces.
//!
//! The namespace is a property of each subtree: `<svg>` switches its
//! children to SVG, `<math>` to MathML, and an SVG `<foreignObject>` switches
//! its children back to HTML.

use serde::{Deserialize, Serialize};

pub const HTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Namespace {
    #[default]
    Html,
    Svg,
    MathMl,
}

impl Namespace {
    pub fn uri(self) -> &'static str {
        match self {
            Namespace::Html => HTML_NS,
            Namespace::Svg => SVG_NS,
            Namespace::MathMl => MATHML_NS,
        }
    }

    /// Namespace of a `tag` element created where children are in `self`.
    pub fn for_element(self, tag: &str) -> Namespace {
        match tag {
            "svg" => Namespace::Svg,
            "math" => Namespace::MathMl,
            _ => self,
        }
    }

    /// Namespace of the children of a `tag` element that lives in `self`.
    pub fn for_children(self, tag: &str) -> Namespace {
        match (self, tag) {
            (Namespace::Svg, "foreignObject") => Namespace::Html,
            (Namespace::MathMl, "annotation-xml") => Namespace::Html,
            _ => self,
        }
    }
}

/// Namespace URI of a prefixed attribute name.
pub fn attribute_namespace(name: &str) -> Option<&'static str> {
    if name.starts_with("xlink:") {
        Some(XLINK_NS)
    } else if name.starts_with("xml:") {
        Some(XML_NS)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switches_per_subtree() {
        let html = Namespace::Html;
        let svg = html.for_element("svg");
        assert_eq!(svg, Namespace::Svg);
        assert_eq!(svg.for_children("svg"), Namespace::Svg);
        assert_eq!(svg.for_element("circle"), Namespace::Svg);

        let foreign = svg.for_element("foreignObject");
        assert_eq!(foreign, Namespace::Svg);
        assert_eq!(foreign.for_children("foreignObject"), Namespace::Html);

        assert_eq!(Namespace::Html.for_element("math"), Namespace::MathMl);
        assert_eq!(Namespace::Html.for_element("div"), Namespace::Html);
    }

    #[test]
    fn prefixed_attributes() {
        assert_eq!(attribute_namespace("xlink:href"), Some(XLINK_NS));
        assert_eq!(attribute_namespace("xml:lang"), Some(XML_NS));
        assert_eq!(attribute_namespace("href"), None);
    }
}

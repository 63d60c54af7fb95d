//! Serialized surface content and its HTML form.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Elements rendered without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Style properties whose numeric values carry no unit.
const UNITLESS_STYLES: &[&str] = &[
    "flex",
    "flexGrow",
    "flexShrink",
    "fontWeight",
    "lineHeight",
    "opacity",
    "order",
    "zIndex",
    "zoom",
];

/// One node of a surface's element tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkupNode {
    Element {
        tag: String,
        #[serde(default)]
        attributes: BTreeMap<String, Value>,
        #[serde(default)]
        children: Vec<MarkupNode>,
    },
    Text {
        text: String,
    },
    /// Markup assigned through `innerHTML`, passed through unparsed.
    Raw {
        html: String,
    },
}

impl MarkupNode {
    /// Serialize this node, escaping text and attribute values.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    /// Serialize the children of an element.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        if let MarkupNode::Element { children, .. } = self {
            for child in children {
                child.write_html(&mut out);
            }
        }
        out
    }

    /// Concatenated text content.
    pub fn text_content(&self) -> String {
        match self {
            MarkupNode::Text { text } => text.clone(),
            MarkupNode::Raw { html } => strip_tags(html),
            MarkupNode::Element { children, .. } => {
                children.iter().map(MarkupNode::text_content).collect()
            }
        }
    }

    fn write_html(&self, out: &mut String) {
        match self {
            MarkupNode::Text { text } => out.push_str(&escape(text, false)),
            MarkupNode::Raw { html } => out.push_str(html),
            MarkupNode::Element {
                tag,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    write_attribute(out, name, value);
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{}>", tag);
            }
        }
    }
}

fn write_attribute(out: &mut String, name: &str, value: &Value) {
    let rendered = match value {
        Value::Null | Value::Bool(false) => return,
        Value::Bool(true) => {
            let _ = write!(out, " {}", name);
            return;
        }
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Object(style) if name == "style" => style_text(style),
        other => other.to_string(),
    };
    let _ = write!(out, " {}=\"{}\"", name, escape(&rendered, true));
}

/// `{ fontSize: 12, color: "red" }` → `font-size: 12px; color: red`
fn style_text(style: &serde_json::Map<String, Value>) -> String {
    style
        .iter()
        .filter_map(|(property, value)| {
            let value = match value {
                Value::Number(number) if UNITLESS_STYLES.contains(&property.as_str()) => {
                    number.to_string()
                }
                Value::Number(number) => format!("{number}px"),
                Value::String(text) => text.clone(),
                _ => return None,
            };
            Some(format!("{}: {}", kebab_case(property), value))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn kebab_case(property: &str) -> String {
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

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(tag: &str, attributes: Value, children: Vec<MarkupNode>) -> MarkupNode {
        MarkupNode::Element {
            tag: tag.to_string(),
            attributes: serde_json::from_value(attributes).unwrap(),
            children,
        }
    }

    fn text(value: &str) -> MarkupNode {
        MarkupNode::Text {
            text: value.to_string(),
        }
    }

    #[test]
    fn test_deserialize_snapshot() {
        let node: MarkupNode = serde_json::from_value(json!({
            "tag": "div",
            "attributes": { "id": "root" },
            "children": [{ "text": "hi" }, { "html": "<b>x</b>" }]
        }))
        .unwrap();
        assert_eq!(node.inner_html(), "hi<b>x</b>");
    }

    #[test]
    fn test_escapes_text_and_attributes() {
        let node = element("p", json!({ "title": "a \"b\" <c>" }), vec![text("1 < 2 & 3")]);
        assert_eq!(
            node.to_html(),
            "<p title=\"a &quot;b&quot; &lt;c&gt;\">1 &lt; 2 &amp; 3</p>"
        );
    }

    #[test]
    fn test_void_and_boolean_attributes() {
        let node = element("input", json!({ "disabled": true, "hidden": false, "value": 3 }), vec![]);
        assert_eq!(node.to_html(), "<input disabled value=\"3\">");
    }

    #[test]
    fn test_style_object() {
        let node = element(
            "div",
            json!({ "style": { "fontSize": 12, "opacity": 0.5, "color": "red" } }),
            vec![],
        );
        assert_eq!(
            node.to_html(),
            "<div style=\"color: red; font-size: 12px; opacity: 0.5\"></div>"
        );
    }

    #[test]
    fn test_text_content() {
        let node = element(
            "div",
            json!({}),
            vec![text("a"), MarkupNode::Raw { html: "<i>b</i>".into() }],
        );
        assert_eq!(node.text_content(), "ab");
    }
}

//! Headless line-box layout used to size sandbox surfaces.
//!
//! Block elements start new line boxes, inline text wraps at a fixed column
//! count derived from the surface width, and a block with an explicit
//! height contributes exactly that height.

use serde_json::Value;

use crate::config::SurfaceConfig;

use super::markup::{MarkupNode, strip_tags};

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "dd", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table",
    "tr", "ul",
];

/// Elements sized by their `height` attribute.
const REPLACED_ELEMENTS: &[&str] = &["canvas", "iframe", "img", "svg", "video"];

/// Measures the content height of a surface tree.
#[derive(Debug, Clone, Copy)]
pub struct LayoutModel {
    columns: usize,
    line_height_px: u32,
}

impl LayoutModel {
    pub fn new(surface: &SurfaceConfig) -> Self {
        let columns = (surface.width_px / surface.char_width_px.max(1)).max(1);
        Self {
            columns: columns as usize,
            line_height_px: surface.line_height_px,
        }
    }

    /// Content height of `root` in pixels.
    pub fn measure(&self, root: &MarkupNode) -> u32 {
        let mut flow = Flow {
            columns: self.columns,
            ..Flow::default()
        };
        flow.node(root);
        flow.close_line_box();
        flow.lines.saturating_mul(self.line_height_px).saturating_add(flow.fixed_px)
    }
}

#[derive(Default)]
struct Flow {
    columns: usize,
    lines: u32,
    fixed_px: u32,
    /// Characters on the open line box run.
    pending: usize,
    pending_space: bool,
    preformatted: bool,
}

impl Flow {
    fn node(&mut self, node: &MarkupNode) {
        match node {
            MarkupNode::Text { text } => self.text(text),
            MarkupNode::Raw { html } => self.text(&strip_tags(html)),
            MarkupNode::Element {
                tag,
                attributes,
                children,
            } => {
                let tag = tag.to_ascii_lowercase();
                if tag == "br" {
                    self.line_break();
                    return;
                }
                let replaced = REPLACED_ELEMENTS.contains(&tag.as_str());
                let block = replaced || BLOCK_ELEMENTS.contains(&tag.as_str());
                if !block {
                    for child in children {
                        self.node(child);
                    }
                    return;
                }

                self.close_line_box();
                let explicit = style_height(attributes.get("style")).or_else(|| {
                    if replaced {
                        attributes.get("height").and_then(pixels)
                    } else {
                        None
                    }
                });
                if let Some(height) = explicit {
                    self.fixed_px = self.fixed_px.saturating_add(height);
                    return;
                }

                let was_preformatted = self.preformatted;
                self.preformatted |= tag == "pre";
                for child in children {
                    self.node(child);
                }
                self.close_line_box();
                self.preformatted = was_preformatted;
            }
        }
    }

    fn text(&mut self, text: &str) {
        if self.preformatted {
            let mut segments = text.split('\n');
            if let Some(first) = segments.next() {
                self.pending += first.chars().count();
            }
            for segment in segments {
                self.line_break();
                self.pending += segment.chars().count();
            }
            return;
        }
        for c in text.chars() {
            if c.is_whitespace() {
                self.pending_space = self.pending > 0;
            } else {
                if self.pending_space {
                    self.pending += 1;
                    self.pending_space = false;
                }
                self.pending += 1;
            }
        }
    }

    /// Close the open run, if any, into wrapped line boxes.
    fn close_line_box(&mut self) {
        if self.pending > 0 {
            self.lines += self.pending.div_ceil(self.columns) as u32;
        }
        self.pending = 0;
        self.pending_space = false;
    }

    /// Forced break: always produces at least one line box.
    fn line_break(&mut self) {
        self.lines += self.pending.div_ceil(self.columns).max(1) as u32;
        self.pending = 0;
        self.pending_space = false;
    }
}

fn style_height(style: Option<&Value>) -> Option<u32> {
    style?.as_object()?.get("height").and_then(pixels)
}

/// `120`, `"120"` or `"120px"` → 120.
fn pixels(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_f64().map(|px| px.max(0.0).round() as u32),
        Value::String(text) => text
            .trim()
            .trim_end_matches("px")
            .trim()
            .parse::<f64>()
            .ok()
            .map(|px| px.max(0.0).round() as u32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn measure(tree: Value) -> u32 {
        let root: MarkupNode = serde_json::from_value(tree).unwrap();
        LayoutModel::new(&SurfaceConfig::default()).measure(&root)
    }

    #[test]
    fn test_empty_root_has_no_height() {
        assert_eq!(measure(json!({ "tag": "div", "children": [] })), 0);
    }

    #[test]
    fn test_block_per_line() {
        let height = measure(json!({ "tag": "div", "children": [
            { "tag": "h1", "children": [{ "text": "Title" }] },
            { "tag": "p", "children": [{ "text": "Body" }] },
        ]}));
        assert_eq!(height, 40);
    }

    #[test]
    fn test_inline_runs_share_a_line() {
        let height = measure(json!({ "tag": "p", "children": [
            { "text": "a " },
            { "tag": "b", "children": [{ "text": "bold" }] },
            { "tag": "span", "children": [{ "text": " c" }] },
        ]}));
        assert_eq!(height, 20);
    }

    #[test]
    fn test_text_wraps_at_column_count() {
        // 800px / 8px = 100 columns.
        let long = "x".repeat(250);
        let height = measure(json!({ "tag": "p", "children": [{ "text": long }] }));
        assert_eq!(height, 60);
    }

    #[test]
    fn test_explicit_height() {
        let height = measure(json!({ "tag": "div", "children": [
            { "tag": "div", "attributes": { "style": { "height": 120 } }, "children": [{ "text": "ignored" }] },
            { "tag": "img", "attributes": { "height": "50px" } },
        ]}));
        assert_eq!(height, 170);
    }

    #[test]
    fn test_preformatted_and_breaks() {
        let height = measure(json!({ "tag": "div", "children": [
            { "tag": "pre", "children": [{ "text": "a\nb\nc" }] },
            { "text": "x" },
            { "tag": "br" },
            { "tag": "br" },
        ]}));
        assert_eq!(height, 3 * 20 + 2 * 20);
    }

    #[test]
    fn test_whitespace_collapses() {
        let height = measure(json!({ "tag": "p", "children": [{ "text": "   \n\t  " }] }));
        assert_eq!(height, 0);
    }
}

//! Narrow document-query capability.
//!
//! Everything that reads the page (labels, scanning, matching, overlay
//! geometry) goes through [`Document`], so it runs the same against a
//! live capture and a synthetic tree built in a test.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a node inside one captured document. Only meaningful for the
/// document (and capture generation) that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounding rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Inclusive on all edges, matching how hit testing treats borders.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.left() && x <= self.right() && y >= self.top() && y <= self.bottom()
    }

    /// Grow (or shrink, for negative values) on every side.
    pub fn inflate(&self, by: f64) -> Self {
        Self {
            x: self.x - by,
            y: self.y - by,
            width: self.width + by * 2.0,
            height: self.height + by * 2.0,
        }
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Self {
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }
}

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && x <= self.width && y >= 0.0 && y <= self.height
    }

    /// Whether any part of `rect` lies inside the viewport.
    pub fn intersects(&self, rect: &Rect) -> bool {
        !(rect.bottom() < 0.0
            || rect.top() > self.height
            || rect.right() < 0.0
            || rect.left() > self.width)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}

/// The slice of computed style the visibility predicate needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default)]
    pub display_none: bool,
    #[serde(default)]
    pub visibility_hidden: bool,
    #[serde(default = "Style::default_opacity")]
    pub opacity: f64,
}

impl Style {
    fn default_opacity() -> f64 {
        1.0
    }

    pub fn is_hidden(&self) -> bool {
        self.display_none || self.visibility_hidden || self.opacity <= 0.0
    }
}

impl Default for Style {
    fn default() -> Self {
        Self {
            display_none: false,
            visibility_hidden: false,
            opacity: 1.0,
        }
    }
}

/// Read-only view over an element tree.
///
/// Implementors supply the primitives; tree helpers are provided.
pub trait Document {
    /// All element nodes in document order.
    fn elements(&self) -> Vec<NodeId>;

    /// Lowercase tag name, `None` for text nodes.
    fn tag(&self, node: NodeId) -> Option<&str>;

    /// Text of a text node, `None` for elements.
    fn text(&self, node: NodeId) -> Option<&str>;

    fn attr(&self, node: NodeId, name: &str) -> Option<&str>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Element and text children in document order.
    fn child_nodes(&self, node: NodeId) -> &[NodeId];

    fn element_by_id(&self, id: &str) -> Option<NodeId>;

    fn style(&self, node: NodeId) -> Style;

    fn rect(&self, node: NodeId) -> Rect;

    fn viewport(&self) -> Viewport;

    /// Topmost element at a viewport point.
    fn element_from_point(&self, x: f64, y: f64) -> Option<NodeId>;

    fn is_element(&self, node: NodeId) -> bool {
        self.tag(node).is_some()
    }

    /// Concatenated text of every descendant text node.
    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        collect_text(self, node, &mut |_: NodeId| false, &mut out);
        out
    }

    /// Text content, skipping the subtrees for which `skip` returns true.
    fn text_content_except(&self, node: NodeId, skip: &mut dyn FnMut(NodeId) -> bool) -> String {
        let mut out = String::new();
        collect_text(self, node, skip, &mut out);
        out
    }

    /// Text of the node's own text-node children only.
    fn direct_text(&self, node: NodeId) -> String {
        self.child_nodes(node)
            .iter()
            .filter_map(|&c| self.text(c))
            .collect()
    }

    /// Nearest inclusive ancestor with the given tag.
    fn closest(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if self.tag(n) == Some(tag) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    /// Whether `other` is `node` or one of its descendants.
    fn contains(&self, node: NodeId, other: NodeId) -> bool {
        let mut cur = Some(other);
        while let Some(n) = cur {
            if n == node {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// First descendant element (excluding `node`) matching `pred`.
    fn find_descendant(&self, node: NodeId, pred: &mut dyn FnMut(NodeId) -> bool) -> Option<NodeId> {
        for &child in self.child_nodes(node) {
            if !self.is_element(child) {
                continue;
            }
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = self.find_descendant(child, pred) {
                return Some(found);
            }
        }
        None
    }

    /// Inclusive ancestors, nearest first.
    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = Some(node);
        while let Some(n) = cur {
            out.push(n);
            cur = self.parent(n);
        }
        out
    }
}

fn collect_text<D: Document + ?Sized>(
    doc: &D,
    node: NodeId,
    skip: &mut dyn FnMut(NodeId) -> bool,
    out: &mut String,
) {
    if let Some(t) = doc.text(node) {
        out.push_str(t);
        return;
    }
    for &child in doc.child_nodes(node) {
        if doc.is_element(child) && skip(child) {
            continue;
        }
        collect_text(doc, child, skip, out);
    }
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Page scanning - enumerates visible, reachable interactive elements.
//!
//! The visibility predicate forces layout on a live page, so it only runs
//! inside the poll loop, once per tick.

use std::fmt;

use tracing::trace;

use crate::dom::{Document, NodeId, Rect};
use crate::label::accessible_name;

/// CSS form of the candidate universe, used by the live capture script to
/// decide where to record hit-test probes. Must agree with [`is_candidate`].
pub const CANDIDATE_SELECTOR: &str = "button, a[href], input:not([type=hidden]), select, textarea, \
summary, [role=button], [role=link], [role=menuitem], [role=option], [role=tab], \
[role=checkbox], [role=radio], [role=switch], [role=combobox], [role=listbox], \
[tabindex], [onclick], [data-toggle], [data-bs-toggle], .btn, .button, .dropdown-item, \
.nav-link, .menu-item, .ui-menu-item, .ui-menu-item-wrapper";

const CANDIDATE_TAGS: &[&str] = &["button", "input", "select", "textarea", "summary"];

const CANDIDATE_ROLES: &[&str] = &[
    "button", "link", "menuitem", "option", "tab", "checkbox", "radio", "switch", "combobox",
    "listbox",
];

const CANDIDATE_CLASSES: &[&str] = &[
    "btn",
    "button",
    "dropdown-item",
    "nav-link",
    "menu-item",
    "ui-menu-item",
    "ui-menu-item-wrapper",
];

/// Occlusion sample points are inset this far from each corner.
const CORNER_INSET: f64 = 5.0;

/// A labeled, visible interactive element. Valid for one scan tick only.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub node: NodeId,
    /// Accessible name as computed.
    pub label: String,
    /// Lowercased label used for comparison.
    pub normalized: String,
    /// Coarse widget class, e.g. `button`, `link`, `input-email`.
    pub structural_type: String,
    pub visible: bool,
    pub rect: Rect,
    pub tag: String,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] <{}", self.node, self.tag)?;
        if self.structural_type != self.tag {
            write!(f, " type=\"{}\"", self.structural_type)?;
        }
        write!(f, "> \"{}\"", self.label)
    }
}

/// Scan the document for match candidates, in document order.
pub fn scan<D: Document + ?Sized>(doc: &D) -> Vec<Candidate> {
    let mut out = Vec::new();
    for node in doc.elements() {
        if !is_candidate(doc, node) || !is_visible(doc, node) {
            continue;
        }
        let label = accessible_name(doc, node);
        if label.is_empty() {
            trace!("skipping unlabeled node {}", node);
            continue;
        }
        out.push(Candidate {
            node,
            normalized: label.to_lowercase(),
            label,
            structural_type: structural_type(doc, node),
            visible: true,
            rect: doc.rect(node),
            tag: doc.tag(node).unwrap_or_default().to_string(),
        });
    }
    out
}

/// Whether the node belongs to the (heuristic) interactive universe.
pub fn is_candidate<D: Document + ?Sized>(doc: &D, node: NodeId) -> bool {
    let Some(tag) = doc.tag(node) else {
        return false;
    };
    if tag == "input" && doc.attr(node, "type").map(|t| t.eq_ignore_ascii_case("hidden")) == Some(true)
    {
        return false;
    }
    if CANDIDATE_TAGS.contains(&tag) {
        return true;
    }
    if tag == "a" && doc.attr(node, "href").is_some() {
        return true;
    }
    if let Some(role) = doc.attr(node, "role") {
        if CANDIDATE_ROLES.contains(&role.trim()) {
            return true;
        }
    }
    if doc
        .attr(node, "tabindex")
        .and_then(|t| t.trim().parse::<i32>().ok())
        .map_or(false, |t| t >= 0)
    {
        return true;
    }
    if ["onclick", "data-toggle", "data-bs-toggle"]
        .iter()
        .any(|a| doc.attr(node, a).is_some())
    {
        return true;
    }
    doc.attr(node, "class")
        .map(|c| c.split_whitespace().any(|cls| CANDIDATE_CLASSES.contains(&cls)))
        .unwrap_or(false)
}

/// Full visibility predicate: style, geometry, `aria-hidden`, occlusion.
pub fn is_visible<D: Document + ?Sized>(doc: &D, node: NodeId) -> bool {
    if doc.style(node).is_hidden() {
        return false;
    }
    let ancestors = doc.ancestors(node);
    if ancestors.iter().any(|&a| doc.style(a).display_none) {
        return false;
    }
    let rect = doc.rect(node);
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return false;
    }
    if !doc.viewport().intersects(&rect) {
        return false;
    }
    if ancestors
        .iter()
        .any(|&a| doc.attr(a, "aria-hidden").map(str::trim) == Some("true"))
    {
        return false;
    }
    !is_occluded(doc, node, &rect)
}

/// The five occlusion sample points: center, then corners inset by 5px.
pub fn sample_points(rect: &Rect) -> [(f64, f64); 5] {
    let (cx, cy) = rect.center();
    [
        (cx, cy),
        (rect.left() + CORNER_INSET, rect.top() + CORNER_INSET),
        (rect.right() - CORNER_INSET, rect.top() + CORNER_INSET),
        (rect.left() + CORNER_INSET, rect.bottom() - CORNER_INSET),
        (rect.right() - CORNER_INSET, rect.bottom() - CORNER_INSET),
    ]
}

/// Occluded unless at least one in-viewport sample point hits the node,
/// an ancestor of it, or a descendant of it. No usable point means occluded.
fn is_occluded<D: Document + ?Sized>(doc: &D, node: NodeId, rect: &Rect) -> bool {
    let viewport = doc.viewport();
    for (x, y) in sample_points(rect) {
        if !viewport.contains_point(x, y) {
            continue;
        }
        if let Some(hit) = doc.element_from_point(x, y) {
            if doc.contains(node, hit) || doc.contains(hit, node) {
                return false;
            }
        }
    }
    true
}

/// Coarse widget classification used by the fallback strategies.
pub fn structural_type<D: Document + ?Sized>(doc: &D, node: NodeId) -> String {
    let tag = doc.tag(node).unwrap_or_default();
    let role = doc.attr(node, "role").unwrap_or_default();
    if tag == "input" {
        let ty = doc
            .attr(node, "type")
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text".to_string());
        return format!("input-{}", ty);
    }
    if tag == "button" || role == "button" {
        return "button".into();
    }
    if tag == "a" || role == "link" {
        return "link".into();
    }
    tag.to_string()
}

//! Captured element trees.
//!
//! A [`Snapshot`] is an arena of nodes implementing [`Document`]. Live pages
//! are captured with one JavaScript evaluation per poll tick; tests build
//! synthetic pages with [`SnapshotBuilder`].

use std::collections::HashMap;

use eoka::{Page, Result};
use serde::Deserialize;

use crate::dom::{Document, NodeId, Rect, Style, Viewport};
use crate::observe::CANDIDATE_SELECTOR;

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attrs: HashMap<String, String>,
    style: Style,
    rect: Rect,
    /// Explicit stacking level; inherited from the nearest ancestor that sets one.
    z: Option<i32>,
}

/// One capture of a page. Node ids are only valid within the capture.
#[derive(Debug, Clone)]
pub struct Snapshot {
    nodes: Vec<Node>,
    root: NodeId,
    viewport: Viewport,
    id_index: HashMap<String, NodeId>,
    /// Hit-test results recorded by the browser, keyed by integer pixel.
    probes: HashMap<(i64, i64), Option<NodeId>>,
    generation: u64,
    url: String,
}

impl Snapshot {
    /// Start a synthetic page whose `<body>` covers the viewport.
    pub fn builder(viewport: Viewport) -> SnapshotBuilder {
        SnapshotBuilder::new(viewport)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    fn effective_z(&self, node: NodeId) -> i32 {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if let Some(z) = self.element(n).and_then(|e| e.z) {
                return z;
            }
            cur = self.nodes[n.0].parent;
        }
        0
    }

    /// Rendered for hit testing: no `display:none` ancestor, not `visibility:hidden`.
    fn hit_testable(&self, node: NodeId) -> bool {
        let Some(el) = self.element(node) else {
            return false;
        };
        if el.style.visibility_hidden {
            return false;
        }
        self.ancestors(node)
            .iter()
            .all(|&n| self.element(n).map_or(true, |e| !e.style.display_none))
    }

    fn geometric_hit(&self, x: f64, y: f64) -> Option<NodeId> {
        let mut best: Option<(i32, usize)> = None;
        for (idx, node) in self.nodes.iter().enumerate() {
            let NodeKind::Element(el) = &node.kind else {
                continue;
            };
            let id = NodeId(idx);
            if !el.rect.contains_point(x, y) || !self.hit_testable(id) {
                continue;
            }
            let z = self.effective_z(id);
            // Later document order wins ties, so ">=" on the index.
            if best.map_or(true, |(bz, _)| z >= bz) {
                best = Some((z, idx));
            }
        }
        best.map(|(_, idx)| NodeId(idx))
    }

    fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let NodeKind::Element(el) = &kind {
            if let Some(dom_id) = el.attrs.get("id") {
                self.id_index.entry(dom_id.clone()).or_insert(id);
            }
        }
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    /// Build from the JSON produced by the capture script.
    fn from_raw(raw: RawSnapshot, generation: u64) -> std::result::Result<Self, String> {
        let mut snap = Snapshot {
            nodes: Vec::with_capacity(raw.nodes.len()),
            root: NodeId(0),
            viewport: raw.viewport,
            id_index: HashMap::new(),
            probes: HashMap::new(),
            generation,
            url: raw.url,
        };
        for (idx, node) in raw.nodes.into_iter().enumerate() {
            let parent = match node.p {
                Some(p) if p >= idx => {
                    return Err(format!("node {} has forward parent {}", idx, p));
                }
                Some(p) => Some(NodeId(p)),
                None if idx == 0 => None,
                None => return Err(format!("node {} has no parent", idx)),
            };
            let kind = match node.t {
                Some(tag) => NodeKind::Element(Element {
                    tag: tag.to_lowercase(),
                    attrs: node.a,
                    style: node.s,
                    rect: node.r.map(|[x, y, w, h]| Rect::new(x, y, w, h)).unwrap_or_default(),
                    z: node.z,
                }),
                None => NodeKind::Text(node.x.unwrap_or_default()),
            };
            snap.push_node(parent, kind);
        }
        if snap.nodes.is_empty() {
            return Err("capture returned no nodes".into());
        }
        for (x, y, hit) in raw.probes {
            let hit = hit.filter(|&h| h < snap.nodes.len()).map(NodeId);
            snap.probes.insert((x.round() as i64, y.round() as i64), hit);
        }
        Ok(snap)
    }
}

impl Document for Snapshot {
    fn elements(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Element(_)))
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Text(t) => Some(t.as_str()),
            NodeKind::Element(_) => None,
        }
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.attrs.get(name).map(|s| s.as_str())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }

    fn child_nodes(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    fn style(&self, node: NodeId) -> Style {
        self.element(node).map(|e| e.style).unwrap_or_default()
    }

    fn rect(&self, node: NodeId) -> Rect {
        self.element(node).map(|e| e.rect).unwrap_or_default()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn element_from_point(&self, x: f64, y: f64) -> Option<NodeId> {
        if let Some(hit) = self.probes.get(&(x.round() as i64, y.round() as i64)) {
            return *hit;
        }
        self.geometric_hit(x, y)
    }
}

// =============================================================================
// Synthetic pages
// =============================================================================

/// Element description for [`SnapshotBuilder::push`].
#[derive(Debug, Clone)]
pub struct El {
    tag: String,
    attrs: HashMap<String, String>,
    rect: Rect,
    style: Style,
    z: Option<i32>,
    text: Option<String>,
}

impl El {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            attrs: HashMap::new(),
            rect: Rect::default(),
            style: Style::default(),
            z: None,
            text: None,
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Rect::new(x, y, width, height);
        self
    }

    pub fn z(mut self, z: i32) -> Self {
        self.z = Some(z);
        self
    }

    pub fn display_none(mut self) -> Self {
        self.style.display_none = true;
        self
    }

    pub fn visibility_hidden(mut self) -> Self {
        self.style.visibility_hidden = true;
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.style.opacity = opacity;
        self
    }

    /// Append a single text child.
    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }
}

/// Builds a synthetic [`Snapshot`].
#[derive(Debug)]
pub struct SnapshotBuilder {
    snap: Snapshot,
}

impl SnapshotBuilder {
    pub fn new(viewport: Viewport) -> Self {
        let mut snap = Snapshot {
            nodes: Vec::new(),
            root: NodeId(0),
            viewport,
            id_index: HashMap::new(),
            probes: HashMap::new(),
            generation: 0,
            url: "about:blank".into(),
        };
        snap.push_node(
            None,
            NodeKind::Element(Element {
                tag: "body".into(),
                attrs: HashMap::new(),
                style: Style::default(),
                rect: Rect::new(0.0, 0.0, viewport.width, viewport.height),
                z: None,
            }),
        );
        Self { snap }
    }

    pub fn body(&self) -> NodeId {
        self.snap.root
    }

    pub fn url(mut self, url: &str) -> Self {
        self.snap.url = url.to_string();
        self
    }

    pub fn generation(mut self, generation: u64) -> Self {
        self.snap.generation = generation;
        self
    }

    pub fn push(&mut self, parent: NodeId, el: El) -> NodeId {
        let text = el.text;
        let id = self.snap.push_node(
            Some(parent),
            NodeKind::Element(Element {
                tag: el.tag,
                attrs: el.attrs,
                style: el.style,
                rect: el.rect,
                z: el.z,
            }),
        );
        if let Some(t) = text {
            self.text(id, &t);
        }
        id
    }

    pub fn text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.snap
            .push_node(Some(parent), NodeKind::Text(text.to_string()))
    }

    /// Record a browser hit-test result, overriding geometry at that point.
    pub fn probe(&mut self, x: f64, y: f64, hit: Option<NodeId>) -> &mut Self {
        self.snap
            .probes
            .insert((x.round() as i64, y.round() as i64), hit);
        self
    }

    pub fn build(self) -> Snapshot {
        self.snap
    }
}

// =============================================================================
// Live capture
// =============================================================================

#[derive(Deserialize)]
struct RawSnapshot {
    url: String,
    viewport: Viewport,
    nodes: Vec<RawNode>,
    #[serde(default)]
    probes: Vec<(f64, f64, Option<usize>)>,
}

#[derive(Deserialize)]
struct RawNode {
    p: Option<usize>,
    t: Option<String>,
    x: Option<String>,
    #[serde(default)]
    a: HashMap<String, String>,
    r: Option<[f64; 4]>,
    #[serde(default)]
    s: Style,
    z: Option<i32>,
}

/// Serializes `document.body` and keeps element references page-side in
/// `window.__waymark.nodes`, indexed by node id, for the overlay to use.
const CAPTURE_JS: &str = r#"
((selector, generation, maxNodes) => {
    const state = (window.__waymark = window.__waymark || {});
    const nodes = [];
    const refs = [];
    const SKIP = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE']);
    const BUTTON_TYPES = new Set(['submit', 'button', 'reset', 'image']);

    function zOf(el, cs) {
        if (cs.position === 'static') return null;
        const z = parseInt(cs.zIndex, 10);
        return isNaN(z) ? null : z;
    }

    function visit(node, parent) {
        if (nodes.length >= maxNodes) return;
        if (node.nodeType === 3) {
            if (parent === null) return;
            nodes.push({ p: parent, t: null, x: node.nodeValue || '' });
            refs.push(null);
            return;
        }
        if (node.nodeType !== 1 || SKIP.has(node.tagName)) return;
        if (node.id && node.id.startsWith('__waymark')) return;

        const idx = nodes.length;
        const cs = getComputedStyle(node);
        const r = node.getBoundingClientRect();
        const a = {};
        for (const attr of node.attributes) {
            if (attr.name !== 'value') a[attr.name] = attr.value;
        }
        const tag = node.tagName.toLowerCase();
        if (tag === 'button' || (tag === 'input' && BUTTON_TYPES.has((node.type || '').toLowerCase()))) {
            if (node.value) a.value = node.value;
        }
        nodes.push({
            p: parent,
            t: tag,
            x: null,
            a,
            r: [r.x, r.y, r.width, r.height],
            s: {
                display_none: cs.display === 'none',
                visibility_hidden: cs.visibility === 'hidden',
                opacity: parseFloat(cs.opacity),
            },
            z: zOf(node, cs),
        });
        refs.push(node);
        for (const child of node.childNodes) visit(child, idx);
    }

    visit(document.body, null);

    const index = new Map();
    refs.forEach((el, i) => { if (el) index.set(el, i); });

    const probes = [];
    const vw = window.innerWidth, vh = window.innerHeight;
    for (const el of document.body.querySelectorAll(selector)) {
        if (!index.has(el)) continue;
        const r = el.getBoundingClientRect();
        if (r.width <= 0 || r.height <= 0) continue;
        const points = [
            [r.left + r.width / 2, r.top + r.height / 2],
            [r.left + 5, r.top + 5],
            [r.right - 5, r.top + 5],
            [r.left + 5, r.bottom - 5],
            [r.right - 5, r.bottom - 5],
        ];
        for (const [x, y] of points) {
            if (x < 0 || x > vw || y < 0 || y > vh) continue;
            const hit = document.elementFromPoint(Math.round(x), Math.round(y));
            probes.push([x, y, hit && index.has(hit) ? index.get(hit) : null]);
        }
    }

    state.nodes = refs;
    state.generation = generation;
    return JSON.stringify({
        url: location.href,
        viewport: { width: vw, height: vh },
        nodes,
        probes,
    });
})
"#;

/// Upper bound on captured nodes per tick.
const MAX_CAPTURE_NODES: usize = 20_000;

/// Capture the live page into a [`Snapshot`].
pub async fn capture(page: &Page, generation: u64) -> Result<Snapshot> {
    let js = format!(
        "{}({},{},{})",
        CAPTURE_JS,
        serde_json::to_string(CANDIDATE_SELECTOR).unwrap_or_default(),
        generation,
        MAX_CAPTURE_NODES
    );
    let json_str: String = page.evaluate(&js).await?;
    let raw: RawSnapshot = serde_json::from_str(&json_str)
        .map_err(|e| eoka::Error::CdpSimple(format!("capture parse error: {}", e)))?;
    Snapshot::from_raw(raw, generation)
        .map_err(|e| eoka::Error::CdpSimple(format!("capture error: {}", e)))
}

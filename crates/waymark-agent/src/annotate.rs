//! Spotlight rendering - dims the page around a target and shows the step
//! tooltip with playback controls.
//!
//! Geometry is computed here so it can be tested without a browser. The live
//! overlay script recomputes the same formulas on scroll, resize, and for a
//! bounded number of settle ticks after placement.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use eoka::{Page, Result};
use serde::Serialize;
use tracing::debug;

use crate::dom::{NodeId, Rect, Viewport};

/// Default spacing between a target and the hole edge.
pub const DEFAULT_PADDING: f64 = 8.0;
const HOLE_RADIUS: f64 = 8.0;
const RING_GROW: f64 = 5.0;
const AREA_GROW: f64 = 10.0;
/// Targets lower than this get the tooltip above them.
const ABOVE_THRESHOLD: f64 = 200.0;
const TOOLTIP_GAP: f64 = 10.0;
const TOOLTIP_MARGIN: f64 = 10.0;
/// Tooltip width plus right margin.
const TOOLTIP_RESERVE: f64 = 340.0;

/// sessionStorage key holding queued user controls.
pub const CONTROL_QUEUE_KEY: &str = "waymark_controls";

/// Where the tooltip goes relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TooltipPlacement {
    /// Render above the target, anchored by `bottom`.
    pub above: bool,
    /// Distance from the viewport top (used when below).
    pub top: f64,
    /// Distance from the viewport bottom (used when above).
    pub bottom: f64,
    pub left: f64,
}

impl TooltipPlacement {
    pub fn near(rect: &Rect, viewport: &Viewport) -> Self {
        let above = rect.top() > ABOVE_THRESHOLD;
        let left = rect
            .left()
            .min(viewport.width - TOOLTIP_RESERVE)
            .max(TOOLTIP_MARGIN);
        Self {
            above,
            top: rect.bottom() + TOOLTIP_GAP,
            bottom: viewport.height - rect.top() + TOOLTIP_GAP,
            left,
        }
    }
}

/// Cut-out, ring and tooltip position for one highlight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpotlightGeometry {
    pub hole: Rect,
    pub hole_radius: f64,
    pub ring: Rect,
    /// Area highlights use a dashed ring.
    pub dashed: bool,
    pub tooltip: TooltipPlacement,
}

impl SpotlightGeometry {
    /// Single element highlight.
    pub fn for_target(rect: Rect, viewport: Viewport, padding: f64) -> Self {
        Self {
            hole: rect.inflate(padding),
            hole_radius: HOLE_RADIUS,
            ring: rect.inflate(RING_GROW),
            dashed: false,
            tooltip: TooltipPlacement::near(&rect, &viewport),
        }
    }

    /// Region spanning two endpoints. The area already includes its margin,
    /// so the hole takes no extra padding.
    pub fn for_area(start: Rect, end: Rect, viewport: Viewport) -> Self {
        let area = start.union(&end).inflate(AREA_GROW);
        Self {
            hole: area,
            hole_radius: HOLE_RADIUS,
            ring: area,
            dashed: true,
            tooltip: TooltipPlacement::near(&area, &viewport),
        }
    }
}

/// What a highlight points at, addressed within one capture generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub generation: u64,
    pub target: NodeId,
    pub end: Option<NodeId>,
    pub geometry: SpotlightGeometry,
}

/// Tooltip content beside a spotlight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub title: String,
    /// e.g. "Step 2 of 5".
    pub progress: String,
    pub description: String,
    pub instruction: Option<String>,
    /// Set when the element was found by something other than an exact label.
    pub strategy_note: Option<String>,
    pub can_prev: bool,
    pub can_skip: bool,
}

/// A selectable entry point on the welcome card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryPoint {
    pub index: usize,
    pub label: String,
}

/// Everything the presenter can show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Overlay {
    Welcome {
        title: String,
        description: String,
        step_count: usize,
        entry_points: Vec<EntryPoint>,
    },
    Spotlight {
        highlight: Highlight,
        tooltip: Tooltip,
    },
    LocalAction {
        title: String,
        progress: String,
        /// `local_action`, `navigate` or `wait`.
        step_type: String,
        description: String,
        instruction: Option<String>,
        url: Option<String>,
        can_prev: bool,
    },
    WrongUrl {
        current: String,
        expected: String,
    },
    NotFound {
        description: String,
        trigger: String,
    },
    Completed {
        title: String,
    },
}

impl Overlay {
    pub fn kind(&self) -> &'static str {
        match self {
            Overlay::Welcome { .. } => "welcome",
            Overlay::Spotlight { .. } => "spotlight",
            Overlay::LocalAction { .. } => "local_action",
            Overlay::WrongUrl { .. } => "wrong_url",
            Overlay::NotFound { .. } => "not_found",
            Overlay::Completed { .. } => "completed",
        }
    }
}

/// A user input coming back from the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Start(usize),
    Prev,
    Skip,
    Done,
    TargetClick,
    Retry,
    Cancel,
    Navigate,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Start(i) => write!(f, "start:{}", i),
            Control::Prev => f.write_str("prev"),
            Control::Skip => f.write_str("skip"),
            Control::Done => f.write_str("done"),
            Control::TargetClick => f.write_str("target_click"),
            Control::Retry => f.write_str("retry"),
            Control::Cancel => f.write_str("cancel"),
            Control::Navigate => f.write_str("navigate"),
        }
    }
}

impl FromStr for Control {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(idx) = s.strip_prefix("start:") {
            return idx
                .parse()
                .map(Control::Start)
                .map_err(|_| format!("bad start index: {}", idx));
        }
        match s {
            "start" => Ok(Control::Start(0)),
            "prev" | "back" => Ok(Control::Prev),
            "skip" => Ok(Control::Skip),
            "done" | "next" => Ok(Control::Done),
            "target_click" => Ok(Control::TargetClick),
            "retry" => Ok(Control::Retry),
            "cancel" | "close" => Ok(Control::Cancel),
            "navigate" => Ok(Control::Navigate),
            other => Err(format!("unknown control: {}", other)),
        }
    }
}

/// Renders overlays and reports user input.
#[async_trait(?Send)]
pub trait Presenter {
    /// Replace whatever is showing with `overlay`.
    async fn present(&mut self, overlay: &Overlay) -> Result<()>;

    /// Tear down the overlay and every listener it attached. Idempotent.
    async fn remove(&mut self) -> Result<()>;

    /// Next queued control, if the user produced one.
    async fn next_control(&mut self) -> Result<Option<Control>>;
}

/// Live overlay settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayOptions {
    pub padding: f64,
    pub settle_ticks: u32,
    pub settle_interval_ms: u64,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            settle_ticks: 20,
            settle_interval_ms: 50,
        }
    }
}

/// Presenter that injects the overlay into a live page.
pub struct PageOverlay<'a> {
    page: &'a Page,
    opts: OverlayOptions,
}

impl<'a> PageOverlay<'a> {
    pub fn new(page: &'a Page, opts: OverlayOptions) -> Self {
        Self { page, opts }
    }
}

#[async_trait(?Send)]
impl Presenter for PageOverlay<'_> {
    async fn present(&mut self, overlay: &Overlay) -> Result<()> {
        let opts = serde_json::json!({
            "padding": self.opts.padding,
            "settleTicks": self.opts.settle_ticks,
            "settleIntervalMs": self.opts.settle_interval_ms,
            "queueKey": CONTROL_QUEUE_KEY,
        });
        let data = serde_json::to_string(overlay)
            .map_err(|e| eoka::Error::CdpSimple(format!("overlay encode error: {}", e)))?;
        debug!("presenting {} overlay", overlay.kind());
        self.page
            .execute(&format!("{}({},{})", OVERLAY_JS, data, opts))
            .await
    }

    async fn remove(&mut self) -> Result<()> {
        self.page
            .execute("window.__waymark && window.__waymark.teardown && window.__waymark.teardown()")
            .await
    }

    async fn next_control(&mut self) -> Result<Option<Control>> {
        let js = format!(
            r#"(() => {{
    const st = window.__waymark || {{}};
    if (st.controls && st.controls.length) return st.controls.shift();
    try {{
        const q = JSON.parse(sessionStorage.getItem({key}) || '[]');
        if (!q.length) return '';
        const c = q.shift();
        sessionStorage.setItem({key}, JSON.stringify(q));
        return c;
    }} catch (e) {{ return ''; }}
}})()"#,
            key = serde_json::to_string(CONTROL_QUEUE_KEY).unwrap_or_default()
        );
        let raw: String = self.page.evaluate(&js).await?;
        if raw.is_empty() {
            return Ok(None);
        }
        match raw.parse() {
            Ok(c) => Ok(Some(c)),
            Err(e) => {
                debug!("ignoring control: {}", e);
                Ok(None)
            }
        }
    }
}

const OVERLAY_JS: &str = r#"
((data, opts) => {
    const state = (window.__waymark = window.__waymark || {});
    if (state.teardown) state.teardown();

    const cleanups = [];
    const on = (target, type, fn, capture) => {
        target.addEventListener(type, fn, capture);
        cleanups.push(() => target.removeEventListener(type, fn, capture));
    };
    const push = (control) => {
        try {
            const q = JSON.parse(sessionStorage.getItem(opts.queueKey) || '[]');
            q.push(control);
            sessionStorage.setItem(opts.queueKey, JSON.stringify(q));
        } catch (e) {
            (state.controls = state.controls || []).push(control);
        }
    };
    const mk = (tag, css, text) => {
        const e = document.createElement(tag);
        if (css) e.style.cssText = css;
        if (text != null) e.textContent = text;
        return e;
    };

    const root = mk('div', 'position:fixed;inset:0;z-index:2147483640;pointer-events:none;font:14px/1.45 system-ui,sans-serif;color:#222;');
    root.id = '__waymark_root';
    cleanups.push(() => root.remove());
    on(root, 'click', (e) => {
        const b = e.target && e.target.closest ? e.target.closest('[data-control]') : null;
        if (!b) return;
        e.preventDefault();
        e.stopPropagation();
        push(b.dataset.control);
    }, false);

    const button = (label, control, primary) => {
        const b = mk('button', 'pointer-events:auto;margin-left:8px;padding:6px 12px;border-radius:6px;cursor:pointer;border:1px solid ' +
            (primary ? '#2e7d32;background:#2e7d32;color:#fff;' : '#bbb;background:#fff;color:#333;'), label);
        b.dataset.control = control;
        return b;
    };
    const card = (css) => mk('div', 'position:fixed;pointer-events:auto;background:#fff;border-radius:10px;' +
        'box-shadow:0 8px 32px rgba(0,0,0,.35);padding:16px 20px;max-width:320px;' + css);
    const row = (parent, buttons) => {
        const r = mk('div', 'margin-top:16px;text-align:right;');
        buttons.filter(Boolean).forEach((b) => r.appendChild(b));
        parent.appendChild(r);
    };
    const centered = () => {
        root.appendChild(mk('div', 'position:fixed;inset:0;background:rgba(0,0,0,.6);pointer-events:auto;'));
        const c = card('left:50%;top:50%;transform:translate(-50%,-50%);max-width:440px;text-align:center;');
        root.appendChild(c);
        return c;
    };

    const geometry = (r, vw, vh, padding, area) => {
        if (area) {
            r = { x: r.x - 10, y: r.y - 10, width: r.width + 20, height: r.height + 20 };
        }
        const grow = (g) => ({ x: r.x - g, y: r.y - g, width: r.width + 2 * g, height: r.height + 2 * g });
        return {
            hole: grow(area ? 0 : padding),
            hole_radius: 8,
            ring: area ? r : grow(5),
            dashed: area,
            tooltip: {
                above: r.y > 200,
                top: r.y + r.height + 10,
                bottom: vh - r.y + 10,
                left: Math.max(10, Math.min(r.x, vw - 340)),
            },
        };
    };

    function spotlight(h, t) {
        const refs = state.generation === h.generation ? state.nodes || [] : [];
        const start = refs[h.target] || null;
        const end = h.end != null ? refs[h.end] || null : null;

        const ns = 'http://www.w3.org/2000/svg';
        const svg = document.createElementNS(ns, 'svg');
        svg.setAttribute('width', '100%');
        svg.setAttribute('height', '100%');
        svg.style.cssText = 'position:fixed;inset:0;';
        const mask = document.createElementNS(ns, 'mask');
        mask.setAttribute('id', '__waymark_mask');
        const bg = document.createElementNS(ns, 'rect');
        bg.setAttribute('width', '100%');
        bg.setAttribute('height', '100%');
        bg.setAttribute('fill', 'white');
        const hole = document.createElementNS(ns, 'rect');
        hole.setAttribute('fill', 'black');
        mask.appendChild(bg);
        mask.appendChild(hole);
        const defs = document.createElementNS(ns, 'defs');
        defs.appendChild(mask);
        svg.appendChild(defs);
        const dim = document.createElementNS(ns, 'rect');
        dim.setAttribute('width', '100%');
        dim.setAttribute('height', '100%');
        dim.setAttribute('fill', 'rgba(0,0,0,0.6)');
        dim.setAttribute('mask', 'url(#__waymark_mask)');
        svg.appendChild(dim);
        root.appendChild(svg);

        const ring = mk('div', 'position:fixed;border:3px solid #43a047;border-radius:6px;box-shadow:0 0 0 4px rgba(67,160,71,.3);');
        root.appendChild(ring);

        const tip = card('width:300px;');
        tip.appendChild(mk('div', 'font-weight:600;margin-bottom:4px;', t.title));
        tip.appendChild(mk('div', 'font-size:12px;color:#777;margin-bottom:8px;', t.progress));
        tip.appendChild(mk('div', '', t.description));
        if (t.instruction) tip.appendChild(mk('div', 'margin-top:8px;padding:8px;background:#f5f5f5;border-radius:6px;', t.instruction));
        if (t.strategy_note) tip.appendChild(mk('div', 'margin-top:8px;font-size:12px;color:#999;', t.strategy_note));
        row(tip, [
            t.can_prev && button('Back', 'prev'),
            t.can_skip && button('Skip', 'skip'),
            button('Done', 'done', true),
        ]);
        root.appendChild(tip);

        const place = (g) => {
            hole.setAttribute('x', g.hole.x);
            hole.setAttribute('y', g.hole.y);
            hole.setAttribute('width', g.hole.width);
            hole.setAttribute('height', g.hole.height);
            hole.setAttribute('rx', g.hole_radius);
            ring.style.left = g.ring.x + 'px';
            ring.style.top = g.ring.y + 'px';
            ring.style.width = g.ring.width + 'px';
            ring.style.height = g.ring.height + 'px';
            ring.style.borderStyle = g.dashed ? 'dashed' : 'solid';
            tip.style.left = g.tooltip.left + 'px';
            tip.style.top = g.tooltip.above ? 'auto' : g.tooltip.top + 'px';
            tip.style.bottom = g.tooltip.above ? g.tooltip.bottom + 'px' : 'auto';
        };
        const measure = () => {
            const a = start.getBoundingClientRect();
            let r = { x: a.left, y: a.top, width: a.width, height: a.height };
            if (end) {
                const b = end.getBoundingClientRect();
                const x = Math.min(a.left, b.left), y = Math.min(a.top, b.top);
                r = { x, y, width: Math.max(a.right, b.right) - x, height: Math.max(a.bottom, b.bottom) - y };
            }
            return geometry(r, window.innerWidth, window.innerHeight, opts.padding, !!end);
        };

        place(h.geometry);
        if (!start) return;

        const update = () => place(measure());
        start.scrollIntoView({ behavior: 'smooth', block: 'center' });
        on(window, 'scroll', update, true);
        on(window, 'resize', update, false);
        let ticks = 0;
        const timer = setInterval(() => {
            update();
            if (++ticks >= opts.settleTicks) clearInterval(timer);
        }, opts.settleIntervalMs);
        cleanups.push(() => clearInterval(timer));
        on(start, 'click', () => push('target_click'), true);
    }

    switch (data.kind) {
        case 'welcome': {
            const c = centered();
            c.appendChild(mk('h2', 'margin:0 0 8px;', data.title));
            if (data.description) c.appendChild(mk('p', '', data.description));
            c.appendChild(mk('p', 'font-size:12px;color:#777;', data.step_count + ' steps'));
            if (data.entry_points.length) {
                const list = mk('div', 'margin-top:12px;text-align:left;');
                data.entry_points.forEach((ep) => {
                    const b = button((ep.index + 1) + '. ' + ep.label, 'start:' + ep.index);
                    b.style.cssText += 'display:block;width:100%;margin:4px 0;text-align:left;';
                    list.appendChild(b);
                });
                c.appendChild(list);
            }
            row(c, [button('Cancel', 'cancel'), button('Start', 'start:0', true)]);
            break;
        }
        case 'spotlight':
            spotlight(data.highlight, data.tooltip);
            break;
        case 'local_action': {
            const c = centered();
            const icon = { navigate: '\u{1F517}', wait: '\u{23F3}' }[data.step_type] || '\u{1F4C1}';
            c.appendChild(mk('div', 'font-size:36px;', icon));
            c.appendChild(mk('h3', 'margin:8px 0;', data.description));
            if (data.instruction) c.appendChild(mk('div', 'margin:12px 0;padding:12px;background:#f5f5f5;border-radius:8px;text-align:left;', data.instruction));
            if (data.url) c.appendChild(mk('div', 'font:12px monospace;word-break:break-all;color:#555;', data.url));
            c.appendChild(mk('p', 'font-size:12px;color:#777;', data.progress));
            row(c, [data.can_prev && button('Back', 'prev'), button('Done', 'done', true)]);
            break;
        }
        case 'wrong_url': {
            const c = centered();
            c.appendChild(mk('h3', 'margin:0 0 8px;color:#f57c00;', 'Different page expected'));
            c.appendChild(mk('p', '', 'You are on:'));
            c.appendChild(mk('div', 'font:12px monospace;word-break:break-all;background:#f5f5f5;padding:8px;border-radius:6px;', data.current.slice(0, 80)));
            c.appendChild(mk('p', '', 'This step expects:'));
            c.appendChild(mk('div', 'font:12px monospace;word-break:break-all;background:#e8f5e9;padding:8px;border-radius:6px;', data.expected));
            row(c, [button('Cancel', 'cancel'), button('Go to page', 'navigate', true)]);
            break;
        }
        case 'not_found': {
            const c = card('right:20px;bottom:20px;border-left:4px solid #e53935;');
            root.appendChild(c);
            c.appendChild(mk('div', 'font-weight:600;', 'Element not found'));
            c.appendChild(mk('p', '', data.description));
            c.appendChild(mk('div', 'font:12px monospace;', 'Searched: "' + (data.trigger || '-') + '"'));
            row(c, [button('Retry', 'retry'), button('Skip', 'skip'), button('Cancel', 'cancel')]);
            break;
        }
        case 'completed': {
            const c = centered();
            c.appendChild(mk('div', 'font-size:36px;', '\u{1F389}'));
            c.appendChild(mk('h2', 'margin:8px 0;', 'All done!'));
            c.appendChild(mk('p', '', 'You finished ' + data.title + '.'));
            row(c, [button('Close', 'cancel', true)]);
            break;
        }
    }

    document.body.appendChild(root);
    state.teardown = () => {
        state.teardown = null;
        cleanups.splice(0).reverse().forEach((f) => { try { f(); } catch (e) {} });
    };
})
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_geometry_below_near_top() {
        let vp = Viewport::new(1280.0, 720.0);
        let g = SpotlightGeometry::for_target(Rect::new(100.0, 50.0, 80.0, 30.0), vp, 8.0);
        assert_eq!(g.hole, Rect::new(92.0, 42.0, 96.0, 46.0));
        assert_eq!(g.ring, Rect::new(95.0, 45.0, 90.0, 40.0));
        assert_eq!(g.hole_radius, 8.0);
        assert!(!g.dashed);
        assert!(!g.tooltip.above);
        assert_eq!(g.tooltip.top, 90.0);
        assert_eq!(g.tooltip.left, 100.0);
    }

    #[test]
    fn tooltip_above_low_targets_and_clamped() {
        let vp = Viewport::new(1000.0, 800.0);
        let g = SpotlightGeometry::for_target(Rect::new(900.0, 500.0, 80.0, 30.0), vp, 8.0);
        assert!(g.tooltip.above);
        assert_eq!(g.tooltip.bottom, 310.0);
        assert_eq!(g.tooltip.left, 660.0);

        let g = SpotlightGeometry::for_target(Rect::new(-40.0, 10.0, 80.0, 30.0), vp, 8.0);
        assert_eq!(g.tooltip.left, 10.0);
    }

    #[test]
    fn area_geometry_unions_and_grows() {
        let vp = Viewport::default();
        let g = SpotlightGeometry::for_area(
            Rect::new(100.0, 100.0, 50.0, 20.0),
            Rect::new(300.0, 260.0, 40.0, 20.0),
            vp,
        );
        assert_eq!(g.hole, Rect::new(90.0, 90.0, 260.0, 200.0));
        assert_eq!(g.ring, g.hole);
        assert!(g.dashed);
    }

    #[test]
    fn control_round_trip_and_aliases() {
        for c in [
            Control::Start(3),
            Control::Prev,
            Control::Skip,
            Control::Done,
            Control::TargetClick,
            Control::Retry,
            Control::Cancel,
            Control::Navigate,
        ] {
            assert_eq!(c.to_string().parse::<Control>(), Ok(c));
        }
        assert_eq!("next".parse::<Control>(), Ok(Control::Done));
        assert_eq!("start".parse::<Control>(), Ok(Control::Start(0)));
        assert!("start:x".parse::<Control>().is_err());
        assert!("jump".parse::<Control>().is_err());
    }

    #[test]
    fn overlay_serializes_with_kind_tag() {
        let o = Overlay::NotFound {
            description: "Open settings".into(),
            trigger: "Settings|Einstellungen".into(),
        };
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["kind"], "not_found");
        assert_eq!(v["trigger"], "Settings|Einstellungen");
        assert_eq!(o.kind(), "not_found");
    }
}

//! Accessible-name computation: the label a screen-reader user would hear.
//!
//! This is a heuristic priority chain, not the full ARIA name algorithm.
//! The recorder derives step triggers with the same function, so any change
//! here changes what old recordings resolve to.

use crate::dom::{collapse_whitespace, Document, NodeId};

/// Final-fallback text is cut to this many characters.
const MAX_FALLBACK_CHARS: usize = 100;

const FORM_CONTROLS: &[&str] = &["input", "select", "textarea"];
const BUTTON_INPUT_TYPES: &[&str] = &["submit", "button", "reset", "image"];

/// Compute the accessible name of `node`. Always trimmed and
/// whitespace-collapsed; empty means the node is unlabeled.
pub fn accessible_name<D: Document + ?Sized>(doc: &D, node: NodeId) -> String {
    let Some(tag) = doc.tag(node) else {
        return String::new();
    };

    // 1. aria-label
    if let Some(name) = non_empty(doc.attr(node, "aria-label")) {
        return name;
    }

    // 2. aria-labelledby
    if let Some(ids) = doc.attr(node, "aria-labelledby") {
        let parts: Vec<String> = ids
            .split_whitespace()
            .filter_map(|id| doc.element_by_id(id))
            .map(|el| collapse_whitespace(&doc.text_content(el)))
            .filter(|t| !t.is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(" ");
        }
    }

    let button_like = is_button_like(doc, node);

    // 3. Form controls
    if FORM_CONTROLS.contains(&tag) && !button_like {
        if let Some(name) = form_control_name(doc, node) {
            return name;
        }
    }

    // 4. Buttons
    if button_like {
        if let Some(name) = non_empty(doc.attr(node, "value")) {
            return name;
        }
        if let Some(name) = non_empty(Some(&doc.direct_text(node))) {
            return name;
        }
        if let Some(name) = non_empty(doc.attr(node, "title")) {
            return name;
        }
    }

    // 5. Links and link/button roles
    let role = doc.attr(node, "role");
    if tag == "a" || matches!(role, Some("button") | Some("link")) {
        if let Some(name) = non_empty(Some(&doc.text_content(node))) {
            return name;
        }
        let img = doc.find_descendant(node, &mut |n| doc.tag(n) == Some("img"));
        if let Some(name) = non_empty(img.and_then(|i| doc.attr(i, "alt"))) {
            return name;
        }
        if let Some(name) = non_empty(doc.attr(node, "title")) {
            return name;
        }
    }

    // 6. title
    if let Some(name) = non_empty(doc.attr(node, "title")) {
        return name;
    }

    // 7. text content
    truncate_chars(&collapse_whitespace(&doc.text_content(node)), MAX_FALLBACK_CHARS)
}

/// `<button>` or an `<input>` whose type renders as a button.
pub fn is_button_like<D: Document + ?Sized>(doc: &D, node: NodeId) -> bool {
    match doc.tag(node) {
        Some("button") => true,
        Some("input") => doc
            .attr(node, "type")
            .map(|t| BUTTON_INPUT_TYPES.contains(&t.to_ascii_lowercase().as_str()))
            .unwrap_or(false),
        _ => false,
    }
}

fn form_control_name<D: Document + ?Sized>(doc: &D, node: NodeId) -> Option<String> {
    if let Some(id) = doc.attr(node, "id").filter(|id| !id.is_empty()) {
        let label = doc.elements().into_iter().find(|&el| {
            doc.tag(el) == Some("label") && doc.attr(el, "for") == Some(id)
        });
        if let Some(name) = label.and_then(|l| non_empty(Some(&doc.text_content(l)))) {
            return Some(name);
        }
    }

    if let Some(label) = doc.closest(node, "label") {
        let text = doc.text_content_except(label, &mut |n| {
            doc.tag(n).map_or(false, |t| FORM_CONTROLS.contains(&t))
        });
        if let Some(name) = non_empty(Some(&text)) {
            return Some(name);
        }
    }

    if let Some(name) = non_empty(doc.attr(node, "placeholder")) {
        return Some(name);
    }

    doc.attr(node, "name")
        .map(|n| n.replace(['_', '-', '.', '[', ']'], " "))
        .and_then(|n| non_empty(Some(&n)))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    let collapsed = collapse_whitespace(s?);
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Viewport;
    use crate::snapshot::{El, Snapshot, SnapshotBuilder};

    fn builder() -> SnapshotBuilder {
        Snapshot::builder(Viewport::default())
    }

    #[test]
    fn aria_label_wins() {
        let mut b = builder();
        let body = b.body();
        let btn = b.push(body, El::new("button").attr("aria-label", "  Close   dialog ").text("X"));
        let snap = b.build();
        assert_eq!(accessible_name(&snap, btn), "Close dialog");
    }

    #[test]
    fn labelledby_joins_and_skips_missing() {
        let mut b = builder();
        let body = b.body();
        b.push(body, El::new("span").id("a").text(" Billing "));
        b.push(body, El::new("span").id("b").text("address"));
        let input = b.push(body, El::new("input").attr("aria-labelledby", "a missing b"));
        let snap = b.build();
        assert_eq!(accessible_name(&snap, input), "Billing address");
    }

    #[test]
    fn input_label_for() {
        let mut b = builder();
        let body = b.body();
        b.push(body, El::new("label").attr("for", "email").text("E-Mail"));
        let input = b.push(body, El::new("input").id("email").attr("placeholder", "you@x"));
        let snap = b.build();
        assert_eq!(accessible_name(&snap, input), "E-Mail");
    }

    #[test]
    fn wrapping_label_strips_control_text() {
        let mut b = builder();
        let body = b.body();
        let label = b.push(body, El::new("label"));
        b.text(label, "Remember me ");
        let select = b.push(label, El::new("select"));
        b.push(select, El::new("option").text("Yes"));
        let snap = b.build();
        assert_eq!(accessible_name(&snap, select), "Remember me");
    }

    #[test]
    fn placeholder_then_name() {
        let mut b = builder();
        let body = b.body();
        let a = b.push(body, El::new("input").attr("placeholder", "Search..."));
        let c = b.push(body, El::new("input").attr("name", "user_first-name"));
        let snap = b.build();
        assert_eq!(accessible_name(&snap, a), "Search...");
        assert_eq!(accessible_name(&snap, c), "user first name");
    }

    #[test]
    fn submit_input_uses_value_not_name() {
        let mut b = builder();
        let body = b.body();
        let input = b.push(
            body,
            El::new("input")
                .attr("type", "submit")
                .attr("name", "commit")
                .attr("value", "Sign in"),
        );
        let snap = b.build();
        assert_eq!(accessible_name(&snap, input), "Sign in");
    }

    #[test]
    fn button_direct_text_excludes_nested_markup() {
        let mut b = builder();
        let body = b.body();
        let btn = b.push(body, El::new("button"));
        b.push(btn, El::new("span").attr("class", "icon").text("*"));
        b.text(btn, " Save ");
        let snap = b.build();
        assert_eq!(accessible_name(&snap, btn), "Save");
    }

    #[test]
    fn button_with_only_nested_text_falls_through() {
        let mut b = builder();
        let body = b.body();
        let btn = b.push(body, El::new("button"));
        b.push(btn, El::new("span").text("Export"));
        let snap = b.build();
        assert_eq!(accessible_name(&snap, btn), "Export");
    }

    #[test]
    fn icon_link_uses_img_alt() {
        let mut b = builder();
        let body = b.body();
        let a = b.push(body, El::new("a").attr("href", "/").attr("title", "Home page"));
        b.push(a, El::new("img").attr("alt", "Logo"));
        let snap = b.build();
        assert_eq!(accessible_name(&snap, a), "Logo");
    }

    #[test]
    fn title_fallback_and_truncation() {
        let mut b = builder();
        let body = b.body();
        let t = b.push(body, El::new("div").attr("title", "Settings"));
        let long = "word ".repeat(40);
        let d = b.push(body, El::new("div").text(&long));
        let snap = b.build();
        assert_eq!(accessible_name(&snap, t), "Settings");
        let name = accessible_name(&snap, d);
        assert!(name.chars().count() <= 100);
        assert!(name.starts_with("word word"));
    }

    #[test]
    fn unlabeled_is_empty() {
        let mut b = builder();
        let body = b.body();
        let div = b.push(body, El::new("div").attr("tabindex", "0"));
        let snap = b.build();
        assert_eq!(accessible_name(&snap, div), "");
    }
}

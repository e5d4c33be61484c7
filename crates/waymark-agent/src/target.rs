//! Trigger matching - relocates a step's target among scanned candidates.
//!
//! A trigger may hold `|`-separated alternatives. Each alternative runs the
//! full strategy chain (exact, scored, structural, generic type) before the
//! next alternative is tried.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::dom::{collapse_whitespace, NodeId};
use crate::observe::Candidate;

/// Score assigned to a case-insensitive exact label match.
pub const EXACT_SCORE: u32 = 1000;

/// Default per-step threshold.
pub const DEFAULT_THRESHOLD: u8 = 50;

/// Which strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Exact,
    Partial,
    WordsAll,
    WordsPartial,
    Structural,
    TypeButton,
    TypeLink,
    TypeInput,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Exact => "exact",
            Strategy::Partial => "partial",
            Strategy::WordsAll => "words-all",
            Strategy::WordsPartial => "words-partial",
            Strategy::Structural => "structural",
            Strategy::TypeButton => "type-button",
            Strategy::TypeLink => "type-link",
            Strategy::TypeInput => "type-input",
        }
    }

    /// Name the scored strategy by the score it reached.
    fn banded(score: u32) -> Self {
        if score >= 150 {
            Strategy::Partial
        } else if score >= 100 {
            Strategy::WordsAll
        } else {
            Strategy::WordsPartial
        }
    }

    /// Fallbacks pick by widget class, not by label.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Strategy::Structural | Strategy::TypeButton | Strategy::TypeLink | Strategy::TypeInput
        )
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub node: NodeId,
    pub strategy: Strategy,
    /// Winning score; 0 for the fallback strategies.
    pub score: u32,
    /// The alternative that matched.
    pub alternative: String,
}

/// Split a trigger into trimmed, non-empty alternatives, in order.
pub fn alternatives(trigger: &str) -> Vec<&str> {
    trigger
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercase alphanumeric runs longer than two characters.
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Minimum accepted score for a threshold in `[0, 100]`.
pub fn min_score(threshold: u8) -> u32 {
    // 50 + (threshold - 50), kept in that form so the default reads as 50.
    (50 + (i32::from(threshold.min(100)) - 50)) as u32
}

/// Score `label` (already lowercase) against a lowercase search string.
pub fn score(search: &str, search_tokens: &[String], label: &str) -> u32 {
    if label == search {
        return EXACT_SCORE;
    }
    let mut score = 0u32;

    if !label.is_empty() && label.contains(search) {
        score += 100;
        let ratio = search.chars().count() as f64 / label.chars().count() as f64;
        score += (ratio * 50.0).round() as u32;
    }

    if !search_tokens.is_empty() {
        let mut matched = 0usize;
        for token in search_tokens {
            if label.contains(token.as_str()) {
                matched += 1;
                score += token.chars().count() as u32;
            }
        }
        score += (matched as f64 / search_tokens.len() as f64 * 80.0).round() as u32;
        if matched == search_tokens.len() {
            score += 50;
        }

        let label_tokens = tokens(label);
        if !label_tokens.is_empty() {
            let found = label_tokens
                .iter()
                .filter(|t| search.contains(t.as_str()))
                .count();
            score += (found as f64 / label_tokens.len() as f64 * 30.0).round() as u32;
        }
    }

    score
}

struct StructuralRule {
    pattern: Regex,
    types: &'static [&'static str],
}

fn structural_rules() -> &'static [StructuralRule] {
    static RULES: OnceLock<Vec<StructuralRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(?i)bearbeiten|edit|ändern", &["button", "link"][..]),
            (r"(?i)speichern|save", &["button", "input-submit"][..]),
            (r"(?i)löschen|delete|entfernen", &["button", "link"][..]),
            (r"(?i)suche|search", &["input-text", "input-search"][..]),
            (r"(?i)name|namen", &["input-text"][..]),
            (r"(?i)email|e-mail", &["input-email", "input-text"][..]),
            (r"(?i)passwort|password", &["input-password"][..]),
            (r"(?i)weiter|next|fortfahren", &["button", "input-submit"][..]),
            (r"(?i)zurück|back|abbrechen|cancel", &["button", "link"][..]),
        ]
        .into_iter()
        .filter_map(|(pattern, types)| {
            Regex::new(pattern)
                .ok()
                .map(|pattern| StructuralRule { pattern, types })
        })
        .collect()
    })
}

fn generic_type_rules() -> &'static [(Regex, Strategy)] {
    static RULES: OnceLock<Vec<(Regex, Strategy)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(?i)button|schaltfläche|knopf", Strategy::TypeButton),
            (r"(?i)link|verweis", Strategy::TypeLink),
            (r"(?i)eingabe|feld|input", Strategy::TypeInput),
        ]
        .into_iter()
        .filter_map(|(p, s)| Regex::new(p).ok().map(|r| (r, s)))
        .collect()
    })
}

fn matches_generic(strategy: Strategy, structural_type: &str) -> bool {
    match strategy {
        Strategy::TypeButton => structural_type == "button",
        Strategy::TypeLink => structural_type == "link",
        Strategy::TypeInput => structural_type.starts_with("input-"),
        _ => false,
    }
}

/// Resolve a full trigger (all alternatives) against one scan.
pub fn resolve(trigger: &str, threshold: u8, candidates: &[Candidate]) -> Option<MatchResult> {
    for alt in alternatives(trigger) {
        if let Some(found) = resolve_alternative(alt, threshold, candidates) {
            debug!(
                "matched {:?} -> node {} via {} (score {})",
                alt, found.node, found.strategy, found.score
            );
            return Some(found);
        }
    }
    None
}

/// Run the strategy chain for a single alternative.
pub fn resolve_alternative(
    alternative: &str,
    threshold: u8,
    candidates: &[Candidate],
) -> Option<MatchResult> {
    let search = collapse_whitespace(alternative).to_lowercase();
    if search.is_empty() {
        return None;
    }
    let hit = |node: NodeId, strategy: Strategy, score: u32| MatchResult {
        node,
        strategy,
        score,
        alternative: alternative.to_string(),
    };

    if let Some(c) = candidates.iter().find(|c| c.normalized == search) {
        return Some(hit(c.node, Strategy::Exact, EXACT_SCORE));
    }

    let search_tokens = tokens(&search);
    let mut best: Option<(&Candidate, u32)> = None;
    for c in candidates {
        let s = score(&search, &search_tokens, &c.normalized);
        if s > best.map_or(0, |(_, b)| b) {
            best = Some((c, s));
        }
    }
    if let Some((c, s)) = best {
        if s >= min_score(threshold) {
            return Some(hit(c.node, Strategy::banded(s), s));
        }
        debug!("best score {} for {:?} below {}", s, alternative, min_score(threshold));
    }

    for rule in structural_rules() {
        if !rule.pattern.is_match(alternative) {
            continue;
        }
        if let Some(c) = candidates
            .iter()
            .find(|c| rule.types.contains(&c.structural_type.as_str()))
        {
            return Some(hit(c.node, Strategy::Structural, 0));
        }
    }

    for (pattern, strategy) in generic_type_rules() {
        if !pattern.is_match(alternative) {
            continue;
        }
        if let Some(c) = candidates
            .iter()
            .find(|c| matches_generic(*strategy, &c.structural_type))
        {
            return Some(hit(c.node, *strategy, 0));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, Rect, Viewport};
    use crate::observe::scan;
    use crate::snapshot::{El, Snapshot};

    fn cand(id: usize, label: &str, ty: &str) -> Candidate {
        Candidate {
            node: NodeId(id),
            label: label.to_string(),
            normalized: label.to_lowercase(),
            structural_type: ty.to_string(),
            visible: true,
            rect: Rect::default(),
            tag: ty.split('-').next().unwrap_or(ty).to_string(),
        }
    }

    #[test]
    fn alternatives_trim_and_skip_empty() {
        assert_eq!(alternatives(" A | |B|"), vec!["A", "B"]);
        assert!(alternatives("  ").is_empty());
    }

    #[test]
    fn tokens_keep_umlauts_and_drop_short() {
        assert_eq!(tokens("Zurück zur Übersicht!"), vec!["zurück", "zur", "übersicht"]);
        assert_eq!(tokens("an of E-Mail"), vec!["mail"]);
    }

    #[test]
    fn min_score_tracks_threshold() {
        assert_eq!(min_score(50), 50);
        assert_eq!(min_score(0), 0);
        assert_eq!(min_score(100), 100);
        assert_eq!(min_score(200), 100);
    }

    #[test]
    fn score_prefix_word_root() {
        let s = score("suche", &tokens("suche"), "suchen");
        assert_eq!(s, 100 + 42 + 5 + 80 + 50);
    }

    #[test]
    fn exact_wins_over_everything() {
        let c = vec![
            cand(1, "Save draft", "button"),
            cand(2, "Save", "button"),
        ];
        let m = resolve("save", 50, &c).unwrap();
        assert_eq!(m.node, NodeId(2));
        assert_eq!(m.strategy, Strategy::Exact);
        assert_eq!(m.score, EXACT_SCORE);
    }

    #[test]
    fn exact_ignores_inner_whitespace() {
        let c = vec![cand(1, "Sign in", "button")];
        let m = resolve("Sign  in", 50, &c).unwrap();
        assert_eq!(m.strategy, Strategy::Exact);
        let m = resolve(" sign\tin ", 50, &c).unwrap();
        assert_eq!(m.strategy, Strategy::Exact);
    }

    #[test]
    fn scored_bands() {
        let c = vec![cand(1, "Create new invoice now", "button")];
        let m = resolve("new invoice", 50, &c).unwrap();
        assert_eq!(m.strategy, Strategy::Partial);

        let c = vec![cand(1, "Invoice (new)", "button")];
        // No substring; both tokens found: 3+7 + 80 + 50 + label coverage.
        let m = resolve("new invoice", 50, &c).unwrap();
        assert_eq!(m.strategy, Strategy::Partial);
        assert!(m.score >= 150);

        let c = vec![cand(1, "Invoice overview", "div")];
        let m = resolve("invoice archive", 50, &c).unwrap();
        // invoice(7) + half the search tokens (40) + half the label tokens (15)
        assert_eq!(m.score, 62);
        assert_eq!(m.strategy, Strategy::WordsPartial);
    }

    #[test]
    fn tie_goes_to_first_in_document_order() {
        let c = vec![cand(1, "Open report", "button"), cand(2, "Open report", "button")];
        let m = resolve("report", 50, &c).unwrap();
        assert_eq!(m.node, NodeId(1));
    }

    #[test]
    fn zero_score_never_matches_even_at_zero_threshold() {
        let c = vec![cand(1, "Totally unrelated", "div")];
        assert!(resolve("qqq", 0, &c).is_none());
    }

    #[test]
    fn later_alternative_is_recorded() {
        let c = vec![cand(1, "Anmelden", "button"), cand(2, "Sign in", "button")];
        let m = resolve("Login|Sign in", 50, &c).unwrap();
        assert_eq!(m.node, NodeId(2));
        assert_eq!(m.alternative, "Sign in");
    }

    #[test]
    fn structural_fallback() {
        let c = vec![
            cand(1, "Menu", "div"),
            cand(2, "Passphrase", "input-password"),
        ];
        let m = resolve("Passwort", 50, &c).unwrap();
        assert_eq!(m.node, NodeId(2));
        assert_eq!(m.strategy, Strategy::Structural);
        assert_eq!(m.score, 0);
    }

    #[test]
    fn generic_type_fallback() {
        let c = vec![cand(1, "Overview", "link"), cand(2, "Zz", "input-number")];
        let m = resolve("das Eingabefeld", 50, &c).unwrap();
        assert_eq!(m.node, NodeId(2));
        assert_eq!(m.strategy, Strategy::TypeInput);

        let m = resolve("the link", 100, &c).unwrap();
        assert_eq!(m.strategy, Strategy::TypeLink);
    }

    #[test]
    fn score_monotonic_in_token_coverage() {
        let search = "export monthly report";
        let toks = tokens(search);
        let none = score(search, &toks, "zzz");
        let one = score(search, &toks, "export zzz");
        let two = score(search, &toks, "export monthly zzz");
        let all = score(search, &toks, "export monthly report zzz");
        assert!(none <= one && one <= two && two <= all);
    }

    #[test]
    fn raising_threshold_never_enlarges_matches() {
        let labels = ["Save", "Save changes", "Saved items", "Settings", "Profile"];
        let c: Vec<_> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| cand(i, l, "div"))
            .collect();
        for trigger in ["save change", "sett", "profile page", "items"] {
            let low = resolve_alternative(trigger, 50, &c).filter(|m| !m.strategy.is_fallback());
            let high = resolve_alternative(trigger, 100, &c).filter(|m| !m.strategy.is_fallback());
            if low.is_none() {
                assert!(high.is_none(), "{} matched only at 100", trigger);
            }
        }
    }

    #[test]
    fn resolves_against_scanned_page() {
        let mut b = Snapshot::builder(Viewport::new(800.0, 600.0));
        let body = b.body();
        b.push(body, El::new("button").rect(0.0, 0.0, 100.0, 30.0).text("Login"));
        b.push(body, El::new("a").attr("href", "/help").rect(0.0, 50.0, 100.0, 30.0).text("Help"));
        let snap = b.build();
        let m = resolve("Login", 50, &scan(&snap)).unwrap();
        assert_eq!(snap.text_content(m.node), "Login");
        assert_eq!(m.strategy, Strategy::Exact);
    }
}

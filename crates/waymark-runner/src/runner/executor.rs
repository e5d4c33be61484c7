use crate::config::Step;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use waymark_agent::{
    wait_for, Document, Found, Highlight, PageSource, Query, Resolution, SpotlightGeometry,
    WaitOptions,
};

/// What resolving a single step produced.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// No element lookup: local action, navigation or wait.
    Local,
    /// The page is on a different domain than the step expects.
    WrongUrl { current: String, expected: String },
    Found(Box<Found>),
    NotFound,
    Cancelled,
}

/// Resolve one step against the page.
pub async fn resolve_step<P: PageSource + ?Sized>(
    page: &mut P,
    step: &Step,
    opts: &WaitOptions,
    cancel: &CancellationToken,
) -> StepOutcome {
    if step.step_type.is_local() {
        return StepOutcome::Local;
    }

    if let Some(expected) = step.url.as_deref().filter(|u| !u.trim().is_empty()) {
        match page.url().await {
            Ok(current) if !url_matches(&current, expected) => {
                info!("expected {} but page is on {}", expected, current);
                return StepOutcome::WrongUrl {
                    current,
                    expected: expected.to_string(),
                };
            }
            Ok(_) => {}
            Err(e) => debug!("could not read page url, skipping url check: {}", e),
        }
    }

    let mut query = Query::new(step.effective_trigger()).with_threshold(step.match_threshold);
    if let Some(end) = step.trigger_end.as_deref() {
        query = query.with_end(end);
    }

    match wait_for(page, &query, opts, cancel).await {
        Resolution::Found(found) => {
            if query.trigger_end.is_some() && found.end.is_none() {
                debug!("area end {:?} not found, highlighting start only", step.trigger_end);
            }
            StepOutcome::Found(found)
        }
        Resolution::TimedOut => StepOutcome::NotFound,
        Resolution::Cancelled => StepOutcome::Cancelled,
    }
}

/// Highlight for a resolved step: the area between both endpoints when the
/// end resolved, else the start alone.
pub fn highlight_for(found: &Found, padding: f64) -> Highlight {
    let viewport = found.snapshot.viewport();
    let start = found.snapshot.rect(found.target.node);
    let end = found.end.as_ref().map(|m| m.node);
    let geometry = match end {
        Some(end) => SpotlightGeometry::for_area(start, found.snapshot.rect(end), viewport),
        None => SpotlightGeometry::for_target(start, viewport, padding),
    };
    Highlight {
        generation: found.snapshot.generation(),
        target: found.target.node,
        end,
        geometry,
    }
}

/// Loose domain comparison: equal, or either URL contains the other's domain.
pub fn url_matches(current: &str, expected: &str) -> bool {
    let current = strip_query(current);
    let expected = strip_query(expected);
    let current_domain = domain(current);
    let expected_domain = domain(expected);

    if current_domain == expected_domain {
        return true;
    }
    (!expected_domain.is_empty() && current.contains(expected_domain))
        || (!current_domain.is_empty() && expected.contains(current_domain))
}

fn strip_query(url: &str) -> &str {
    let url = url.split('#').next().unwrap_or(url);
    url.split('?').next().unwrap_or(url)
}

fn domain(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepType;
    use async_trait::async_trait;
    use waymark_agent::{El, Snapshot, Viewport};

    struct StaticPage {
        url: String,
        snapshot: Snapshot,
        captures: u32,
    }

    #[async_trait(?Send)]
    impl PageSource for StaticPage {
        async fn capture(&mut self) -> eoka::Result<Snapshot> {
            self.captures += 1;
            Ok(self.snapshot.clone())
        }

        async fn url(&self) -> eoka::Result<String> {
            Ok(self.url.clone())
        }
    }

    fn form_page(url: &str) -> StaticPage {
        let mut b = Snapshot::builder(Viewport::new(1000.0, 800.0));
        let body = b.body();
        b.push(body, El::new("input").attr("placeholder", "First name").rect(10.0, 10.0, 200.0, 30.0));
        b.push(body, El::new("input").attr("placeholder", "Email").rect(10.0, 60.0, 200.0, 30.0));
        StaticPage {
            url: url.into(),
            snapshot: b.build(),
            captures: 0,
        }
    }

    #[test]
    fn url_matching() {
        assert!(url_matches("https://x.test/a?b=1", "https://x.test/other"));
        assert!(url_matches("https://app.x.test/a", "x.test"));
        assert!(url_matches("https://x.test/", "https://x.test/#frag"));
        assert!(!url_matches("https://x.test/", "https://y.test/"));
        assert!(url_matches("http://x.test/", "https://x.test/"));
    }

    #[tokio::test(start_paused = true)]
    async fn local_steps_skip_lookup() {
        let mut page = form_page("https://x.test/");
        let step = Step::navigate("https://elsewhere.test/");
        let out = resolve_step(&mut page, &step, &WaitOptions::default(), &CancellationToken::new()).await;
        assert!(matches!(out, StepOutcome::Local));
        assert_eq!(page.captures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_domain_is_reported_before_lookup() {
        let mut page = form_page("https://x.test/");
        let mut step = Step::click("Email");
        step.url = Some("https://y.test/form".into());
        let out = resolve_step(&mut page, &step, &WaitOptions::default(), &CancellationToken::new()).await;
        match out {
            StepOutcome::WrongUrl { current, expected } => {
                assert_eq!(current, "https://x.test/");
                assert_eq!(expected, "https://y.test/form");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(page.captures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn area_degrades_to_single_target() {
        let mut page = form_page("https://x.test/");
        let mut step = Step::click("First name");
        step.step_type = StepType::HighlightArea;
        step.trigger_end = Some("Telephone".into());
        let out = resolve_step(&mut page, &step, &WaitOptions::default(), &CancellationToken::new()).await;
        let StepOutcome::Found(found) = out else {
            panic!("expected found");
        };
        assert!(found.end.is_none());
        let h = highlight_for(&found, 8.0);
        assert!(!h.geometry.dashed);
        assert_eq!(h.end, None);
    }

    #[tokio::test(start_paused = true)]
    async fn area_spans_both_endpoints() {
        let mut page = form_page("https://x.test/");
        let mut step = Step::click("First name");
        step.step_type = StepType::HighlightArea;
        step.trigger_end = Some("Email".into());
        let out = resolve_step(&mut page, &step, &WaitOptions::default(), &CancellationToken::new()).await;
        let StepOutcome::Found(found) = out else {
            panic!("expected found");
        };
        let h = highlight_for(&found, 8.0);
        assert!(h.geometry.dashed);
        assert_eq!(h.geometry.hole, waymark_agent::Rect::new(0.0, 0.0, 220.0, 100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_element_times_out() {
        let mut page = form_page("https://x.test/");
        let step = Step::click("Checkout now");
        let opts = WaitOptions {
            timeout_ms: 600,
            poll_interval_ms: 300,
        };
        let out = resolve_step(&mut page, &step, &opts, &CancellationToken::new()).await;
        assert!(matches!(out, StepOutcome::NotFound));
        assert_eq!(page.captures, 3);
    }
}

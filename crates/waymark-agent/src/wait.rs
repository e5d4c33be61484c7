//! Resolution waiting - polls scan + match until found, timeout, or cancel.

use std::time::Duration;

use async_trait::async_trait;
use eoka::{Page, Result};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::observe::{scan, Candidate};
use crate::snapshot::{capture, Snapshot};
use crate::target::{resolve, MatchResult, DEFAULT_THRESHOLD};

/// Anything that can hand out fresh snapshots of a page.
#[async_trait(?Send)]
pub trait PageSource {
    /// Capture the page as it is right now.
    async fn capture(&mut self) -> Result<Snapshot>;

    /// Current page URL.
    async fn url(&self) -> Result<String>;
}

/// A live eoka page. Every capture bumps the generation so overlay calls
/// can be checked against the capture that produced their node ids.
pub struct LivePage<'a> {
    page: &'a Page,
    generation: u64,
}

impl<'a> LivePage<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self {
            page,
            generation: 0,
        }
    }

    pub fn page(&self) -> &Page {
        self.page
    }

    /// Generation of the most recent capture.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[async_trait(?Send)]
impl PageSource for LivePage<'_> {
    async fn capture(&mut self) -> Result<Snapshot> {
        self.generation += 1;
        capture(self.page, self.generation).await
    }

    async fn url(&self) -> Result<String> {
        self.page.url().await
    }
}

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 8000,
            poll_interval_ms: 300,
        }
    }
}

/// What to look for.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub trigger: String,
    /// Second endpoint of an area highlight, resolved in the same tick.
    pub trigger_end: Option<String>,
    pub threshold: u8,
}

impl Query {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            trigger_end: None,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_end(mut self, trigger_end: impl Into<String>) -> Self {
        self.trigger_end = Some(trigger_end.into());
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }
}

/// A successful resolution and the snapshot it was made against.
#[derive(Debug, Clone)]
pub struct Found {
    pub snapshot: Snapshot,
    pub target: MatchResult,
    /// Resolved area end, if one was asked for and found.
    pub end: Option<MatchResult>,
    pub candidates: Vec<Candidate>,
}

impl Found {
    pub fn candidate(&self, m: &MatchResult) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.node == m.node)
    }
}

/// Outcome of [`wait_for`]. Timing out is a normal result.
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Box<Found>),
    TimedOut,
    Cancelled,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

/// Run one scan + match pass against a snapshot.
pub fn resolve_once(snapshot: Snapshot, query: &Query) -> Option<Found> {
    let candidates = scan(&snapshot);
    let target = resolve(&query.trigger, query.threshold, &candidates)?;
    let end = query
        .trigger_end
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .and_then(|t| resolve(t, query.threshold, &candidates));
    Some(Found {
        snapshot,
        target,
        end,
        candidates,
    })
}

/// Poll until the query resolves, the timeout elapses, or `cancel` fires.
///
/// The first attempt runs immediately. A capture error counts as a miss
/// for that tick.
pub async fn wait_for<P: PageSource + ?Sized>(
    page: &mut P,
    query: &Query,
    opts: &WaitOptions,
    cancel: &CancellationToken,
) -> Resolution {
    let started = Instant::now();
    let timeout = Duration::from_millis(opts.timeout_ms);
    let interval = Duration::from_millis(opts.poll_interval_ms.max(1));
    let mut ticks = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Resolution::Cancelled;
        }
        ticks += 1;
        match page.capture().await {
            Ok(snapshot) => {
                if let Some(found) = resolve_once(snapshot, query) {
                    debug!("resolved {:?} after {} tick(s)", query.trigger, ticks);
                    return Resolution::Found(Box::new(found));
                }
            }
            Err(e) => debug!("capture failed on tick {}: {}", ticks, e),
        }

        if started.elapsed() >= timeout {
            debug!("gave up on {:?} after {} tick(s)", query.trigger, ticks);
            return Resolution::TimedOut;
        }

        tokio::select! {
            _ = cancel.cancelled() => return Resolution::Cancelled,
            _ = sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Viewport;
    use crate::snapshot::El;

    /// Serves `empty` pages until `appear_at`, then the page with the button.
    struct Scripted {
        calls: u32,
        appear_at: Option<u32>,
        fail_first: bool,
    }

    fn page(with_button: bool) -> Snapshot {
        let mut b = Snapshot::builder(Viewport::new(800.0, 600.0));
        let body = b.body();
        b.push(body, El::new("a").attr("href", "/").rect(0.0, 0.0, 80.0, 20.0).text("Home"));
        if with_button {
            b.push(body, El::new("button").rect(0.0, 40.0, 80.0, 20.0).text("Checkout"));
        }
        b.build()
    }

    #[async_trait(?Send)]
    impl PageSource for Scripted {
        async fn capture(&mut self) -> Result<Snapshot> {
            self.calls += 1;
            if self.fail_first && self.calls == 1 {
                return Err(eoka::Error::CdpSimple("navigating".into()));
            }
            Ok(page(self.appear_at.map_or(false, |n| self.calls >= n)))
        }

        async fn url(&self) -> Result<String> {
            Ok("https://shop.test/".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn found_immediately() {
        let mut p = Scripted {
            calls: 0,
            appear_at: Some(1),
            fail_first: false,
        };
        let r = wait_for(
            &mut p,
            &Query::new("Checkout"),
            &WaitOptions::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(r.is_found());
        assert_eq!(p.calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn found_after_element_appears() {
        let mut p = Scripted {
            calls: 0,
            appear_at: Some(4),
            fail_first: true,
        };
        let start = Instant::now();
        let r = wait_for(
            &mut p,
            &Query::new("Checkout"),
            &WaitOptions::default(),
            &CancellationToken::new(),
        )
        .await;
        match r {
            Resolution::Found(f) => assert_eq!(f.target.alternative, "Checkout"),
            other => panic!("expected found, got {:?}", other),
        }
        assert_eq!(p.calls, 4);
        assert_eq!(start.elapsed(), Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let mut p = Scripted {
            calls: 0,
            appear_at: None,
            fail_first: false,
        };
        let opts = WaitOptions {
            timeout_ms: 1000,
            poll_interval_ms: 300,
        };
        let r = wait_for(&mut p, &Query::new("Checkout"), &opts, &CancellationToken::new()).await;
        assert!(matches!(r, Resolution::TimedOut));
        // t=0, 300, 600, 900, 1200
        assert_eq!(p.calls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling() {
        let mut p = Scripted {
            calls: 0,
            appear_at: None,
            fail_first: false,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(450)).await;
            trigger.cancel();
        });
        let r = wait_for(&mut p, &Query::new("Checkout"), &WaitOptions::default(), &cancel).await;
        assert!(matches!(r, Resolution::Cancelled));
        assert_eq!(p.calls, 2);
    }

    #[test]
    fn area_end_resolved_in_same_pass() {
        let f = resolve_once(page(true), &Query::new("Home").with_end("Checkout")).unwrap();
        assert!(f.end.is_some());
        let f = resolve_once(page(true), &Query::new("Home").with_end("Nowhere xyz")).unwrap();
        assert!(f.end.is_none());
        assert_eq!(f.candidate(&f.target).map(|c| c.label.as_str()), Some("Home"));
    }
}

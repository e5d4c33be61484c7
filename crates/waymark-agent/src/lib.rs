//! # waymark-agent
//!
//! Page model for walkthrough playback: relocates a step's target by the
//! label an assistive-technology user would hear, then spotlights it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waymark_agent::{wait_for, Browser, LivePage, Query, Resolution, WaitOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> eoka::Result<()> {
//! let browser = Browser::launch().await?;
//! let page = browser.new_page("https://example.com").await?;
//!
//! let mut live = LivePage::new(&page);
//! let query = Query::new("More information|Learn more");
//! match wait_for(&mut live, &query, &WaitOptions::default(), &CancellationToken::new()).await {
//!     Resolution::Found(found) => println!("{:?} via {}", found.target.node, found.target.strategy),
//!     Resolution::TimedOut => println!("not found"),
//!     Resolution::Cancelled => {}
//! }
//!
//! browser.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Everything except [`snapshot::capture`], [`LivePage`] and [`PageOverlay`]
//! works on any [`Document`], so matching can be tested against synthetic
//! pages built with [`SnapshotBuilder`].

pub mod annotate;
pub mod dom;
pub mod label;
pub mod observe;
pub mod snapshot;
pub mod target;
pub mod wait;

pub use annotate::{
    Control, EntryPoint, Highlight, Overlay, OverlayOptions, PageOverlay, Presenter,
    SpotlightGeometry, Tooltip, TooltipPlacement,
};
pub use dom::{Document, NodeId, Rect, Style, Viewport};
pub use label::accessible_name;
pub use observe::{scan, structural_type, Candidate};
pub use snapshot::{El, Snapshot, SnapshotBuilder};
pub use target::{resolve, MatchResult, Strategy, DEFAULT_THRESHOLD};
pub use wait::{wait_for, Found, LivePage, PageSource, Query, Resolution, WaitOptions};

// Re-export eoka types that users need
pub use eoka::{Browser, Error, Page, Result, StealthConfig};

/// Compact text list of candidates, one per line.
/// Each line: `[node] <tag type="x"> "label"`
pub fn candidate_list(candidates: &[Candidate]) -> String {
    let mut out = String::with_capacity(candidates.len() * 40);
    for c in candidates {
        out.push_str(&c.to_string());
        out.push('\n');
    }
    out
}

/// Capture the live page once and scan it.
pub async fn observe(page: &Page) -> Result<(Snapshot, Vec<Candidate>)> {
    let mut live = LivePage::new(page);
    let snapshot = live.capture().await?;
    let candidates = scan(&snapshot);
    Ok((snapshot, candidates))
}

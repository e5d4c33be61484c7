//! # waymark
//!
//! Guided walkthroughs for web applications. A recorded tutorial names each
//! step's target by its visible or accessible label; at playback the target
//! is relocated on the live page by fuzzy label matching, spotlighted, and
//! progress survives full page loads.
//!
//! The work is split across two crates, re-exported here:
//!
//! - [`agent`]: page model, label extraction, candidate scanning, trigger
//!   matching, the resolution waiter and the spotlight overlay.
//! - [`runner`]: tutorial schema and transport, session persistence, the
//!   playback state machine and the live Chrome driver.
//!
//! ```rust,no_run
//! use waymark::{play_file, PlayerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> waymark::Result<()> {
//! let outcome = play_file("onboarding.json", &PlayerConfig::default(), &CancellationToken::new()).await?;
//! println!("{}", outcome.progress);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use tokio_util::sync::CancellationToken;

pub use waymark_agent as agent;
pub use waymark_runner as runner;

pub use waymark_agent::{
    accessible_name, candidate_list, resolve, scan, wait_for, Candidate, Control, Document, El,
    Found, MatchResult, Overlay, PageSource, Presenter, Query, Resolution, Snapshot, Strategy,
    WaitOptions,
};
pub use waymark_runner::{
    transport, Error, MemoryStore, PlayOutcome, PlaybackSession, PlaybackState, Player,
    PlayerConfig, Progress, Result, Runner, SessionStore, Step, StepStatus, StepType, Tutorial,
};

/// Load a tutorial file and play it in a freshly launched browser.
pub async fn play_file(
    path: impl AsRef<Path>,
    config: &PlayerConfig,
    shutdown: &CancellationToken,
) -> Result<PlayOutcome> {
    let tutorial = Tutorial::load(path)?;
    let mut runner = Runner::new(config).await?;
    let outcome = runner.play(&tutorial, None, shutdown).await;
    runner.close().await?;
    outcome
}

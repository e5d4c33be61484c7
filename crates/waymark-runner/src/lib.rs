//! # waymark-runner
//!
//! Plays recorded walkthroughs in a live browser. Each step's target is
//! relocated by its label, spotlighted, and progress is kept in session
//! storage so playback survives page loads.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waymark_runner::{PlayerConfig, Runner, Tutorial};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> waymark_runner::Result<()> {
//! let tutorial = Tutorial::load("onboarding.json")?;
//! let config = PlayerConfig::default();
//! let mut runner = Runner::new(&config).await?;
//! let outcome = runner.play(&tutorial, None, &CancellationToken::new()).await?;
//! println!("{}: {}", outcome.state, outcome.progress);
//! runner.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod runner;

pub use config::transport;
pub use config::{
    BrowserConfig, CompactStep, CompactTutorial, OverlayConfig, PlayerConfig, ResumeParams, Step,
    StepType, StorageKeys, Tutorial, Viewport, WaitConfig,
};
pub use runner::{
    highlight_for, resolve_step, url_matches, MemoryStore, PageStore, PlayOutcome,
    PlaybackSession, PlaybackState, Player, Progress, Runner, SessionStore, StepOutcome,
    StepStatus,
};

/// Result type for waymark-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or playing a tutorial.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("malformed tutorial: {0}")]
    MalformedTutorial(String),

    #[error("tutorial has no steps")]
    EmptyTutorial,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("session storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cannot apply {control} in state {state}")]
    InvalidTransition { state: String, control: String },
}

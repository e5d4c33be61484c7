pub mod schema;
pub mod step;
pub mod transport;

pub use schema::{
    BrowserConfig, CompactTutorial, OverlayConfig, PlayerConfig, Tutorial, Viewport, WaitConfig,
};
pub use step::{CompactStep, Step, StepType};
pub use transport::{ResumeParams, StorageKeys};

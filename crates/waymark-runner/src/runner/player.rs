//! Playback state machine.
//!
//! The player owns the tutorial, the persisted [`PlaybackSession`] and the
//! current [`PlaybackState`]. Every transition is written through to the
//! session store so playback survives full page loads. If the store fails,
//! playback continues in memory only.

use super::executor::{highlight_for, resolve_step, StepOutcome};
use super::session::{PlaybackSession, SessionStore};
use crate::config::{transport, PlayerConfig, StorageKeys, Tutorial};
use crate::{Error, Result};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waymark_agent::{Control, EntryPoint, Overlay, PageSource, Strategy, Tooltip, WaitOptions};

/// Where playback is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Welcome,
    Resolving(usize),
    ShowingTarget(usize),
    LocalAction(usize),
    WrongUrl(usize),
    NotFound(usize),
    Completed,
    Cancelled,
}

impl PlaybackState {
    /// Step index, for states that sit on a step.
    pub fn step(&self) -> Option<usize> {
        match *self {
            PlaybackState::Resolving(i)
            | PlaybackState::ShowingTarget(i)
            | PlaybackState::LocalAction(i)
            | PlaybackState::WrongUrl(i)
            | PlaybackState::NotFound(i) => Some(i),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Completed | PlaybackState::Cancelled)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Welcome => f.write_str("welcome"),
            PlaybackState::Resolving(i) => write!(f, "resolving({})", i),
            PlaybackState::ShowingTarget(i) => write!(f, "showing_target({})", i),
            PlaybackState::LocalAction(i) => write!(f, "local_action({})", i),
            PlaybackState::WrongUrl(i) => write!(f, "wrong_url({})", i),
            PlaybackState::NotFound(i) => write!(f, "not_found({})", i),
            PlaybackState::Completed => f.write_str("completed"),
            PlaybackState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-step status for progress listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Current,
    Skipped,
    Pending,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Completed => "completed",
            StepStatus::Current => "current",
            StepStatus::Skipped => "skipped",
            StepStatus::Pending => "pending",
        }
    }
}

/// Snapshot of how far playback got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub steps: Vec<StepStatus>,
}

impl Progress {
    pub fn completed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| **s == StepStatus::Completed)
            .count()
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} completed", self.completed(), self.total)
    }
}

/// Drives one tutorial.
pub struct Player<S: SessionStore> {
    tutorial: Tutorial,
    session: PlaybackSession,
    state: PlaybackState,
    store: S,
    keys: StorageKeys,
    wait: WaitOptions,
    padding: f64,
    persistent: bool,
    overlay: Option<Overlay>,
}

impl<S: SessionStore> Player<S> {
    /// A player on the welcome card, with fresh progress.
    pub fn new(tutorial: Tutorial, store: S, config: &PlayerConfig) -> Self {
        let session = PlaybackSession::new(&tutorial.storage_id());
        Self {
            tutorial,
            session,
            state: PlaybackState::Welcome,
            store,
            keys: StorageKeys::new(&config.storage_prefix),
            wait: config.wait_options(),
            padding: config.overlay.padding,
            persistent: true,
            overlay: None,
        }
    }

    /// Find a tutorial to play, in priority order: URL parameters, the
    /// inline payload, then session storage.
    ///
    /// A URL step parameter, or a saved session, resumes at that step;
    /// otherwise playback starts on the welcome card. Returns `None` when
    /// there is nothing to play.
    pub async fn bootstrap(
        page_url: &str,
        inline: Option<&str>,
        store: S,
        config: &PlayerConfig,
    ) -> Result<Option<Self>> {
        let params = transport::resume_params(page_url)?;
        let keys = StorageKeys::new(&config.storage_prefix);

        let (tutorial, source) = match (params.tutorial, inline) {
            (Some(t), _) => (Some(t), "url"),
            (None, Some(inline)) => (Some(Tutorial::from_json(inline)?), "inline"),
            (None, None) => (load_stored(&store, &keys).await, "storage"),
        };
        let Some(tutorial) = tutorial else {
            debug!("no tutorial data found");
            return Ok(None);
        };
        if tutorial.steps.is_empty() {
            warn!("tutorial {:?} has no steps, nothing to play", tutorial.name);
            return Ok(None);
        }
        tutorial.validate()?;
        info!(
            "loaded tutorial {:?} ({} steps) from {}",
            tutorial.name,
            tutorial.steps.len(),
            source
        );

        let mut player = Player::new(tutorial, store, config);
        player.remember().await;
        let restored = player.restore().await;
        player.session.last_url = page_url.to_string();

        if let Some(step) = params.step {
            let step = step.min(player.tutorial.steps.len());
            player.session.step_index = step;
            player.state = PlaybackState::Resolving(step);
            player.persist().await;
        } else if !restored {
            player.state = PlaybackState::Welcome;
        }
        Ok(Some(player))
    }

    pub fn tutorial(&self) -> &Tutorial {
        &self.tutorial
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// False once a storage failure forced in-memory playback.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// The last overlay produced, for redraws.
    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Store the tutorial itself and mark it active, so a reload without
    /// URL parameters still finds it.
    pub async fn remember(&mut self) {
        if !self.persistent {
            return;
        }
        let id = self.tutorial.storage_id();
        let result = match serde_json::to_string(&self.tutorial) {
            Ok(json) => self.store.set(&self.keys.data(&id), &json).await,
            Err(e) => Err(e.into()),
        };
        let result = match result {
            Ok(()) => self.store.set(&self.keys.active(), &id).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.degrade(e);
        }
    }

    /// Load saved progress. A saved session resumes at its step; a corrupt
    /// one is dropped.
    pub async fn restore(&mut self) -> bool {
        if !self.persistent {
            return false;
        }
        let key = self.keys.session(&self.session.tutorial_id);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                self.degrade(e);
                return false;
            }
        };
        match PlaybackSession::from_json(&raw) {
            Ok(saved) => {
                let step = saved.step_index.min(self.tutorial.steps.len());
                self.session.step_index = step;
                self.session.completed = saved
                    .completed
                    .into_iter()
                    .filter(|i| *i < self.tutorial.steps.len())
                    .collect();
                self.session.last_url = saved.last_url;
                self.state = PlaybackState::Resolving(step);
                info!("resuming {:?} at step {}", self.tutorial.name, step + 1);
                true
            }
            Err(e) => {
                warn!("dropping unreadable session {}: {}", key, e);
                let _ = self.store.remove(&key).await;
                false
            }
        }
    }

    /// Leave the welcome card at `index` (0 or an entry point).
    pub async fn start(&mut self, index: usize) -> Result<()> {
        if self.state != PlaybackState::Welcome {
            return Err(self.invalid(Control::Start(index)));
        }
        if !self.tutorial.is_valid_start(index) {
            return Err(self.invalid(Control::Start(index)));
        }
        info!("starting {:?} at step {}", self.tutorial.name, index + 1);
        self.go_to(index).await;
        Ok(())
    }

    /// Resolve the current step on the page and produce what to show.
    ///
    /// Only valid while resolving. Returns `None` if `cancel` fired first;
    /// the state is left unchanged in that case.
    pub async fn resolve<P: PageSource + ?Sized>(
        &mut self,
        page: &mut P,
        cancel: &CancellationToken,
    ) -> Result<Option<Overlay>> {
        let PlaybackState::Resolving(i) = self.state else {
            return Err(Error::InvalidTransition {
                state: self.state.to_string(),
                control: "resolve".into(),
            });
        };

        if i >= self.tutorial.steps.len() {
            self.finish().await;
            return Ok(self.overlay.clone());
        }

        if let Ok(url) = page.url().await {
            self.session.last_url = url;
        }

        let step = self.tutorial.steps[i].clone();
        let total = self.tutorial.steps.len();
        let progress = format!("Step {} of {}", i + 1, total);
        let overlay = match resolve_step(page, &step, &self.wait, cancel).await {
            StepOutcome::Cancelled => return Ok(None),
            StepOutcome::Local => {
                self.state = PlaybackState::LocalAction(i);
                Overlay::LocalAction {
                    title: self.tutorial.name.clone(),
                    progress,
                    step_type: step.step_type.as_str().to_string(),
                    description: step.title().to_string(),
                    instruction: step.instruction.clone(),
                    url: step.url.clone(),
                    can_prev: i > 0,
                }
            }
            StepOutcome::WrongUrl { current, expected } => {
                self.state = PlaybackState::WrongUrl(i);
                Overlay::WrongUrl { current, expected }
            }
            StepOutcome::NotFound => {
                warn!("step {}: no element for {:?}", i + 1, step.effective_trigger());
                self.state = PlaybackState::NotFound(i);
                Overlay::NotFound {
                    description: step.title().to_string(),
                    trigger: step.effective_trigger().to_string(),
                }
            }
            StepOutcome::Found(found) => {
                self.state = PlaybackState::ShowingTarget(i);
                let strategy_note = (found.target.strategy != Strategy::Exact).then(|| {
                    format!(
                        "Found by {} match on \"{}\"",
                        found.target.strategy, found.target.alternative
                    )
                });
                Overlay::Spotlight {
                    highlight: highlight_for(&found, self.padding),
                    tooltip: Tooltip {
                        title: self.tutorial.name.clone(),
                        progress,
                        description: step.title().to_string(),
                        instruction: step.instruction.clone(),
                        strategy_note,
                        can_prev: i > 0,
                        can_skip: step.optional,
                    },
                }
            }
        };
        debug!("step {}/{} -> {}", i + 1, total, self.state);
        self.persist().await;
        self.overlay = Some(overlay.clone());
        Ok(Some(overlay))
    }

    /// Apply a user control. Returns a URL when the control requires
    /// navigating the page.
    pub async fn apply(&mut self, control: Control) -> Result<Option<String>> {
        use PlaybackState::*;

        match (self.state, control) {
            (Welcome, Control::Start(index)) => {
                self.start(index).await?;
            }
            (state, Control::Cancel) if !state.is_terminal() => {
                info!("playback of {:?} cancelled", self.tutorial.name);
                self.state = Cancelled;
                self.overlay = None;
                self.clear_all().await;
            }
            (ShowingTarget(i), Control::TargetClick)
            | (ShowingTarget(i), Control::Done)
            | (LocalAction(i), Control::Done) => {
                self.session.completed.insert(i);
                self.go_to(i + 1).await;
            }
            (ShowingTarget(i), Control::Skip) | (NotFound(i), Control::Skip) => {
                let optional = self.tutorial.steps.get(i).is_some_and(|s| s.optional);
                if matches!(self.state, ShowingTarget(_)) && !optional {
                    return Err(self.invalid(control));
                }
                self.go_to(i + 1).await;
            }
            (ShowingTarget(i), Control::Prev) | (LocalAction(i), Control::Prev) if i > 0 => {
                self.go_to(i - 1).await;
            }
            (NotFound(i), Control::Retry) | (WrongUrl(i), Control::Retry) => {
                self.go_to(i).await;
            }
            (WrongUrl(i), Control::Navigate) => {
                let Some(expected) = self.tutorial.steps.get(i).and_then(|s| s.url.clone())
                else {
                    return Err(self.invalid(control));
                };
                let url = transport::with_resume_params(&expected, i, &self.tutorial)?;
                self.go_to(i).await;
                return Ok(Some(url));
            }
            _ => return Err(self.invalid(control)),
        }
        Ok(None)
    }

    /// Write the session out now.
    pub async fn flush(&mut self) {
        self.persist().await;
    }

    /// Pick up again after a navigation that carried no resume parameters:
    /// re-show the current step, or the welcome card.
    pub async fn resume_after_navigation(&mut self, page_url: &str) {
        self.session.last_url = page_url.to_string();
        if let Some(i) = self.state.step() {
            self.state = PlaybackState::Resolving(i);
            self.persist().await;
        }
        self.overlay = None;
        debug!("resumed after navigation to {} in {}", page_url, self.state);
    }

    /// Welcome card for this tutorial.
    pub fn welcome_overlay(&self) -> Overlay {
        Overlay::Welcome {
            title: self.tutorial.name.clone(),
            description: self.tutorial.description.clone(),
            step_count: self.tutorial.steps.len(),
            entry_points: self
                .tutorial
                .entry_points()
                .into_iter()
                .map(|index| EntryPoint {
                    index,
                    label: self.tutorial.steps[index].title().to_string(),
                })
                .collect(),
        }
    }

    pub fn progress(&self) -> Progress {
        let total = self.tutorial.steps.len();
        let current = self.state.step().unwrap_or(match self.state {
            PlaybackState::Completed => total,
            _ => self.session.step_index,
        });
        let steps = (0..total)
            .map(|idx| {
                if self.session.completed.contains(&idx) {
                    StepStatus::Completed
                } else if idx == current {
                    StepStatus::Current
                } else if idx < current {
                    StepStatus::Skipped
                } else {
                    StepStatus::Pending
                }
            })
            .collect();
        Progress {
            current,
            total,
            steps,
        }
    }

    async fn go_to(&mut self, index: usize) {
        self.session.step_index = index;
        self.state = PlaybackState::Resolving(index);
        self.overlay = None;
        self.persist().await;
    }

    async fn finish(&mut self) {
        info!(
            "tutorial {:?} completed ({} of {} steps done)",
            self.tutorial.name,
            self.session.completed.len(),
            self.tutorial.steps.len()
        );
        self.state = PlaybackState::Completed;
        self.overlay = Some(Overlay::Completed {
            title: self.tutorial.name.clone(),
        });
        self.clear_all().await;
    }

    async fn persist(&mut self) {
        if !self.persistent {
            return;
        }
        let key = self.keys.session(&self.session.tutorial_id);
        let result = match self.session.to_json() {
            Ok(json) => self.store.set(&key, &json).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.degrade(e);
        }
    }

    /// Remove everything playback stored, including the recorder's key.
    async fn clear_all(&mut self) {
        if !self.persistent {
            return;
        }
        let id = &self.session.tutorial_id;
        let keys = [
            self.keys.session(id),
            self.keys.data(id),
            self.keys.active(),
            self.keys.recorder(),
        ];
        for key in &keys {
            if let Err(e) = self.store.remove(key).await {
                self.degrade(e);
                return;
            }
        }
    }

    fn degrade(&mut self, e: Error) {
        warn!("session storage unavailable, continuing in memory: {}", e);
        self.persistent = false;
    }

    fn invalid(&self, control: Control) -> Error {
        Error::InvalidTransition {
            state: self.state.to_string(),
            control: control.to_string(),
        }
    }
}

async fn load_stored<S: SessionStore>(store: &S, keys: &StorageKeys) -> Option<Tutorial> {
    let id = match store.get(&keys.active()).await {
        Ok(Some(id)) => id,
        Ok(None) => return None,
        Err(e) => {
            debug!("storage unavailable while looking for a tutorial: {}", e);
            return None;
        }
    };
    let raw = store.get(&keys.data(&id)).await.ok().flatten()?;
    match Tutorial::from_json(&raw) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!("stored tutorial {} is unreadable, ignoring it: {}", id, e);
            let _ = store.remove(&keys.data(&id)).await;
            let _ = store.remove(&keys.active()).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Step, StepType};
    use crate::runner::session::MemoryStore;
    use async_trait::async_trait;
    use waymark_agent::{El, Snapshot, Viewport};

    /// A page whose URL and content the test swaps out.
    struct FakePage {
        url: String,
        build: fn() -> Snapshot,
    }

    #[async_trait(?Send)]
    impl PageSource for FakePage {
        async fn capture(&mut self) -> eoka::Result<Snapshot> {
            Ok((self.build)())
        }

        async fn url(&self) -> eoka::Result<String> {
            Ok(self.url.clone())
        }
    }

    fn login_page() -> Snapshot {
        let mut b = Snapshot::builder(Viewport::new(1280.0, 800.0));
        let body = b.body();
        b.push(body, El::new("button").rect(20.0, 20.0, 100.0, 32.0).text("Login"));
        b.push(body, El::new("a").attr("href", "/help").rect(20.0, 300.0, 60.0, 20.0).text("Help"));
        b.build()
    }

    fn blank_page() -> Snapshot {
        Snapshot::builder(Viewport::new(1280.0, 800.0)).build()
    }

    fn tutorial() -> Tutorial {
        let mut help = Step::click("Help");
        help.optional = true;
        help.is_entry_point = true;
        help.description = "Open help".into();
        Tutorial {
            id: None,
            name: "Login flow".into(),
            description: "Sign in to the app".into(),
            start_url: Some("https://app.test/".into()),
            steps: vec![
                Step::click("Login"),
                Step::navigate("https://app.test/dashboard"),
                help,
            ],
        }
    }

    fn page() -> FakePage {
        FakePage {
            url: "https://app.test/".into(),
            build: login_page,
        }
    }

    fn fast() -> PlayerConfig {
        let mut config = PlayerConfig::default();
        config.wait.timeout_ms = 300;
        config.wait.poll_interval_ms = 100;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn walks_through_and_clears_storage() {
        let store = MemoryStore::new();
        let mut player = Player::new(tutorial(), store.clone(), &fast());
        player.remember().await;
        let mut page = page();
        let cancel = CancellationToken::new();

        assert!(matches!(player.welcome_overlay(), Overlay::Welcome { step_count: 3, .. }));
        player.apply(Control::Start(0)).await.unwrap();
        assert_eq!(player.state(), PlaybackState::Resolving(0));

        let overlay = player.resolve(&mut page, &cancel).await.unwrap().unwrap();
        assert_eq!(overlay.kind(), "spotlight");
        assert_eq!(player.state(), PlaybackState::ShowingTarget(0));
        assert!(store.keys().contains(&"waymark_player_Login_flow".to_string()));

        player.apply(Control::TargetClick).await.unwrap();
        let overlay = player.resolve(&mut page, &cancel).await.unwrap().unwrap();
        assert_eq!(overlay.kind(), "local_action");
        player.apply(Control::Done).await.unwrap();

        player.resolve(&mut page, &cancel).await.unwrap();
        assert_eq!(player.state(), PlaybackState::ShowingTarget(2));
        player.apply(Control::Skip).await.unwrap();

        let overlay = player.resolve(&mut page, &cancel).await.unwrap().unwrap();
        assert_eq!(overlay.kind(), "completed");
        assert_eq!(player.state(), PlaybackState::Completed);
        assert!(store.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tooltip_flags_follow_the_step() {
        let mut player = Player::new(tutorial(), MemoryStore::new(), &fast());
        let mut page = page();
        player.start(2).await.unwrap();
        let overlay = player
            .resolve(&mut page, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        let Overlay::Spotlight { tooltip, .. } = overlay else {
            panic!("expected spotlight");
        };
        assert_eq!(tooltip.progress, "Step 3 of 3");
        assert_eq!(tooltip.description, "Open help");
        assert!(tooltip.can_prev);
        assert!(tooltip.can_skip);
        assert!(tooltip.strategy_note.is_none());
    }

    #[tokio::test]
    async fn start_only_at_entry_points() {
        let mut player = Player::new(tutorial(), MemoryStore::new(), &fast());
        assert!(matches!(
            player.start(1).await,
            Err(Error::InvalidTransition { .. })
        ));
        player.start(2).await.unwrap();
        assert_eq!(player.state(), PlaybackState::Resolving(2));
    }

    #[tokio::test(start_paused = true)]
    async fn required_step_cannot_be_skipped() {
        let mut player = Player::new(tutorial(), MemoryStore::new(), &fast());
        player.start(0).await.unwrap();
        player
            .resolve(&mut page(), &CancellationToken::new())
            .await
            .unwrap();
        let err = player.apply(Control::Skip).await.unwrap_err();
        assert!(err.to_string().contains("showing_target(0)"));
        assert!(player.apply(Control::Prev).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_offers_retry_and_skip() {
        let mut player = Player::new(tutorial(), MemoryStore::new(), &fast());
        let mut page = FakePage {
            url: "https://app.test/".into(),
            build: blank_page,
        };
        player.start(0).await.unwrap();
        let overlay = player
            .resolve(&mut page, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            overlay,
            Overlay::NotFound {
                description: "Login".into(),
                trigger: "Login".into(),
            }
        );
        player.apply(Control::Retry).await.unwrap();
        assert_eq!(player.state(), PlaybackState::Resolving(0));
        player
            .resolve(&mut page, &CancellationToken::new())
            .await
            .unwrap();
        player.apply(Control::Skip).await.unwrap();
        assert_eq!(player.state(), PlaybackState::Resolving(1));
        assert_eq!(player.progress().steps[0], StepStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_url_navigates_with_resume_params() {
        let mut t = tutorial();
        t.steps[0].url = Some("https://other.test/login".into());
        let mut player = Player::new(t, MemoryStore::new(), &fast());
        player.start(0).await.unwrap();
        let overlay = player
            .resolve(&mut page(), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(overlay.kind(), "wrong_url");

        let url = player.apply(Control::Navigate).await.unwrap().unwrap();
        assert!(url.starts_with("https://other.test/login?"));
        let params = transport::resume_params(&url).unwrap();
        assert_eq!(params.step, Some(0));
        assert_eq!(player.state(), PlaybackState::Resolving(0));
    }

    #[tokio::test]
    async fn cancel_clears_storage_from_any_state() {
        let store = MemoryStore::new();
        let mut player = Player::new(tutorial(), store.clone(), &fast());
        player.remember().await;
        store.set("waymark_recorder", "{}").await.unwrap();
        player.start(0).await.unwrap();
        player.apply(Control::Cancel).await.unwrap();
        assert_eq!(player.state(), PlaybackState::Cancelled);
        assert!(store.keys().is_empty());
        assert!(player.apply(Control::Cancel).await.is_err());
    }

    #[tokio::test]
    async fn bootstrap_prefers_url_then_inline_then_storage() {
        let config = fast();
        let t = tutorial();
        let store = MemoryStore::new();

        assert!(Player::bootstrap("https://app.test/", None, store.clone(), &config)
            .await
            .unwrap()
            .is_none());

        let inline = transport::encode_compact(&t).unwrap();
        let player = Player::bootstrap("https://app.test/", Some(&inline), store.clone(), &config)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(player.state(), PlaybackState::Welcome);

        // Stored by the inline bootstrap above.
        let player = Player::bootstrap("https://app.test/", None, store.clone(), &config)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(player.tutorial().name, "Login flow");

        let url = transport::with_resume_params("https://app.test/dashboard", 1, &t).unwrap();
        let player = Player::bootstrap(&url, None, store.clone(), &config)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(player.state(), PlaybackState::Resolving(1));
    }

    #[tokio::test]
    async fn bootstrap_resumes_saved_session() {
        let config = fast();
        let store = MemoryStore::new();
        let mut player = Player::new(tutorial(), store.clone(), &config);
        player.remember().await;
        player.start(0).await.unwrap();
        player.session.completed.insert(0);
        player.go_to(1).await;

        let resumed = Player::bootstrap("https://app.test/dashboard", None, store, &config)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resumed.state(), PlaybackState::Resolving(1));
        assert!(resumed.session().completed.contains(&0));
    }

    #[tokio::test]
    async fn tutorial_named_active_keeps_its_pointer() {
        let config = fast();
        let store = MemoryStore::new();
        let mut t = tutorial();
        t.id = Some("active".into());
        let mut player = Player::new(t, store.clone(), &config);
        player.remember().await;
        player.start(0).await.unwrap();
        player.go_to(1).await;

        let resumed = Player::bootstrap("https://app.test/dashboard", None, store, &config)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resumed.tutorial().storage_id(), "active");
        assert_eq!(resumed.state(), PlaybackState::Resolving(1));
    }

    #[tokio::test]
    async fn bootstrap_ignores_corrupt_storage() {
        let store = MemoryStore::new();
        store.set("waymark_active", "x").await.unwrap();
        store.set("waymark_player_x_data", "{not json").await.unwrap();
        let found = Player::bootstrap("https://app.test/", None, store.clone(), &fast())
            .await
            .unwrap();
        assert!(found.is_none());
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn bootstrap_rejects_malformed_inline() {
        let err = Player::bootstrap("https://app.test/", Some("{\"s\": 3}"), MemoryStore::new(), &fast())
            .await;
        assert!(matches!(err, Err(Error::MalformedTutorial(_))));
    }

    #[tokio::test]
    async fn empty_tutorial_does_not_start() {
        let inline = r#"{"n":"Empty","s":[]}"#;
        let found = Player::bootstrap("https://app.test/", Some(inline), MemoryStore::new(), &fast())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_falls_back_to_memory() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let mut player = Player::new(tutorial(), store, &fast());
        player.start(0).await.unwrap();
        assert!(!player.is_persistent());
        player
            .resolve(&mut page(), &CancellationToken::new())
            .await
            .unwrap();
        player.apply(Control::TargetClick).await.unwrap();
        assert_eq!(player.state(), PlaybackState::Resolving(1));
    }

    #[tokio::test]
    async fn progress_statuses() {
        let mut player = Player::new(tutorial(), MemoryStore::new(), &fast());
        player.session.completed.insert(0);
        player.state = PlaybackState::ShowingTarget(2);
        let progress = player.progress();
        assert_eq!(
            progress.steps,
            vec![StepStatus::Completed, StepStatus::Skipped, StepStatus::Current]
        );
        assert_eq!(progress.to_string(), "1/3 completed");
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_outside_resolving_is_rejected() {
        let mut player = Player::new(tutorial(), MemoryStore::new(), &fast());
        let err = player
            .resolve(&mut page(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn local_types_show_step_type() {
        assert_eq!(StepType::Wait.as_str(), "wait");
    }
}

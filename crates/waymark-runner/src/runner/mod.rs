mod executor;
mod player;
mod session;

pub use executor::{highlight_for, resolve_step, url_matches, StepOutcome};
pub use player::{PlaybackState, Player, Progress, StepStatus};
pub use session::{MemoryStore, PageStore, PlaybackSession, SessionStore};

use crate::config::{transport, BrowserConfig, PlayerConfig, Tutorial};
use crate::{Error, Result};
use eoka::{Browser, Page};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waymark_agent::{Control, LivePage, Overlay, PageOverlay, PageSource, Presenter};

/// How a live playback ended.
#[derive(Debug)]
pub struct PlayOutcome {
    /// `Completed` or `Cancelled`.
    pub state: PlaybackState,
    pub progress: Progress,
    /// Spotlights shown, counting re-resolves.
    pub highlights: usize,
    pub duration_ms: u64,
}

/// What interrupted waiting for the user.
enum Input {
    Control(Control),
    Navigated(String),
    Shutdown,
}

/// Plays tutorials in a real browser.
pub struct Runner {
    browser: Browser,
    page: Page,
    config: PlayerConfig,
}

impl Runner {
    /// Launch the browser described by `config.browser`.
    pub async fn new(config: &PlayerConfig) -> Result<Self> {
        let browser = launch(&config.browser).await?;
        let page = browser.new_page("about:blank").await?;
        Ok(Self {
            browser,
            page,
            config: config.clone(),
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Open the tutorial's start page and play it until it completes, the
    /// user cancels, or `shutdown` fires. With `entry`, the welcome card is
    /// skipped and playback starts at that step.
    pub async fn play(
        &mut self,
        tutorial: &Tutorial,
        entry: Option<usize>,
        shutdown: &CancellationToken,
    ) -> Result<PlayOutcome> {
        tutorial.validate()?;
        let start_url = tutorial
            .start_url
            .as_deref()
            .ok_or_else(|| Error::Config(format!("tutorial {:?} has no startUrl", tutorial.name)))?;

        info!("Navigating to: {}", start_url);
        self.page.goto(start_url).await?;
        let inline = transport::encode_compact(tutorial)?;
        self.drive(Some(&inline), entry, shutdown).await
    }

    /// Open `url` and play whatever tutorial the page carries: resume
    /// parameters, an embedded payload, or a session left in storage.
    pub async fn attach(
        &mut self,
        url: &str,
        entry: Option<usize>,
        shutdown: &CancellationToken,
    ) -> Result<PlayOutcome> {
        info!("Navigating to: {}", url);
        self.page.goto(url).await?;
        let inline = embedded_payload(&self.page).await;
        self.drive(inline.as_deref(), entry, shutdown).await
    }

    async fn drive(
        &mut self,
        inline: Option<&str>,
        entry: Option<usize>,
        shutdown: &CancellationToken,
    ) -> Result<PlayOutcome> {
        let started = Instant::now();
        let page_url = self.page.url().await?;
        let store = PageStore::new(&self.page);
        let mut player = Player::bootstrap(&page_url, inline, store, &self.config)
            .await?
            .ok_or(Error::EmptyTutorial)?;
        if let Some(index) = entry {
            if player.state() == PlaybackState::Welcome {
                player.start(index).await?;
            }
        }
        let mut overlay = PageOverlay::new(&self.page, self.config.overlay_options());
        let mut live = LivePage::new(&self.page);
        let poll = Duration::from_millis(self.config.overlay.control_poll_ms);

        let mut highlights = 0;
        let mut stale = true;
        loop {
            if stale {
                match show_current(&mut player, &mut live, &mut overlay, shutdown).await? {
                    Shown::Interrupted => {
                        player.apply(Control::Cancel).await?;
                        break;
                    }
                    Shown::Presented(Some(Overlay::Spotlight { .. })) => highlights += 1,
                    Shown::Presented(_) => {}
                }
                stale = false;
            }

            if player.state().is_terminal() {
                break;
            }

            match wait_input(&self.page, &mut overlay, poll, shutdown).await? {
                Input::Control(control) => {
                    debug!("control: {}", control);
                    match player.apply(control).await {
                        Ok(Some(url)) => {
                            info!("Navigating to: {}", url);
                            self.page.goto(&url).await?;
                            player.resume_after_navigation(&url).await;
                        }
                        Ok(None) => {}
                        Err(e @ Error::InvalidTransition { .. }) => {
                            warn!("ignoring control: {}", e);
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                    stale = true;
                }
                Input::Navigated(url) => {
                    player.resume_after_navigation(&url).await;
                    stale = true;
                }
                Input::Shutdown => {
                    player.apply(Control::Cancel).await?;
                    break;
                }
            }
        }

        if player.state() == PlaybackState::Cancelled {
            overlay.remove().await?;
        }
        Ok(PlayOutcome {
            state: player.state(),
            progress: player.progress(),
            highlights,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

async fn launch(config: &BrowserConfig) -> Result<Browser> {
    let stealth = eoka::StealthConfig {
        headless: config.headless,
        proxy: config.proxy.clone(),
        user_agent: config.user_agent.clone(),
        viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
        viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
        ..Default::default()
    };
    debug!(
        "Launching browser (headless: {}, proxy: {:?})",
        config.headless, config.proxy
    );
    Ok(Browser::launch_with_config(stealth).await?)
}

/// Result of bringing the current step on screen.
enum Shown {
    /// Shutdown fired while the step was resolving.
    Interrupted,
    Presented(Option<Overlay>),
}

/// Resolve the current step if it is pending and present its overlay.
/// The previous overlay must be gone before the scan, or its backdrop
/// occludes every candidate.
async fn show_current<S, P, V>(
    player: &mut Player<S>,
    page: &mut P,
    view: &mut V,
    shutdown: &CancellationToken,
) -> Result<Shown>
where
    S: SessionStore,
    P: PageSource + ?Sized,
    V: Presenter + ?Sized,
{
    if let PlaybackState::Resolving(i) = player.state() {
        debug!("resolving step {}", i + 1);
        // Fails while a navigation is in flight; the page has no overlay then.
        if let Err(e) = view.remove().await {
            debug!("overlay teardown failed: {}", e);
        }
        if player.resolve(page, shutdown).await?.is_none() {
            return Ok(Shown::Interrupted);
        }
    }

    let current = match player.state() {
        PlaybackState::Welcome => Some(player.welcome_overlay()),
        _ => player.overlay().cloned(),
    };
    if let Some(ref o) = current {
        view.present(o).await?;
    }
    Ok(Shown::Presented(current))
}

/// Text of the page's embedded tutorial element, if any.
async fn embedded_payload(page: &Page) -> Option<String> {
    let js = format!(
        "(() => {{ const el = document.getElementById({}); return el ? el.textContent : ''; }})()",
        serde_json::to_string(transport::EMBED_ID).ok()?
    );
    match page.evaluate::<String>(&js).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            debug!("could not read embedded tutorial: {}", e);
            None
        }
    }
}

/// Poll for a control until one arrives, the page navigates away (URL
/// change or the overlay vanished), or shutdown fires.
async fn wait_input<P: Presenter + ?Sized>(
    page: &Page,
    overlay: &mut P,
    poll: Duration,
    shutdown: &CancellationToken,
) -> Result<Input> {
    let url = page.url().await?;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(Input::Shutdown),
            _ = tokio::time::sleep(poll) => {}
        }

        // Navigation in flight makes page calls fail briefly.
        match overlay.next_control().await {
            Ok(Some(control)) => return Ok(Input::Control(control)),
            Ok(None) => {}
            Err(e) => debug!("control poll failed: {}", e),
        }

        let now = match page.url().await {
            Ok(now) => now,
            Err(_) => continue,
        };
        if now != url {
            info!("page navigated to {}", now);
            return Ok(Input::Navigated(now));
        }
        let mounted: bool = page
            .evaluate("!!document.getElementById('__waymark_root')")
            .await
            .unwrap_or(true);
        if !mounted {
            debug!("overlay gone, page reloaded");
            return Ok(Input::Navigated(now));
        }
    }
}

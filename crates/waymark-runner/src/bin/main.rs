use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use waymark_runner::{transport, PlayOutcome, PlayerConfig, PlaybackState, Runner, Tutorial};

#[derive(Parser)]
#[command(name = "waymark-runner")]
#[command(about = "Play recorded walkthroughs in a live browser")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a tutorial file without playing it
    Check {
        tutorial: PathBuf,
    },

    /// Print the compact payload for a tutorial
    Encode {
        tutorial: PathBuf,

        /// Print base64 instead of JSON
        #[arg(long)]
        base64: bool,

        /// Print a script element for embedding in a host page
        #[arg(long, conflicts_with = "base64")]
        embed: bool,

        /// Print a URL carrying the tutorial, resuming at --step
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        #[arg(long, default_value_t = 0)]
        step: usize,
    },

    /// Decode a payload (JSON, base64 or URL) back to the verbose schema
    Decode {
        input: String,
    },

    /// Play a tutorial
    Play {
        tutorial: PathBuf,

        /// Player config (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run in headless mode (overrides config)
        #[arg(long)]
        headless: bool,

        /// Skip the welcome card and start at this step (0 or an entry point)
        #[arg(long, value_name = "N")]
        entry: Option<usize>,
    },

    /// Open a page and play the tutorial it carries (URL parameters,
    /// embedded payload or stored session)
    Attach {
        url: String,

        /// Player config (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run in headless mode (overrides config)
        #[arg(long)]
        headless: bool,

        /// Skip the welcome card and start at this step (0 or an entry point)
        #[arg(long, value_name = "N")]
        entry: Option<usize>,
    },
}

fn player_config(path: Option<PathBuf>, headless: bool) -> waymark_runner::Result<PlayerConfig> {
    let mut config = match path {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    if headless {
        config.browser.headless = true;
    }
    Ok(config)
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });
    shutdown
}

fn report(outcome: &PlayOutcome) {
    println!();
    match outcome.state {
        PlaybackState::Completed => println!("✓ Completed"),
        _ => println!("✗ Cancelled"),
    }
    println!("  Steps: {}", outcome.progress);
    println!("  Highlights: {}", outcome.highlights);
    println!("  Duration: {}ms", outcome.duration_ms);
}

#[tokio::main]
async fn main() -> waymark_runner::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    match cli.command {
        Command::Check { tutorial } => {
            let t = Tutorial::load(&tutorial)?;
            println!("Tutorial valid: {}", t.name);
            if let Some(ref url) = t.start_url {
                println!("  Start: {}", url);
            }
            println!("  Steps: {}", t.steps.len());
            for (i, step) in t.steps.iter().enumerate() {
                let entry = if step.is_entry_point { " (entry point)" } else { "" };
                let optional = if step.optional { " (optional)" } else { "" };
                println!(
                    "    {}. [{}] {}{}{}",
                    i + 1,
                    step.step_type,
                    step.title(),
                    entry,
                    optional
                );
                if step.match_threshold != waymark_agent::DEFAULT_THRESHOLD {
                    println!("       threshold: {}", step.match_threshold);
                }
            }
        }
        Command::Encode {
            tutorial,
            base64,
            embed,
            url,
            step,
        } => {
            let t = Tutorial::load(&tutorial)?;
            if let Some(base) = url {
                println!("{}", transport::with_resume_params(&base, step, &t)?);
            } else if embed {
                println!("{}", transport::embed_script(&t)?);
            } else if base64 {
                println!("{}", transport::encode_base64(&t)?);
            } else {
                println!("{}", transport::encode_compact(&t)?);
            }
        }
        Command::Decode { input } => {
            let t = transport::decode_any(&input)?;
            t.validate()?;
            println!("{}", serde_json::to_string_pretty(&t)?);
        }
        Command::Play {
            tutorial,
            config,
            headless,
            entry,
        } => {
            let t = Tutorial::load(&tutorial)?;
            let config = player_config(config, headless)?;
            println!("Playing: {}", t.name);

            let shutdown = shutdown_on_ctrl_c();
            let mut runner = Runner::new(&config).await?;
            let outcome = runner.play(&t, entry, &shutdown).await;
            runner.close().await?;
            let outcome = outcome?;

            report(&outcome);
            if outcome.state != PlaybackState::Completed {
                std::process::exit(1);
            }
        }
        Command::Attach {
            url,
            config,
            headless,
            entry,
        } => {
            let config = player_config(config, headless)?;
            println!("Attaching: {}", url);

            let shutdown = shutdown_on_ctrl_c();
            let mut runner = Runner::new(&config).await?;
            let outcome = runner.attach(&url, entry, &shutdown).await;
            runner.close().await?;
            let outcome = outcome?;

            report(&outcome);
            if outcome.state != PlaybackState::Completed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

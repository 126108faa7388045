use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use humantime::format_duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use media_slideshow::cache::ResourceCache;
use media_slideshow::config::Configuration;
use media_slideshow::decode::DecoderRegistry;
use media_slideshow::error::ScanError;
use media_slideshow::events::{PlayerCommand, SurfaceEvent};
use media_slideshow::scan;
use media_slideshow::surfaces::HeadlessSurfaces;
use media_slideshow::tasks::slideshow::{LoggingListener, Slideshow};

#[derive(Debug, Parser)]
#[command(
    name = "media-slideshow",
    version,
    about = "Timed slideshow over a folder of images and videos"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Override playback.duration-seconds
    #[arg(long, value_name = "SECONDS")]
    duration: Option<u32>,
    /// Shuffle the collection once at startup
    #[arg(long)]
    shuffle: bool,
    /// Wrap around at both ends instead of stopping after the last item
    #[arg(long = "loop")]
    loop_playback: bool,
    /// Deterministic seed for the startup shuffle
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let fallback = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_target(false)
        .compact()
        .init();
}

fn parse_command(line: &str) -> Option<PlayerCommand> {
    match line.trim_end_matches(['\r', '\n']) {
        "n" | "next" => Some(PlayerCommand::Next),
        "p" | "prev" => Some(PlayerCommand::Prev),
        " " | "" | "pause" => Some(PlayerCommand::TogglePause),
        "q" | "quit" => Some(PlayerCommand::Stop),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut cfg = Configuration::from_yaml_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;
    if let Some(duration) = args.duration {
        cfg.playback.duration_seconds = duration;
    }
    cfg.playback.shuffle |= args.shuffle;
    cfg.playback.loop_playback |= args.loop_playback;
    if args.seed.is_some() {
        cfg.startup_shuffle_seed = args.seed;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        args.config.display(),
        cfg
    );

    let decoders = DecoderRegistry::from_options(&cfg.decoder);
    let root = &cfg.media_library_path;
    let mut items = scan::scan(root, &decoders)
        .with_context(|| format!("failed to scan {}", root.display()))?;
    if items.is_empty() {
        return Err(ScanError::EmptyScan(root.clone()).into());
    }
    tracing::info!(count = items.len(), root = %root.display(), "scanned media");

    if cfg.playback.shuffle {
        items = match cfg.startup_shuffle_seed {
            Some(seed) => scan::shuffle_seeded(&items, seed),
            None => scan::shuffle(&items),
        };
        tracing::debug!(seed = ?cfg.startup_shuffle_seed, "collection shuffled");
    }

    let cancel = CancellationToken::new();
    let (command_tx, command_rx) = mpsc::channel::<PlayerCommand>(16); // stdin -> Slideshow
    let (surface_tx, surface_rx) = mpsc::channel::<SurfaceEvent>(8); // Surfaces -> Slideshow

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    // Keyboard control; a detached thread so a pending read never holds up exit.
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!("stdin reader failed: {err}");
                    return;
                }
            };
            match parse_command(&line) {
                Some(cmd) => {
                    if command_tx.blocking_send(cmd).is_err() {
                        return;
                    }
                }
                None => tracing::warn!(input = %line, "unknown command (n, p, space, q)"),
            }
        }
        tracing::debug!("stdin closed; keyboard control disabled");
    });

    tracing::debug!(
        video_length = %format_duration(cfg.headless.video_length),
        "headless surfaces"
    );
    let surfaces = HeadlessSurfaces::new(surface_tx, cfg.headless.video_length);
    let cache = Arc::new(ResourceCache::new());
    let show = Slideshow::new(items, cfg.playback.clone(), cache, surfaces, LoggingListener)?
        .with_prefetch_count(cfg.prefetch_count);

    let outcome = show
        .run(command_rx, surface_rx, cancel.clone())
        .await
        .context("slideshow failed")?;
    cancel.cancel();
    tracing::info!(
        last_index = outcome.last_index,
        reached_end = outcome.reached_end,
        "slideshow exited"
    );
    Ok(())
}

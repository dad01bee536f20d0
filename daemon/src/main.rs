use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use lowview::acquirer::Acquirer;
use lowview::config::Config;
use lowview::discovery::YtDlp;
use lowview::display;
use lowview::player::Player;
use lowview::queue;
use lowview::video::GstDecoder;

#[derive(Parser)]
#[command(name = "lowview")]
#[command(about = "Play rarely watched videos on an LED panel", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (defaults to ~/.config/lowview/config.toml)
    #[arg(short, long, env = "LOWVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Override the display sink (spi, preview, null)
    #[arg(short, long)]
    sink: Option<String>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<Config> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };

    let mut config = Config::load_from_path(&path)?;
    if let Some(sink) = &args.sink {
        config.display.sink = sink.clone();
    }
    if let Some(level) = &args.log_level {
        config.general.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

fn log_config(cfg: &Config) {
    log::info!("✓ Configuration loaded");
    log::info!("  Log level: {}", cfg.general.log_level);
    log::info!("  Display:");
    log::info!("    - Sink: {}", cfg.display.sink);
    log::info!("    - Resolution: {}", cfg.display.resolution());
    if cfg.display.sink == "spi" {
        log::info!(
            "    - Bus: {} (mode {}, {} Hz)",
            cfg.display.spi_device,
            cfg.display.spi_mode,
            cfg.display.spi_speed_hz
        );
    }
    log::info!("  Queue:");
    log::info!("    - Capacity: {}", cfg.queue.capacity);
    log::info!("    - Startup buffer: {}", cfg.queue.min_buffered);
    log::info!("  Player:");
    log::info!("    - Max playback: {:.1}s", cfg.player.max_playback_secs);
    log::info!("    - Fallback fps: {}", cfg.player.fallback_fps);
    log::info!("  Discovery:");
    log::info!("    - Query: {} NNNN", cfg.discovery.query_prefix);
    log::info!("    - Max views: {}", cfg.discovery.max_views);
    log::info!(
        "    - Duration: {}s to {}s",
        cfg.discovery.min_duration_secs,
        cfg.discovery.max_duration_secs
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Read before logging starts so the configured level applies from the first line
    let config = load_config(&args)?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.general.log_level),
    )
    .init();

    log::info!("Starting lowview v{}", env!("CARGO_PKG_VERSION"));
    log_config(&config);

    let mut sink = display::open(&config.display)?;
    sink.reset().context("Failed to initialize display")?;
    log::info!("✓ Display ready ({})", sink.resolution());

    let decoder = GstDecoder::new().context("Failed to initialize video decoder")?;

    let discovery =
        YtDlp::new(config.discovery.clone()).context("Failed to set up discovery")?;
    match discovery.purge_scratch() {
        Ok(0) => {}
        Ok(n) => log::info!("Removed {} clip(s) left over from a previous run", n),
        Err(e) => log::warn!("Failed to clean scratch directory: {}", e),
    }
    let downloader =
        YtDlp::new(config.discovery.clone()).context("Failed to set up downloads")?;

    let (producer, consumer) = queue::bounded(config.queue.capacity);

    let acquirer = Acquirer::new(discovery, downloader, producer, &config.acquirer);
    let acquirer_handle = tokio::spawn(acquirer.run());

    let player = Player::new(decoder, sink, &config.player, &config.queue);
    let player_done = player
        .spawn(consumer)
        .context("Failed to start player thread")?;

    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            log::info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            log::info!("Received SIGINT, shutting down...");
        }
        result = player_done => {
            match result {
                Ok(sessions) => log::info!("Player finished after {} sessions", sessions),
                Err(_) => log::error!("Player thread exited without reporting"),
            }
        }
        result = acquirer_handle => {
            if let Err(e) = result {
                log::error!("Acquirer task failed: {}", e);
            }
        }
    }

    // The player thread is never joined; returning ends it mid-frame. Clips
    // still queued stay on disk and are purged on the next start.
    log::info!("lowview shutting down");
    Ok(())
}

use anyhow::{Context, Result};
use common::Resolution;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ensure_range, validate_enum};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub display: DisplaySettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub acquirer: AcquirerSettings,

    #[serde(default)]
    pub player: PlayerSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Display panel and transport
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplaySettings {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Which sink receives frames: spi, preview or null
    #[serde(default = "default_sink")]
    pub sink: String,

    #[serde(default = "default_spi_device")]
    pub spi_device: String,

    #[serde(default = "default_spi_speed")]
    pub spi_speed_hz: u32,

    #[serde(default = "default_spi_mode")]
    pub spi_mode: u8,

    /// Where the preview sink writes its PNG snapshots
    #[serde(default = "default_preview_path")]
    pub preview_path: String,

    /// Milliseconds between preview snapshots
    #[serde(default = "default_preview_interval")]
    pub preview_interval_ms: u64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            sink: default_sink(),
            spi_device: default_spi_device(),
            spi_speed_hz: default_spi_speed(),
            spi_mode: default_spi_mode(),
            preview_path: default_preview_path(),
            preview_interval_ms: default_preview_interval(),
        }
    }
}

impl DisplaySettings {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn preview_interval(&self) -> Duration {
        Duration::from_millis(self.preview_interval_ms)
    }
}

fn default_width() -> u32 {
    96
}
fn default_height() -> u32 {
    48
}
fn default_sink() -> String {
    "spi".to_string()
}
fn default_spi_device() -> String {
    "/dev/spidev0.1".to_string()
}
fn default_spi_speed() -> u32 {
    16_000_000
}
fn default_spi_mode() -> u8 {
    3
}
fn default_preview_path() -> String {
    "~/.cache/lowview/preview.png".to_string()
}
fn default_preview_interval() -> u64 {
    500
}

/// Hand-off queue between acquirer and player
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueSettings {
    /// Maximum number of downloaded videos waiting for playback
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Videos to buffer before the first playback starts
    #[serde(default = "default_min_buffered")]
    pub min_buffered: usize,

    /// Below this many queued videos the player warns that it is running low
    #[serde(default = "default_low_water")]
    pub low_water: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            min_buffered: default_min_buffered(),
            low_water: default_low_water(),
        }
    }
}

fn default_capacity() -> usize {
    10
}
fn default_min_buffered() -> usize {
    1
}
fn default_low_water() -> usize {
    2
}

/// Acquisition loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquirerSettings {
    /// How often to recheck a full queue
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

impl Default for AcquirerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

impl AcquirerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

fn default_poll_interval() -> u64 {
    50
}
fn default_backoff_initial() -> u64 {
    100
}
fn default_backoff_max() -> u64 {
    4000
}

/// Playback pacing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerSettings {
    /// Hard ceiling on the playback time of a single video
    #[serde(default = "default_max_playback")]
    pub max_playback_secs: f64,

    /// Frame rate assumed when neither timestamps nor caps provide one
    #[serde(default = "default_fallback_fps")]
    pub fallback_fps: f64,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            max_playback_secs: default_max_playback(),
            fallback_fps: default_fallback_fps(),
        }
    }
}

impl PlayerSettings {
    pub fn max_playback(&self) -> Duration {
        Duration::from_secs_f64(self.max_playback_secs)
    }
}

fn default_max_playback() -> f64 {
    15.0
}
fn default_fallback_fps() -> f64 {
    30.0
}

/// yt-dlp discovery and download
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoverySettings {
    /// yt-dlp executable
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: String,

    /// Search term placed before the random number
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,

    #[serde(default = "default_max_views")]
    pub max_views: u64,

    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u64,

    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,

    #[serde(default = "default_max_age")]
    pub max_age_days: i64,

    #[serde(default = "default_min_aspect")]
    pub min_aspect_ratio: f64,

    /// Candidates tried per discovery round
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds downloaded from the start of each video
    #[serde(default = "default_clip_secs")]
    pub clip_secs: u64,

    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            yt_dlp: default_yt_dlp(),
            query_prefix: default_query_prefix(),
            max_views: default_max_views(),
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
            max_age_days: default_max_age(),
            min_aspect_ratio: default_min_aspect(),
            max_attempts: default_max_attempts(),
            clip_secs: default_clip_secs(),
            format: default_format(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl DiscoverySettings {
    /// Scratch directory with `~` and environment variables expanded
    pub fn scratch_path(&self) -> Result<PathBuf> {
        expand_path(&self.scratch_dir)
    }
}

fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}
fn default_query_prefix() -> String {
    "IMG".to_string()
}
fn default_max_views() -> u64 {
    10
}
fn default_min_duration() -> u64 {
    10
}
fn default_max_duration() -> u64 {
    60
}
fn default_max_age() -> i64 {
    30
}
fn default_min_aspect() -> f64 {
    1.5
}
fn default_max_attempts() -> u32 {
    25
}
fn default_clip_secs() -> u64 {
    10
}
fn default_format() -> String {
    "worstvideo".to_string()
}
fn default_scratch_dir() -> String {
    "~/.cache/lowview/scratch".to_string()
}

/// Expand `~` and `$VARS` in a configured path
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded =
        shellexpand::full(raw).with_context(|| format!("Failed to expand path: {}", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("lowview");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;
        self.validate_sink(&self.display.sink)?;

        ensure_range!(self.display.width, 1..=4096, "display.width");
        ensure_range!(self.display.height, 1..=4096, "display.height");
        ensure_range!(self.display.spi_mode, 0..=3, "display.spi_mode");

        ensure_range!(self.queue.capacity, 1..=1024, "queue.capacity");
        if self.queue.min_buffered > self.queue.capacity {
            anyhow::bail!(
                "queue.min_buffered ({}) exceeds queue.capacity ({})",
                self.queue.min_buffered,
                self.queue.capacity
            );
        }

        ensure_range!(
            self.acquirer.poll_interval_ms,
            1..=60_000,
            "acquirer.poll_interval_ms"
        );
        if self.acquirer.backoff_initial_ms == 0
            || self.acquirer.backoff_initial_ms > self.acquirer.backoff_max_ms
        {
            anyhow::bail!(
                "acquirer backoff must satisfy 0 < initial ({}) <= max ({})",
                self.acquirer.backoff_initial_ms,
                self.acquirer.backoff_max_ms
            );
        }

        ensure_range!(
            self.player.max_playback_secs,
            0.001..=3600.0,
            "player.max_playback_secs"
        );
        ensure_range!(self.player.fallback_fps, 0.1..=1000.0, "player.fallback_fps");

        if self.discovery.min_duration_secs > self.discovery.max_duration_secs {
            anyhow::bail!(
                "discovery.min_duration_secs ({}) exceeds discovery.max_duration_secs ({})",
                self.discovery.min_duration_secs,
                self.discovery.max_duration_secs
            );
        }
        ensure_range!(self.discovery.max_attempts, 1..=1000, "discovery.max_attempts");
        ensure_range!(self.discovery.clip_secs, 1..=600, "discovery.clip_secs");

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }

    fn validate_sink(&self, sink: &str) -> Result<()> {
        validate_enum!(sink, "spi", "preview", "null")
    }
}

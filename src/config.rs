use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Per-session playback settings. Fixed once the session starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PlaybackConfig {
    /// How long an image stays up before auto-advancing, in whole seconds.
    pub duration_seconds: u32,
    /// Reorder the collection once at session start.
    pub shuffle: bool,
    /// Wrap around at both ends of the collection instead of stopping.
    #[serde(rename = "loop")]
    pub loop_playback: bool,
}

impl PlaybackConfig {
    #[must_use]
    pub fn image_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_seconds))
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.duration_seconds >= 1,
            "playback.duration-seconds must be at least 1"
        );
        Ok(())
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 5,
            shuffle: false,
            loop_playback: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }
}

/// Settings for the fallback decoder.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DecoderOptions {
    /// Output quality in `0.0..=1.0`; only JPEG output uses it.
    pub quality: f32,
    pub output_format: OutputFormat,
    /// Extensions (lowercase, no dot) routed through the fallback decoder.
    pub fallback_extensions: Vec<String>,
}

impl DecoderOptions {
    fn validate(&mut self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.quality),
            "decoder.quality must be within 0.0..=1.0"
        );
        for ext in &mut self.fallback_extensions {
            let trimmed = ext.trim().trim_start_matches('.').to_ascii_lowercase();
            ensure!(
                !trimmed.is_empty(),
                "decoder.fallback-extensions entries must not be empty"
            );
            *ext = trimmed;
        }
        Ok(())
    }
}

fn default_fallback_extensions() -> Vec<String> {
    let mut exts = vec!["tif".to_string(), "tiff".to_string()];
    if cfg!(feature = "heic") {
        exts.extend(["heic".to_string(), "heif".to_string()]);
    }
    exts
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            quality: 0.9,
            output_format: OutputFormat::Jpeg,
            fallback_extensions: default_fallback_extensions(),
        }
    }
}

/// Settings for the headless surfaces used by the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct HeadlessOptions {
    /// Nominal playback length of every video on the simulated video clock.
    #[serde(with = "humantime_serde")]
    pub video_length: Duration,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            video_length: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Root directory scanned recursively for images and videos.
    pub media_library_path: PathBuf,
    pub playback: PlaybackConfig,
    /// Number of upcoming items resolved in the background.
    pub prefetch_count: usize,
    /// Optional deterministic seed for the startup shuffle.
    pub startup_shuffle_seed: Option<u64>,
    pub decoder: DecoderOptions,
    pub headless: HeadlessOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            !self.media_library_path.as_os_str().is_empty(),
            "media-library-path must be set"
        );
        ensure!(
            self.prefetch_count > 0,
            "prefetch-count must be greater than zero"
        );
        ensure!(
            !self.headless.video_length.is_zero(),
            "headless.video-length must be positive"
        );
        self.playback
            .validate()
            .context("invalid playback configuration")?;
        self.decoder
            .validate()
            .context("invalid decoder configuration")?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            media_library_path: PathBuf::new(),
            playback: PlaybackConfig::default(),
            prefetch_count: 3,
            startup_shuffle_seed: None,
            decoder: DecoderOptions::default(),
            headless: HeadlessOptions::default(),
        }
    }
}

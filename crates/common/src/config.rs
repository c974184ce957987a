//! Player and tool configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::clock::{MAX_FRAME_RATE, MIN_FRAME_RATE};
use crate::error::{PlayerError, PlayerResult};
use crate::{MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};

/// A width/height pair in logical (CSS-equivalent) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both dimensions finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Numeric and boolean options recognised by the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// GPU backend request. `None` tries the GPU and falls back silently,
    /// `Some(true)` reports a failed GPU init as a warning, `Some(false)`
    /// uses the software backend only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_gpu_backend: Option<bool>,

    /// Start playing as soon as both sources are ready.
    pub autoplay: bool,

    /// Composite rate in Hz (1-120).
    pub target_frame_rate: u32,

    /// Treat a duration mismatch as fatal.
    pub strict_duration: bool,

    /// Fixed presentation size. Wins over auto-sizing.
    pub fixed_size: Option<Size>,

    /// Bounding box for auto-sizing.
    pub max_size: Option<Size>,

    /// Derive the output size from the sources' natural dimensions.
    pub auto_size: bool,

    /// Poll for the surface reference instead of failing immediately.
    pub wait_for_surface: bool,

    /// How long to poll for the surface reference.
    pub surface_timeout_secs: f64,

    /// Skip sync and render work while the surface is not visible.
    pub pause_when_hidden: bool,

    /// Per-source load timeout.
    pub load_timeout_secs: f64,

    /// Initial volume (0.0-1.0).
    pub initial_volume: f64,

    /// Initial playback rate. Clamped like `set_playback_rate`.
    pub initial_rate: f64,

    /// Initial repeat count (-1 infinite, 0 none, n finite).
    pub repeat_count: i32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            use_gpu_backend: None,
            autoplay: true,
            target_frame_rate: 60,
            strict_duration: false,
            fixed_size: None,
            max_size: None,
            auto_size: true,
            wait_for_surface: false,
            surface_timeout_secs: 5.0,
            pause_when_hidden: true,
            load_timeout_secs: 30.0,
            initial_volume: 1.0,
            initial_rate: 1.0,
            repeat_count: -1,
        }
    }
}

impl PlayerConfig {
    /// Reject out-of-range numeric options.
    pub fn validate(&self) -> PlayerResult<()> {
        if !(MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&self.target_frame_rate) {
            return Err(PlayerError::invalid_input(format!(
                "target_frame_rate must be within {MIN_FRAME_RATE}-{MAX_FRAME_RATE}, got {}",
                self.target_frame_rate
            )));
        }
        if !self.load_timeout_secs.is_finite() || self.load_timeout_secs <= 0.0 {
            return Err(PlayerError::invalid_input(
                "load_timeout_secs must be a positive number",
            ));
        }
        if !self.surface_timeout_secs.is_finite() || self.surface_timeout_secs <= 0.0 {
            return Err(PlayerError::invalid_input(
                "surface_timeout_secs must be a positive number",
            ));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(PlayerError::invalid_input(format!(
                "initial_volume must be within 0-1, got {}",
                self.initial_volume
            )));
        }
        if !self.initial_rate.is_finite() || self.initial_rate <= 0.0 {
            return Err(PlayerError::invalid_input(format!(
                "initial_rate must be positive (clamped to {MIN_PLAYBACK_RATE}-{MAX_PLAYBACK_RATE}), got {}",
                self.initial_rate
            )));
        }
        if self.repeat_count < -1 {
            return Err(PlayerError::invalid_input(format!(
                "repeat_count must be -1 or greater, got {}",
                self.repeat_count
            )));
        }
        for (name, size) in [("fixed_size", self.fixed_size), ("max_size", self.max_size)] {
            if let Some(size) = size {
                if !size.is_valid() {
                    return Err(PlayerError::invalid_input(format!(
                        "{name} must have positive width and height"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parse a config from JSON and validate it.
    pub fn from_json_str(json: &str) -> PlayerResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "alphaplay_player=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration file for the `alphaplay` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Player options applied to every session.
    pub player: PlayerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl ToolConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> PlayerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.player.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("alphaplay").join("config.json")
}

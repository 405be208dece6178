//! Engine and gameplay configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Files are JSON:
//!
//! ```json
//! { "title": "My Platformer", "pixel_scale": 4, "tuning": { "gravity": 20.0 } }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Configuration values for the engine window and runtime behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub title: String,
    /// Initial window size in logical pixels.
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    /// Frame slots the presenter cycles through.
    pub frames_in_flight: u32,
    /// Fixed simulation rate in ticks per second.
    pub tick_rate: f64,
    /// Below this frame rate the simulation slows down instead of catching up.
    pub min_fps: f64,
    /// Screen pixels per world pixel.
    pub pixel_scale: u32,
    /// Directory scanned for sprite files.
    pub sprite_dir: PathBuf,
    /// LDtk project with the game's levels.
    pub level_path: PathBuf,
    pub tuning: Tuning,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Platcore Game".into(),
            width: 1280,
            height: 720,
            vsync: true,
            frames_in_flight: 2,
            tick_rate: 60.0,
            min_fps: 10.0,
            pixel_scale: 3,
            sprite_dir: PathBuf::from("assets/sprites"),
            level_path: PathBuf::from("assets/levels/world.ldtk"),
            tuning: Tuning::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| anyhow!("failed to read config {}: {err}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|err| anyhow!("invalid config {}: {err}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`EngineConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(anyhow!("frames_in_flight must be at least 1"));
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.tick_rate) || !positive(self.min_fps) {
            return Err(anyhow!("tick_rate and min_fps must be positive"));
        }
        if self.pixel_scale == 0 {
            return Err(anyhow!("pixel_scale must be at least 1"));
        }
        Ok(())
    }

    /// Override the window title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Override the initial window size in logical pixels.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable vertical sync.
    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    #[must_use]
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self
    }

    #[must_use]
    pub fn with_pixel_scale(mut self, scale: u32) -> Self {
        self.pixel_scale = scale;
        self
    }
}

/// Movement constants for one entity type. Velocities are in pixels per
/// tick; accelerations and friction in pixels per tick per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoverTuning {
    pub run_acceleration: f32,
    pub friction: f32,
    pub max_speed: f32,
}

impl Default for MoverTuning {
    fn default() -> Self {
        Self {
            run_acceleration: 24.0,
            friction: 30.0,
            max_speed: 2.0,
        }
    }
}

/// Gameplay constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub gravity: f32,
    pub max_fall_speed: f32,
    /// Upward velocity applied when a jump starts.
    pub jump_speed: f32,
    pub player: MoverTuning,
    pub mob: MoverTuning,
    /// Horizontal range in pixels within which mobs chase the player.
    pub chase_distance: f32,
    /// Mobs this close to the player horizontally stop accelerating.
    pub chase_dead_zone: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            gravity: 18.0,
            max_fall_speed: 6.0,
            jump_speed: 5.0,
            player: MoverTuning::default(),
            mob: MoverTuning {
                run_acceleration: 12.0,
                friction: 20.0,
                max_speed: 1.0,
            },
            chase_distance: 96.0,
            chase_dead_zone: 4.0,
        }
    }
}

//! Application Configuration
//!
//! Persistent settings for the decode CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::media::{HwDeviceKind, PixelFormat};

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Decoding ===
    /// Hardware device used for decoding ("none" = software)
    pub hw_device: HwDeviceKind,

    /// Stop after this many frames
    pub max_frames: Option<u64>,

    // === Conversion ===
    /// Output size relative to the decoded size
    pub output_scale: f32,

    /// Pixel format frames are converted to
    pub output_format: PixelFormat,

    // === Logging ===
    /// Mirror log lines to stdout
    pub console_log: bool,

    /// Include debug output from this crate
    pub verbose_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hw_device: HwDeviceKind::None,
            max_frames: None,
            output_scale: 1.0,
            output_format: PixelFormat::Bgr24,
            console_log: false,
            verbose_log: false,
        }
    }
}

impl Settings {
    /// Get settings file path
    fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("streamdecode").join("settings.json"))
    }

    /// Load settings from disk
    pub fn load() -> Result<Self> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;
        Self::load_from(&path)
    }

    /// Load settings from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            crate::utils::ensure_dir(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Output scale clamped to a usable range
    pub fn effective_scale(&self) -> f32 {
        if self.output_scale.is_finite() && self.output_scale > 0.0 {
            self.output_scale.min(4.0)
        } else {
            1.0
        }
    }
}

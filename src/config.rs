//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields
//! the stock behaviour.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::FOREGROUND_THRESHOLD;

/// Settings for the whole recognition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Intensity below which a pixel counts as foreground
    pub binarize_threshold: u8,

    /// Rows/columns of slack tolerated around detected lines
    pub line_distortion: i32,

    pub deskew: DeskewConfig,

    /// Directory holding the reference glyph images
    pub template_dir: PathBuf,

    /// Time signature written into the first measure of each system.
    /// The glyph itself is located but not read.
    pub time_signature: TimeSignatureConfig,

    /// Name written into the part list
    pub part_name: String,
}

/// Angle search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewConfig {
    pub step_degrees: f64,
    pub max_degrees: f64,
    /// Row projection value a staff line must exceed (half the width if unset)
    pub line_threshold: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSignatureConfig {
    pub beats: u32,
    pub beat_type: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            binarize_threshold: FOREGROUND_THRESHOLD,
            line_distortion: 2,
            deskew: DeskewConfig::default(),
            template_dir: PathBuf::from("symbols"),
            time_signature: TimeSignatureConfig::default(),
            part_name: "Music".to_string(),
        }
    }
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self {
            step_degrees: 0.05,
            max_degrees: 2.0,
            line_threshold: None,
        }
    }
}

impl Default for TimeSignatureConfig {
    fn default() -> Self {
        Self {
            beats: 4,
            beat_type: 4,
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document; missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Staff-line threshold for an image of the given width.
    pub fn line_threshold(&self, width: u32) -> u32 {
        self.deskew.line_threshold.unwrap_or(width / 2)
    }
}

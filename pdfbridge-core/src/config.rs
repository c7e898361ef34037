use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::view::{ColorMode, ToolMode};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub log_level: String,
    pub state_dir: Option<PathBuf>,
    pub view: ViewDefaults,
    pub thumbnail: ThumbnailConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            state_dir: None,
            view: ViewDefaults::default(),
            thumbnail: ThumbnailConfig::default(),
        }
    }
}

/// Settings a freshly opened view starts with, before any persisted state
/// for the document is applied.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewDefaults {
    pub zoom: f64,
    pub continuous: bool,
    #[serde_as(as = "DisplayFromStr")]
    pub tool_mode: ToolMode,
    #[serde_as(as = "DisplayFromStr")]
    pub color_mode: ColorMode,
}

impl Default for ViewDefaults {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            continuous: true,
            tool_mode: ToolMode::default(),
            color_mode: ColorMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    /// Longest edge of a thumbnail, in pixels.
    pub max_dimension: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { max_dimension: 256 }
    }
}

impl BridgeConfig {
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&source).with_context(|| format!("in config file {:?}", path))
    }

    /// Loads `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.view.zoom.is_finite() && self.view.zoom > 0.0,
            "view.zoom must be a positive number, got {}",
            self.view.zoom
        );
        ensure!(
            self.thumbnail.max_dimension > 0,
            "thumbnail.max_dimension must be at least 1"
        );
        Ok(())
    }
}

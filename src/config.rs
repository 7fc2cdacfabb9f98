//! Composer configuration, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::render_target::{FilterMode, TargetFormat, TargetOptions};

/// Options for the composer's ping-pong buffers and pass scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Color format of the internal buffers.
    pub format: TargetFormat,
    /// Allocate a depth attachment on the input buffer, exposed to passes that read depth.
    pub depth_buffer: bool,
    /// Allocate stencil bits for mask passes.
    pub stencil_buffer: bool,
    /// Multisample count requested for the buffers
    pub samples: u32,
    pub filter: FilterMode,
    /// Route the last enabled pass to the output surface automatically.
    pub auto_render_to_screen: bool,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            format: TargetFormat::Rgba8Unorm,
            depth_buffer: true,
            stencil_buffer: false,
            samples: 1,
            filter: FilterMode::Linear,
            auto_render_to_screen: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

impl ComposerConfig {
    /// Load config from a path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save config to a path
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Allocation options for the composer's buffers.
    pub fn target_options(&self) -> TargetOptions {
        TargetOptions {
            format: self.format,
            filter: self.filter,
            depth_buffer: self.depth_buffer,
            stencil_buffer: self.stencil_buffer,
            samples: self.samples.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = ComposerConfig::from_toml_str("stencil_buffer = true\nformat = \"rgba16_float\"").unwrap();
        assert!(config.stencil_buffer);
        assert!(config.depth_buffer);
        assert_eq!(config.format, TargetFormat::Rgba16Float);
        assert!(config.auto_render_to_screen);
    }

    #[test]
    fn rejects_unknown_format() {
        let err = ComposerConfig::from_toml_str("format = \"rgb565\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("afterglow-config-{}", std::process::id()));
        let path = dir.join("composer.toml");
        let config = ComposerConfig {
            samples: 4,
            filter: FilterMode::Nearest,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ComposerConfig::load(&path).unwrap(), config);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn zero_samples_become_one() {
        let config = ComposerConfig {
            samples: 0,
            ..Default::default()
        };
        assert_eq!(config.target_options().samples, 1);
    }
}

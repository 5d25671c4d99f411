//! Persisted configuration
//!
//! Settings are written by the application and read back at startup. Files
//! are TOML or RON, picked by extension.

use serde::{Deserialize, Serialize};

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Loadable/savable configuration value.
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a TOML or RON file.
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to a TOML or RON file.
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Load from file, falling back to defaults when the file is missing
    /// or unreadable.
    fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::info!("Using default settings ({path}: {e})");
                Self::default()
            }
        }
    }
}

/// Renderer settings persisted across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererSettings {
    /// Preferred physical-device name; first suitable device when absent
    pub preferred_device: Option<String>,
    /// Vertical synchronization
    pub vsync: bool,
    /// Window width in screen coordinates
    pub window_width: u32,
    /// Window height in screen coordinates
    pub window_height: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            preferred_device: None,
            vsync: true,
            window_width: 1280,
            window_height: 720,
        }
    }
}

impl Config for RendererSettings {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_survive_a_toml_round_trip() {
        let dir = std::env::temp_dir();
        let path = dir.join("render_engine_settings_test.toml");
        let path = path.to_str().unwrap();

        let settings = RendererSettings {
            preferred_device: Some("TestDevice".to_string()),
            vsync: false,
            window_width: 1920,
            window_height: 1080,
        };
        settings.save_to_file(path).unwrap();
        let loaded = RendererSettings::load_from_file(path).unwrap();
        let _ = std::fs::remove_file(path);

        assert_eq!(settings, loaded);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loaded = RendererSettings::load_or_default("does_not_exist.toml");
        assert_eq!(loaded, RendererSettings::default());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            RendererSettings::default().save_to_file("settings.yaml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}

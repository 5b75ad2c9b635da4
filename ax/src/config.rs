//! AnchorSync configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorConfig;

/// Main AnchorSync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordinator tunables (room, thresholds, tick)
    pub coordinator: CoordinatorConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .anchorsync.yml
        let local_config = PathBuf::from(".anchorsync.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/anchorsync/anchorsync.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("anchorsync").join("anchorsync.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the anchor cache database
    #[serde(rename = "cache-path")]
    pub cache_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_path: anchorstore::default_store_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.coordinator.room_name, "ShareRoom");
        assert_eq!(config.coordinator.room_id, 74656);
        assert!(config.storage.cache_path.ends_with("anchors.db"));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
coordinator:
  room-name: Atrium
  room-id: 12345
  keep-room-alive: false
  min-trustworthy-anchor-bytes: 50000
  tick-ms: 16

storage:
  cache-path: /tmp/anchorsync/test.db
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.coordinator.room_name, "Atrium");
        assert_eq!(config.coordinator.room_id, 12345);
        assert!(!config.coordinator.keep_room_alive);
        assert_eq!(config.coordinator.min_trustworthy_anchor_bytes, 50_000);
        assert_eq!(config.coordinator.tick_ms, 16);
        assert_eq!(config.storage.cache_path, PathBuf::from("/tmp/anchorsync/test.db"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
coordinator:
  room-name: Atrium
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.coordinator.room_name, "Atrium");

        // Defaults for unspecified
        assert_eq!(config.coordinator.room_id, 74656);
        assert!(config.coordinator.keep_room_alive);
        assert_eq!(config.coordinator.min_trustworthy_anchor_bytes, 100_000);
    }
}

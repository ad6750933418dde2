//! TOML configuration file I/O
//!
//! Handles loading and saving the tunnel configuration to/from TOML files
//! in the user's configuration directory.

use crate::config::{CoordinatorSettings, ProviderConfig};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Complete TOML configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Provider settings for the tunnel
    #[serde(rename = "tunnel")]
    pub provider: ProviderConfig,

    /// Coordinator settings (optional)
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
}

impl TomlConfig {
    /// Create a new TOML configuration
    pub fn new(provider: ProviderConfig, coordinator: CoordinatorSettings) -> Self {
        Self {
            provider,
            coordinator,
        }
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider
            .validate()
            .map_err(|message| ConfigError::ValidationError { message })?;
        self.coordinator
            .validate()
            .map_err(|message| ConfigError::ValidationError {
                message: format!("Invalid coordinator settings: {}", message),
            })?;
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::LoadFailed {
                path: path.to_string_lossy().to_string(),
            },
            _ => ConfigError::IoError {
                message: format!("Failed to read config file: {}", e),
            },
        })?;

        let config: TomlConfig = toml::from_str(&contents).map_err(|e| ConfigError::ValidationError {
            message: format!("Failed to parse config file: {}", e),
        })?;

        config.validate()?;
        debug!(
            profile = %config.provider.profile.display(),
            reconnect_delay_secs = config.coordinator.reconnect_delay_secs,
            "Loaded tunnel configuration"
        );

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError {
            message: format!("Failed to serialize config: {}", e),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        std::fs::write(path, contents).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file: {}", e),
        })?;

        info!("Saved tunnel configuration to {:?}", path);
        Ok(())
    }
}

/// Default configuration file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Get the default configuration directory
///
/// Returns ~/.config/packet-tunnel, or PACKET_TUNNEL_CONFIG_DIR if set
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(config_dir) = std::env::var("PACKET_TUNNEL_CONFIG_DIR") {
        return Ok(PathBuf::from(config_dir));
    }

    let home = std::env::var("HOME").map_err(|_| ConfigError::IoError {
        message: "HOME environment variable not set".to_string(),
    })?;

    Ok(PathBuf::from(home).join(".config").join("packet-tunnel"))
}

/// Get the default configuration file path
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the default TOML file
pub fn load_config() -> Result<TomlConfig, ConfigError> {
    TomlConfig::from_file(&get_config_path()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let original = TomlConfig::new(
            ProviderConfig::new("test.ovpn").with_credentials("uid", "pw123"),
            CoordinatorSettings {
                reconnect_delay_secs: 10,
                ..CoordinatorSettings::default()
            },
        );

        original.to_file(&config_path).unwrap();
        let loaded = TomlConfig::from_file(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_coordinator_section_is_optional() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[tunnel]\nprofile = \"test.ovpn\"\n").unwrap();

        let loaded = TomlConfig::from_file(&config_path).unwrap();
        assert_eq!(loaded.coordinator, CoordinatorSettings::default());
        assert!(loaded.provider.persist_on_sleep);
        assert!(!loaded.provider.auto_login);
    }

    #[test]
    fn test_missing_file_is_load_failure() {
        let temp_dir = tempdir().unwrap();
        let err = TomlConfig::from_file(&temp_dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::LoadFailed { .. }));
    }

    #[test]
    fn test_invalid_settings_rejected_on_load() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[tunnel]\nprofile = \"test.ovpn\"\n\n[coordinator]\nreachability_poll_secs = 0\n",
        )
        .unwrap();

        let err = TomlConfig::from_file(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }
}

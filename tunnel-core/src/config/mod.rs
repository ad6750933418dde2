//! Configuration module
//!
//! Handles the provider configuration a start request is built from and the
//! coordinator settings, both loaded from TOML files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{Credentials, TunnelConfiguration};

pub mod toml_config;

/// Provider configuration for a tunnel
///
/// Names the connection profile on disk and the optional credentials handed
/// to the engine when the profile cannot authenticate on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Path to the OpenVPN profile, relative paths resolve against the config directory
    pub profile: PathBuf,

    /// Username for profiles that require credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for profiles that require credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Keep the tunnel up while the host sleeps
    #[serde(default = "default_persist_on_sleep")]
    pub persist_on_sleep: bool,

    /// Profile authenticates without credentials
    #[serde(default)]
    pub auto_login: bool,
}

fn default_persist_on_sleep() -> bool {
    true
}

impl ProviderConfig {
    /// Create a provider configuration for a profile path
    pub fn new(profile: impl Into<PathBuf>) -> Self {
        Self {
            profile: profile.into(),
            username: None,
            password: None,
            persist_on_sleep: true,
            auto_login: false,
        }
    }

    /// Attach credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.profile.as_os_str().is_empty() {
            return Err("Profile path cannot be empty".to_string());
        }

        match (&self.username, &self.password) {
            (Some(username), _) if username.is_empty() => {
                Err("Username cannot be empty".to_string())
            }
            (Some(_), None) => Err("Password is required when a username is set".to_string()),
            (None, Some(_)) => Err("Username is required when a password is set".to_string()),
            _ => Ok(()),
        }
    }

    /// Resolve the profile path against `base_dir`
    pub fn profile_path(&self, base_dir: &Path) -> PathBuf {
        if self.profile.is_absolute() {
            self.profile.clone()
        } else {
            base_dir.join(&self.profile)
        }
    }

    /// Read the profile and build the immutable per-session configuration
    pub fn into_tunnel_configuration(&self, base_dir: &Path) -> Result<TunnelConfiguration, ConfigError> {
        self.validate()
            .map_err(|message| ConfigError::ValidationError { message })?;

        let path = self.profile_path(base_dir);
        let profile = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::LoadFailed {
                path: path.to_string_lossy().to_string(),
            },
            _ => ConfigError::IoError {
                message: format!("Failed to read profile {}: {}", path.display(), e),
            },
        })?;

        let mut builder = TunnelConfiguration::builder(profile)
            .persist_across_sleep(self.persist_on_sleep)
            .auto_login(self.auto_login);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

/// Coordinator and engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Fixed delay before a reachability-triggered reconnect
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// How often the NetworkManager path source is polled
    #[serde(default = "default_reachability_poll")]
    pub reachability_poll_secs: u64,

    /// OpenVPN executable name or path
    #[serde(default = "default_openvpn_binary")]
    pub openvpn_binary: String,
}

fn default_reconnect_delay() -> u64 {
    5
}
fn default_reachability_poll() -> u64 {
    10
}
fn default_openvpn_binary() -> String {
    "openvpn".to_string()
}

impl CoordinatorSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn reachability_poll_interval(&self) -> Duration {
        Duration::from_secs(self.reachability_poll_secs)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), String> {
        if self.reconnect_delay_secs > 300 {
            return Err(format!(
                "reconnect_delay_secs must be between 0 and 300, got: {}",
                self.reconnect_delay_secs
            ));
        }

        if self.reachability_poll_secs < 1 || self.reachability_poll_secs > 3600 {
            return Err(format!(
                "reachability_poll_secs must be between 1 and 3600, got: {}",
                self.reachability_poll_secs
            ));
        }

        if self.openvpn_binary.trim().is_empty() {
            return Err("openvpn_binary cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            reachability_poll_secs: default_reachability_poll(),
            openvpn_binary: default_openvpn_binary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_provider_validation() {
        assert!(ProviderConfig::new("client.ovpn").validate().is_ok());
        assert!(ProviderConfig::new("client.ovpn")
            .with_credentials("uid", "pw123")
            .validate()
            .is_ok());

        let invalid = vec![
            ProviderConfig::new(""),
            ProviderConfig::new("client.ovpn").with_credentials("", "pw123"),
            ProviderConfig {
                password: None,
                ..ProviderConfig::new("client.ovpn").with_credentials("uid", "pw123")
            },
            ProviderConfig {
                username: None,
                ..ProviderConfig::new("client.ovpn").with_credentials("uid", "pw123")
            },
        ];
        for config in invalid {
            assert!(config.validate().is_err(), "{:?} should be invalid", config);
        }
    }

    #[test]
    fn test_relative_profile_resolves_against_base_dir() {
        let config = ProviderConfig::new("test.ovpn");
        assert_eq!(
            config.profile_path(Path::new("/etc/packet-tunnel")),
            PathBuf::from("/etc/packet-tunnel/test.ovpn")
        );

        let config = ProviderConfig::new("/opt/test.ovpn");
        assert_eq!(
            config.profile_path(Path::new("/etc/packet-tunnel")),
            PathBuf::from("/opt/test.ovpn")
        );
    }

    #[test]
    fn test_into_tunnel_configuration_reads_profile() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("test.ovpn"), "client\nremote 127.0.0.1 1194\n").unwrap();

        let config = ProviderConfig::new("test.ovpn")
            .with_credentials("uid", "pw123")
            .into_tunnel_configuration(dir.path())
            .unwrap();

        assert_eq!(config.profile(), b"client\nremote 127.0.0.1 1194\n");
        assert_eq!(config.credentials().unwrap().username(), "uid");
        assert!(config.persist_across_sleep());
    }

    #[test]
    fn test_missing_profile_is_a_load_failure() {
        let dir = tempdir().unwrap();
        let err = ProviderConfig::new("missing.ovpn")
            .into_tunnel_configuration(dir.path())
            .unwrap_err();
        assert!(matches!(err, ConfigError::LoadFailed { .. }));
    }

    #[test]
    fn test_coordinator_settings_defaults() {
        let settings = CoordinatorSettings::default();
        assert_eq!(settings.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(settings.reachability_poll_interval(), Duration::from_secs(10));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_coordinator_settings_validation() {
        let mut settings = CoordinatorSettings::default();
        settings.reachability_poll_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = CoordinatorSettings::default();
        settings.reconnect_delay_secs = 301;
        assert!(settings.validate().is_err());

        let mut settings = CoordinatorSettings::default();
        settings.openvpn_binary = "  ".to_string();
        assert!(settings.validate().is_err());
    }
}

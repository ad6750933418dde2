//! Type definitions for tunnel start requests
//!
//! This module provides the immutable per-session configuration and the
//! secrecy-wrapped credentials it carries, so passwords never end up in logs
//! or debug output.

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Username/password pair handed to the engine when it cannot auto-login
#[derive(Clone, Debug)]
pub struct Credentials {
    username: String,
    password: Secret<String>,
}

impl Credentials {
    /// Create a new credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password.into()),
        }
    }

    /// Account name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Expose the password value (use with caution!)
    ///
    /// This should only be called when handing the credentials to the engine.
    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Immutable configuration for one tunnel session
///
/// Built once per start request and owned by the coordinator until the
/// session ends.
#[derive(Clone, Debug)]
pub struct TunnelConfiguration {
    profile: Vec<u8>,
    credentials: Option<Credentials>,
    persist_across_sleep: bool,
    auto_login: bool,
}

impl TunnelConfiguration {
    /// Start building a configuration around an opaque connection profile
    pub fn builder(profile: impl Into<Vec<u8>>) -> TunnelConfigurationBuilder {
        TunnelConfigurationBuilder {
            profile: profile.into(),
            credentials: None,
            persist_across_sleep: true,
            auto_login: false,
        }
    }

    /// Raw server connection profile
    pub fn profile(&self) -> &[u8] {
        &self.profile
    }

    /// Optional credentials supplied with the start request
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Keep the tunnel device alive across sleep
    pub fn persist_across_sleep(&self) -> bool {
        self.persist_across_sleep
    }

    /// Whether the caller expects the profile to authenticate on its own
    pub fn auto_login(&self) -> bool {
        self.auto_login
    }

    /// Check the configuration before any engine call
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ConfigError::EmptyProfile);
        }

        if let Some(credentials) = &self.credentials {
            if credentials.username().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "username".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Builder for [`TunnelConfiguration`]
#[derive(Debug)]
pub struct TunnelConfigurationBuilder {
    profile: Vec<u8>,
    credentials: Option<Credentials>,
    persist_across_sleep: bool,
    auto_login: bool,
}

impl TunnelConfigurationBuilder {
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn persist_across_sleep(mut self, persist: bool) -> Self {
        self.persist_across_sleep = persist;
        self
    }

    pub fn auto_login(mut self, auto_login: bool) -> Self {
        self.auto_login = auto_login;
        self
    }

    pub fn build(self) -> TunnelConfiguration {
        TunnelConfiguration {
            profile: self.profile,
            credentials: self.credentials,
            persist_across_sleep: self.persist_across_sleep,
            auto_login: self.auto_login,
        }
    }
}

/// Reason codes the host supplies when stopping a tunnel
///
/// Only logged by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    #[default]
    None,
    UserInitiated,
    ProviderFailed,
    NoNetworkAvailable,
    UnrecoverableNetworkChange,
    ProviderDisabled,
    ConfigurationRemoved,
    Superceded,
    UserLogout,
    UserSwitch,
    ConnectionFailed,
    Sleep,
    AppUpdate,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StopReason::None => "none",
            StopReason::UserInitiated => "user initiated",
            StopReason::ProviderFailed => "provider failed",
            StopReason::NoNetworkAvailable => "no network available",
            StopReason::UnrecoverableNetworkChange => "unrecoverable network change",
            StopReason::ProviderDisabled => "provider disabled",
            StopReason::ConfigurationRemoved => "configuration removed",
            StopReason::Superceded => "superceded",
            StopReason::UserLogout => "user logout",
            StopReason::UserSwitch => "user switch",
            StopReason::ConnectionFailed => "connection failed",
            StopReason::Sleep => "sleep",
            StopReason::AppUpdate => "app update",
        };
        f.write_str(name)
    }
}

//! Error types for the packet tunnel
//!
//! This module defines the error taxonomy shared by the session coordinator,
//! the engine adapters and the configuration layer.

use thiserror::Error;

/// Main error type for tunnel sessions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    /// Malformed or missing profile, or credentials required but absent
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The engine rejected the configuration or the credentials
    #[error("Engine rejected configuration: {0}")]
    EngineApply(EngineError),

    /// Connection-breaking engine error
    #[error("Fatal engine error: {0}")]
    EngineFatal(EngineError),

    /// Recoverable engine error, only ever logged
    #[error("Engine error: {0}")]
    EngineNonFatal(EngineError),

    /// Host-side failure while applying tunnel network settings
    #[error("I/O error: {0}")]
    Io(String),

    /// A start was requested while a session is already running
    #[error("A tunnel session is already {state}")]
    SessionActive { state: String },

    /// The coordinator task is gone and can no longer resolve requests
    #[error("Tunnel coordinator has shut down")]
    CoordinatorClosed,
}

impl TunnelError {
    /// Check if this error was classified as connection-breaking
    pub fn is_fatal(&self) -> bool {
        matches!(self, TunnelError::EngineFatal(_))
    }
}

impl From<std::io::Error> for TunnelError {
    fn from(err: std::io::Error) -> Self {
        TunnelError::Io(err.to_string())
    }
}

/// Configuration-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Connection profile is empty")]
    EmptyProfile,

    #[error("Engine requires credentials but none were supplied")]
    CredentialsRequired,

    #[error("Failed to load configuration file: {path}")]
    LoadFailed { path: String },

    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Error reported by the VPN engine, carrying its fatal/non-fatal classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    /// Human readable description from the engine
    pub message: String,

    /// Whether the engine considers the session terminated
    pub fatal: bool,
}

impl EngineError {
    /// Create a connection-breaking engine error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    /// Create a recoverable engine error
    pub fn non_fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TunnelError>;

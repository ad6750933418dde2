//! Pattern-based parser for OpenVPN log output
//!
//! Maps OpenVPN stdout lines to engine events using regex patterns

use crate::error::EngineError;
use crate::tunnel::EngineEvent;
use regex::Regex;

/// Parser for OpenVPN log output
pub struct OutputParser {
    /// "Initialization Sequence Completed"
    connected_pattern: Regex,
    /// "AUTH_FAILED" from the server or local auth errors
    auth_failed_pattern: Regex,
    /// Soft restarts: "SIGUSR1[soft,...]", "Restart pause"
    reconnecting_pattern: Regex,
    /// Errors OpenVPN does not recover from
    fatal_pattern: Regex,
    /// TUN/TAP device failures
    tun_error_pattern: Regex,
    /// Errors OpenVPN retries on its own
    recoverable_pattern: Regex,
}

impl OutputParser {
    /// Create a new OutputParser with compiled regex patterns
    pub fn new() -> Self {
        Self {
            connected_pattern: Regex::new(r"Initialization Sequence Completed")
                .expect("Failed to compile connected pattern"),
            auth_failed_pattern: Regex::new(r"AUTH_FAILED|Auth username is empty")
                .expect("Failed to compile auth_failed pattern"),
            reconnecting_pattern: Regex::new(r"SIGUSR1\[soft|SIGHUP\[|Restart pause")
                .expect("Failed to compile reconnecting pattern"),
            fatal_pattern: Regex::new(r"Exiting due to fatal error|Options error:")
                .expect("Failed to compile fatal pattern"),
            tun_error_pattern: Regex::new(r"(?i)cannot open tun|cannot ioctl TUNSETIFF|no such device")
                .expect("Failed to compile tun_error pattern"),
            recoverable_pattern: Regex::new(
                r"TLS Error|TLS handshake failed|RESOLVE: Cannot resolve|Connection refused|Connection reset",
            )
            .expect("Failed to compile recoverable pattern"),
        }
    }

    /// Parse a line of OpenVPN output
    ///
    /// Lines that match no pattern become `EngineEvent::Log`.
    pub fn parse_line(&self, line: &str) -> EngineEvent {
        let line = line.trim_end();

        if self.connected_pattern.is_match(line) {
            return EngineEvent::Connected;
        }

        if self.auth_failed_pattern.is_match(line) {
            return EngineEvent::FatalError(EngineError::fatal(format!(
                "Authentication failed: {}",
                line
            )));
        }

        if self.tun_error_pattern.is_match(line) {
            return EngineEvent::FatalError(EngineError::fatal(format!(
                "Failed to open TUN device: {}",
                line
            )));
        }

        if self.fatal_pattern.is_match(line) {
            return EngineEvent::FatalError(EngineError::fatal(line.to_string()));
        }

        if self.reconnecting_pattern.is_match(line) {
            return EngineEvent::Reconnecting;
        }

        if self.recoverable_pattern.is_match(line) {
            return EngineEvent::NonFatalError(EngineError::non_fatal(line.to_string()));
        }

        EngineEvent::Log(line.to_string())
    }
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}

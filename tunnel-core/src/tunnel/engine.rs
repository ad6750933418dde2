//! VPN engine interface
//!
//! The engine owns the protocol handshake, encryption and packet
//! encapsulation. The coordinator only drives it through this trait and
//! listens to its [`EngineEvent`](crate::tunnel::EngineEvent) stream.

use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::tunnel::host::PacketFlow;
use crate::types::{Credentials, TunnelConfiguration};

/// Properties the engine derives from an applied configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineProperties {
    /// The profile carries everything needed to authenticate
    pub autologin: bool,

    /// Remote host named by the profile, if the engine could find one
    pub remote_host: Option<String>,
}

/// Handle to an external VPN engine
///
/// Calls must not block; results of `connect`, `disconnect` and `reconnect`
/// arrive later as engine events. Implementations must tolerate redundant
/// reconnect requests.
pub trait VpnEngine: Send + Sync {
    /// Parse and load a configuration
    fn apply(&self, config: &TunnelConfiguration) -> Result<EngineProperties, EngineError>;

    /// Supply credentials for profiles that cannot auto-login
    fn provide(&self, credentials: &Credentials) -> Result<(), EngineError>;

    /// Begin connecting with the applied configuration
    fn connect(&self);

    /// Tear the tunnel down; confirmed by a `Disconnected` event
    fn disconnect(&self);

    /// Release whatever a session that already ended left behind
    ///
    /// Nothing from the abandoned connection may be reported afterwards,
    /// not even a `Disconnected` confirmation.
    fn cancel(&self);

    /// Re-establish the tunnel after `delay`
    fn reconnect(&self, delay: Duration);

    /// Hand the engine the host packet flow, or `None` if the host refused the settings
    fn attach_packet_flow(&self, flow: Option<Arc<dyn PacketFlow>>) {
        let _ = flow;
    }

    /// Diagnostic description of the current connection
    fn connection_info(&self) -> Option<String> {
        None
    }
}

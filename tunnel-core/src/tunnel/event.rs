//! Engine lifecycle events
//!
//! The engine reports everything it does through a tagged event stream
//! consumed by the coordinator's serialized event loop.

use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::tunnel::host::NetworkSettings;

/// Events emitted by a VPN engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Tunnel established (initially or after a reconnect)
    Connected,

    /// Engine confirmed the tunnel is down
    Disconnected,

    /// Engine lost the tunnel and is re-establishing it
    Reconnecting,

    /// Connection-breaking error
    FatalError(EngineError),

    /// Recoverable error, logged only
    NonFatalError(EngineError),

    /// Diagnostic output from the engine
    Log(String),

    /// Engine asks the host to bring up the tunnel interface
    ConfigureTunnel(NetworkSettings),
}

impl EngineEvent {
    /// Route an engine error to the fatal or non-fatal variant by its classification
    pub fn from_error(error: EngineError) -> Self {
        if error.fatal {
            EngineEvent::FatalError(error)
        } else {
            EngineEvent::NonFatalError(error)
        }
    }
}

/// Receiving half of an engine event channel, owned by the coordinator
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Sending half of an engine event channel, owned by the engine
#[derive(Debug, Clone)]
pub struct EngineEventSender(mpsc::UnboundedSender<EngineEvent>);

impl EngineEventSender {
    /// Deliver an event to the coordinator
    ///
    /// Returns false once the coordinator is gone.
    pub fn send(&self, event: EngineEvent) -> bool {
        match self.0.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                tracing::debug!(?event, "Dropping engine event, coordinator has shut down");
                false
            }
        }
    }

    /// Check if the coordinator side has been dropped
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Create the channel an engine uses to report events to a coordinator
pub fn engine_channel() -> (EngineEventSender, EngineEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EngineEventSender(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error_uses_classification() {
        assert_eq!(
            EngineEvent::from_error(EngineError::fatal("tls handshake failed")),
            EngineEvent::FatalError(EngineError::fatal("tls handshake failed"))
        );
        assert!(matches!(
            EngineEvent::from_error(EngineError::non_fatal("packet dropped")),
            EngineEvent::NonFatalError(_)
        ));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = engine_channel();
        assert!(tx.send(EngineEvent::Connected));
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.send(EngineEvent::Disconnected));
    }
}

//! Tunnel session state machine
//!
//! Defines the lifecycle states of a tunnel session and the edges the
//! coordinator is allowed to take between them.

/// Tunnel session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session has been started yet
    #[default]
    Idle,

    /// Start accepted, waiting for the engine to connect
    Starting,

    /// Engine reported the tunnel is up
    Connected,

    /// Engine is reconnecting; the host should not consider the session dead
    Reasserting,

    /// Stop requested, waiting for the engine to confirm disconnection
    Stopping,

    /// Session ended; a new start may begin
    Disconnected,
}

impl SessionState {
    /// Check whether the coordinator may move from `self` to `next`
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Starting)
                | (Disconnected, Starting)
                | (Starting, Connected)
                | (Starting, Disconnected)
                | (Connected, Reasserting)
                | (Reasserting, Connected)
                | (Connected, Disconnected)
                | (Reasserting, Disconnected)
                | (Connected, Stopping)
                | (Reasserting, Stopping)
                | (Stopping, Disconnected)
        )
    }

    /// A new start request is accepted only from these states
    pub fn accepts_start(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Disconnected)
    }

    /// Check if the engine currently holds a live or pending session
    pub fn is_active(self) -> bool {
        !self.accepts_start()
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Reasserting => write!(f, "reasserting"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// One edge taken by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl std::fmt::Display for StateTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Point-in-time view of the session published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    /// Current lifecycle state
    pub state: SessionState,

    /// Reasserting flag as last reported to the host
    pub reasserting: bool,
}

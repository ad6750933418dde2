//! Tunnel session module
//!
//! Session lifecycle state machine, the engine and host interfaces it is
//! wired to, and the coordinator that drives them.

pub mod completion;
pub mod coordinator;
pub mod engine;
pub mod event;
pub mod host;
pub mod state;

// Public re-exports
pub use coordinator::{CoordinatorBuilder, TunnelCoordinator};
pub use engine::{EngineProperties, VpnEngine};
pub use event::{engine_channel, EngineEvent, EngineEventReceiver, EngineEventSender};
pub use host::{
    AppMessageHandler, EchoHandler, NetworkSettings, Packet, PacketFlow, TunnelAddress, TunnelHost,
};
pub use state::{SessionSnapshot, SessionState, StateTransition};

//! Tunnel host interface
//!
//! The host is the operating-system side of the tunnel: it applies network
//! settings, exposes packet I/O and learns about sessions that end on their
//! own.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TunnelError;

/// Address with prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelAddress {
    pub address: IpAddr,
    pub prefix_len: u8,
}

/// Network settings the engine asks the host to apply to the tunnel interface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkSettings {
    /// Address of the VPN server the tunnel terminates at
    pub remote_address: String,

    /// Addresses assigned to the tunnel interface
    pub addresses: Vec<TunnelAddress>,

    /// Routes to send through the tunnel
    pub routes: Vec<TunnelAddress>,

    /// DNS servers reachable through the tunnel
    pub dns_servers: Vec<IpAddr>,

    pub mtu: Option<u16>,
}

/// Raw IP packet with its address family protocol number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub protocol: u32,
}

/// Packet I/O surface handed to the engine
#[async_trait]
pub trait PacketFlow: Send + Sync {
    /// Wait for the next batch of outbound packets
    async fn read_packets(&self) -> std::io::Result<Vec<Packet>>;

    /// Deliver inbound packets; false if the flow refused them
    fn write_packets(&self, packets: Vec<Packet>) -> bool;
}

/// Operating-system tunnel host
#[async_trait]
pub trait TunnelHost: Send + Sync {
    /// Apply network settings to the tunnel interface
    async fn apply_network_settings(&self, settings: &NetworkSettings) -> std::io::Result<()>;

    /// Mirror the reasserting flag so the host keeps the session alive
    fn set_reasserting(&self, reasserting: bool);

    async fn read_packets(&self) -> std::io::Result<Vec<Packet>>;

    fn write_packets(&self, packets: Vec<Packet>) -> bool;

    /// Session ended without a stop request
    fn unsolicited_disconnect(&self, error: Option<TunnelError>);
}

/// Packet flow that passes packets straight through to the host
pub struct HostPacketFlow {
    host: Arc<dyn TunnelHost>,
}

impl HostPacketFlow {
    pub fn new(host: Arc<dyn TunnelHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl PacketFlow for HostPacketFlow {
    async fn read_packets(&self) -> std::io::Result<Vec<Packet>> {
        self.host.read_packets().await
    }

    fn write_packets(&self, packets: Vec<Packet>) -> bool {
        self.host.write_packets(packets)
    }
}

/// Request/response bridge for messages sent by the containing app
pub trait AppMessageHandler: Send + Sync {
    fn handle(&self, message: Vec<u8>) -> Option<Vec<u8>>;
}

/// Returns every message unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl AppMessageHandler for EchoHandler {
    fn handle(&self, message: Vec<u8>) -> Option<Vec<u8>> {
        Some(message)
    }
}

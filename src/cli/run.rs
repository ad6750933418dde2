//! Tunnel run command
//!
//! Wires the OpenVPN engine, NetworkManager reachability and a console host
//! into a coordinator, then keeps the session up until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Local;
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tunnel_core::error::TunnelError;
use tunnel_core::openvpn::OpenVpnProcessEngine;
use tunnel_core::reachability::network_manager::NetworkManagerPath;
use tunnel_core::reachability::PathReachability;
use tunnel_core::tunnel::{
    engine_channel, NetworkSettings, Packet, SessionState, TunnelCoordinator, TunnelHost,
};
use tunnel_core::types::StopReason;

use super::load_config;

/// Host for a process engine that owns its own TUN device
///
/// Network settings and packets are only logged; unsolicited disconnects are
/// forwarded to the run loop.
struct ConsoleHost {
    disconnects: mpsc::UnboundedSender<Option<TunnelError>>,
}

#[async_trait]
impl TunnelHost for ConsoleHost {
    async fn apply_network_settings(&self, settings: &NetworkSettings) -> std::io::Result<()> {
        info!(
            remote = %settings.remote_address,
            addresses = settings.addresses.len(),
            routes = settings.routes.len(),
            mtu = ?settings.mtu,
            "Tunnel network settings"
        );
        Ok(())
    }

    fn set_reasserting(&self, reasserting: bool) {
        debug!(reasserting, "Reasserting changed");
    }

    async fn read_packets(&self) -> std::io::Result<Vec<Packet>> {
        // OpenVPN reads the TUN device itself
        std::future::pending().await
    }

    fn write_packets(&self, packets: Vec<Packet>) -> bool {
        debug!(count = packets.len(), "Dropping packets, no host packet flow");
        false
    }

    fn unsolicited_disconnect(&self, error: Option<TunnelError>) {
        let _ = self.disconnects.send(error);
    }
}

/// Run the tunnel until Ctrl-C or an unsolicited disconnect
pub async fn run_tunnel(config_path: Option<&Path>) -> anyhow::Result<()> {
    let (config, base_dir) = load_config(config_path)?;
    let tunnel_config = config.provider.into_tunnel_configuration(&base_dir)?;
    let settings = config.coordinator;

    let (events_tx, events_rx) = engine_channel();
    let engine = Arc::new(OpenVpnProcessEngine::new(
        settings.openvpn_binary.clone(),
        events_tx,
    ));

    // The static path sender must outlive the session when NetworkManager is missing
    let (reachability, _static_path) = match NetworkManagerPath::new().await {
        Ok(nm) => (
            PathReachability::new(nm.watch(settings.reachability_poll_interval()).await),
            None,
        ),
        Err(e) => {
            warn!("Network path changes will not trigger reconnects: {}", e);
            let (path, monitor) = PathReachability::channel();
            (monitor, Some(path))
        }
    };

    let (disconnects_tx, mut disconnects_rx) = mpsc::unbounded_channel();
    let host = Arc::new(ConsoleHost {
        disconnects: disconnects_tx,
    });

    let coordinator = TunnelCoordinator::spawn(
        engine,
        Arc::new(reachability),
        host,
        events_rx,
        settings,
    );
    tokio::spawn(print_state_changes(coordinator.clone()));

    println!("Starting tunnel ({})", config.provider.profile.display());
    tokio::select! {
        result = coordinator.start(tunnel_config) => {
            result.context("Tunnel failed to start")?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted, stopping tunnel");
            stop(&coordinator).await;
            return Ok(());
        }
    }

    println!("{} Tunnel up, press Ctrl-C to disconnect", "✓".green());

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            stop(&coordinator).await;
            Ok(())
        }
        error = disconnects_rx.recv() => match error.flatten() {
            Some(e) => Err(anyhow::Error::new(e).context("Tunnel disconnected")),
            None => {
                println!("Tunnel disconnected by the engine");
                Ok(())
            }
        },
    };

    coordinator.shutdown();
    outcome
}

async fn stop(coordinator: &TunnelCoordinator) {
    if let Some(e) = coordinator.stop(StopReason::UserInitiated).await {
        warn!("Tunnel stopped with error: {}", e);
    }
    println!("Tunnel stopped");
}

async fn print_state_changes(coordinator: TunnelCoordinator) {
    let mut transitions = coordinator.transitions();
    loop {
        let transition = match transitions.recv().await {
            Ok(transition) => transition,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "State printer fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let state = transition.to.to_string();
        let state = match transition.to {
            SessionState::Connected => state.green(),
            SessionState::Reasserting => state.yellow(),
            SessionState::Disconnected => state.red(),
            _ => state.cyan(),
        };
        println!("[{}] {} -> {}", Local::now().format("%H:%M:%S"), transition.from, state);
    }
}

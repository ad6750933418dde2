//! Core library for the packet tunnel host
//!
//! This crate provides the tunnel session coordinator, reachability-driven
//! recovery, the VPN engine interfaces with an OpenVPN process engine, and
//! the notification image fetcher.

pub mod error;
pub mod types;

pub mod config;
pub mod notification;
pub mod openvpn;
pub mod reachability;
pub mod tunnel;

/// Initialize logging infrastructure
///
/// Sets up tracing with systemd journal logging when running under systemd.
/// Otherwise logs to stderr with pretty formatting at INFO, overridable
/// through `RUST_LOG`.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if std::env::var("JOURNAL_STREAM").is_ok() {
            let journal_layer = tracing_journald::layer()?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(filter)
                .try_init()?;
            return Ok(());
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty())
        .with(filter)
        .try_init()?;

    Ok(())
}

//! Configuration check command
//!
//! Loads the configuration and profile without starting anything and
//! reports whether a session could be started from them.

use std::path::Path;

use colored::Colorize;
use tunnel_core::error::ConfigError;
use tunnel_core::openvpn::ProfileSummary;

use super::load_config;

/// Run the check command
pub fn run_check(config_path: Option<&Path>) -> anyhow::Result<()> {
    let (config, base_dir) = load_config(config_path)?;
    let tunnel_config = config.provider.into_tunnel_configuration(&base_dir)?;

    let profile = String::from_utf8_lossy(tunnel_config.profile());
    let summary = ProfileSummary::parse(&profile);

    println!("Profile:      {}", config.provider.profile_path(&base_dir).display());
    println!(
        "Remote:       {}",
        summary.remote_host.as_deref().unwrap_or("<connection blocks>")
    );
    println!(
        "Credentials:  {}",
        match (summary.needs_credentials, tunnel_config.credentials()) {
            (false, _) => "not required".to_string(),
            (true, Some(credentials)) => format!("provided for {}", credentials.username()),
            (true, None) => "missing".red().to_string(),
        }
    );
    println!("Persist:      {}", tunnel_config.persist_across_sleep());
    println!(
        "Reconnect:    after {}s, path polled every {}s",
        config.coordinator.reconnect_delay_secs, config.coordinator.reachability_poll_secs
    );

    if summary.needs_credentials && tunnel_config.credentials().is_none() {
        return Err(ConfigError::CredentialsRequired.into());
    }

    match which::which(&config.coordinator.openvpn_binary) {
        Ok(path) => println!("OpenVPN:      {}", path.display()),
        Err(e) => {
            println!("OpenVPN:      {}", "not found".red());
            anyhow::bail!("{} not found: {}", config.coordinator.openvpn_binary, e);
        }
    }

    println!("{} Configuration is valid", "✓".green());
    Ok(())
}

//! Integration tests for the packet-tunnel binary
//!
//! Runs the built binary against temporary configuration files and checks
//! output and exit codes. Nothing here starts a tunnel.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const BINARY: &str = env!("CARGO_BIN_EXE_packet-tunnel");

const PROFILE: &str = "client\ndev tun\nremote vpn.example.com 1194 udp\nauth-user-pass\n";

fn packet_tunnel(args: &[&str]) -> Output {
    Command::new(BINARY)
        .args(args)
        .env_remove("JOURNAL_STREAM")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to run packet-tunnel")
}

/// Write a profile and a config pointing at it; `sh` stands in for openvpn
fn write_config(dir: &TempDir, credentials: bool) -> PathBuf {
    std::fs::write(dir.path().join("client.ovpn"), PROFILE).unwrap();

    let mut config = String::from("[tunnel]\nprofile = \"client.ovpn\"\n");
    if credentials {
        config.push_str("username = \"uid\"\npassword = \"pw123\"\n");
    }
    config.push_str("\n[coordinator]\nopenvpn_binary = \"sh\"\n");

    let path = dir.path().join("config.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_help_lists_commands() {
    let output = packet_tunnel(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["run", "check", "notify"] {
        assert!(stdout.contains(command), "help should mention {}", command);
    }
}

#[test]
fn test_check_accepts_valid_config() {
    // Given: A profile requiring credentials and a config supplying them
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, true);

    // When: Checking it
    let output = packet_tunnel(&["check", "--config", path_arg(&config)]);

    // Then: The summary is printed and the check passes
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("vpn.example.com"));
    assert!(stdout.contains("provided for uid"));
    assert!(!stdout.contains("pw123"));
}

#[test]
fn test_check_reads_default_config_dir() {
    // Given: A config in the directory named by the environment
    let dir = TempDir::new().unwrap();
    write_config(&dir, true);

    // When: Checking without --config
    let output = Command::new(BINARY)
        .arg("check")
        .env("PACKET_TUNNEL_CONFIG_DIR", dir.path())
        .env_remove("JOURNAL_STREAM")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to run packet-tunnel");

    // Then: The profile resolves against that directory
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("vpn.example.com"));
}

#[test]
fn test_check_missing_credentials_is_config_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, false);

    let output = packet_tunnel(&["check", "--config", path_arg(&config)]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("requires credentials"));
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");

    let output = packet_tunnel(&["check", "--config", path_arg(&missing)]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_profile_is_config_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, true);
    std::fs::remove_file(dir.path().join("client.ovpn")).unwrap();

    let output = packet_tunnel(&["check", "--config", path_arg(&config)]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_notify_without_image_prints_content_unchanged() {
    let dir = TempDir::new().unwrap();
    let payload = dir.path().join("payload.json");
    std::fs::write(
        &payload,
        r#"{"title":"Session","body":"Expires soon","user_info":{"icon_name":"clock"}}"#,
    )
    .unwrap();

    let output = packet_tunnel(&["notify", path_arg(&payload)]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let printed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(printed["title"], "Session");
    assert_eq!(printed["user_info"]["icon_name"], "clock");
    assert_eq!(printed["attachments"], serde_json::json!([]));
}

#[test]
fn test_notify_missing_payload_is_runtime_error() {
    let dir = TempDir::new().unwrap();

    let output = packet_tunnel(&["notify", path_arg(&dir.path().join("none.json"))]);

    assert_eq!(output.status.code(), Some(1));
}

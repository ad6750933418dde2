//! CLI command implementations
//!
//! This module contains the implementation of all CLI subcommands.

pub mod check;
pub mod notify;
pub mod run;

use std::path::{Path, PathBuf};

use tunnel_core::config::toml_config::{self, get_config_dir, TomlConfig};
use tunnel_core::error::ConfigError;

/// Load the configuration file and the directory relative profile paths resolve against
pub fn load_config(path: Option<&Path>) -> Result<(TomlConfig, PathBuf), ConfigError> {
    let Some(path) = path else {
        return Ok((toml_config::load_config()?, get_config_dir()?));
    };

    let config = TomlConfig::from_file(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    Ok((config, base_dir))
}

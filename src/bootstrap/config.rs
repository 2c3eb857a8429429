//! Configuration loading.
//!
//! Reads the TOML file into [`DiscoveryConfig`]. Every field has a default, so
//! a missing file or a missing section is not an error; unreadable files and
//! invalid TOML are.

use anyhow::Context;
use pl_core::DiscoveryConfig;
use std::io::ErrorKind;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub fn load_config(config_path: &Path) -> anyhow::Result<DiscoveryConfig> {
    let content = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(DiscoveryConfig::default()),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })
        }
    };
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config as TOML: {}", config_path.display()))
}

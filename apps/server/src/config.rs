//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use airwave_core::EngineConfig;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    /// Override: `AIRWAVE_BIND_ADDRESS`
    pub bind_address: IpAddr,

    /// Port to bind the HTTP server to.
    /// Override: `AIRWAVE_BIND_PORT`
    pub bind_port: u16,

    /// Directory for persistent data (collection, preferences).
    /// Override: `AIRWAVE_DATA_DIR`
    pub data_dir: PathBuf,

    /// Playback engine configuration.
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([127, 0, 0, 1]),
            bind_port: 48100,
            data_dir: PathBuf::from("./airwave-data"),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AIRWAVE_BIND_ADDRESS") {
            if let Ok(address) = val.parse() {
                self.bind_address = address;
            }
        }

        if let Ok(val) = std::env::var("AIRWAVE_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        // Note: AIRWAVE_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }
}

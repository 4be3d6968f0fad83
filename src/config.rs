use anyhow::{Context, Result};
use std::io::prelude::*;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde_derive::Deserialize;

use crate::error::ConfigError;

pub const BGP_DEFAULT_PORT: u16 = 179;
pub const BGP_DEFAULT_HOLD_TIME: u16 = 90;
pub const BGP_DEFAULT_KEEPALIVE_INTERVAL: u16 = 30;

/// Global (per-router) configuration, read from the `[global]` section.
#[derive(Deserialize, Debug, Clone)]
pub struct GlobalConfig {
    /// Autonomous System Number (ASN) of the router. 32-bit; truncated to
    /// [`crate::bgp::AS_TRANS`] in the OPEN `My AS` field when it does not
    /// fit in 16 bits.
    pub asn: u32,
    /// Router ID (RID) of the router.
    pub rid: Ipv4Addr,
    /// Address the listener binds to.
    #[serde(default)]
    pub listen_address: Option<IpAddr>,
    /// Port the listener binds to.
    #[serde(default)]
    pub listen_port: Option<u16>,
    /// Hold time used by neighbors that don't set their own.
    #[serde(default)]
    pub hold_time: Option<u16>,
    /// Keepalive interval used by neighbors that don't set their own.
    #[serde(default)]
    pub keepalive_interval: Option<u16>,
}

impl GlobalConfig {
    pub fn listen_port(&self) -> u16 {
        self.listen_port.unwrap_or(BGP_DEFAULT_PORT)
    }
}

/// Top level config document: one `[global]` table plus `[[neighbors]]`.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub neighbors: Vec<NeighborConfig>,
}

pub fn read_config(path: &PathBuf) -> Result<Config> {
    let mut f = std::fs::File::open(path)
        .with_context(|| format!("Failed to open config file {}", path.display()))?;

    let mut c = String::new();
    f.read_to_string(&mut c)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: Config = toml::from_str(&c)
        .map_err(|e| ConfigError::Parse(e.to_string()))
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    Ok(config)
}

/// Per-neighbor configuration, read from a `[[neighbors]]` entry. Hold time
/// and keepalive interval fall back to the global default when absent.
#[derive(Deserialize, Debug, Clone)]
pub struct NeighborConfig {
    /// Neighbor address, IPv4 or IPv6.
    pub address: IpAddr,
    #[serde(default)]
    pub hold_time: Option<u16>,
    #[serde(default)]
    pub keepalive_interval: Option<u16>,
}

impl NeighborConfig {
    pub fn hold_time(&self, global: &GlobalConfig) -> u16 {
        self.hold_time
            .or(global.hold_time)
            .unwrap_or(BGP_DEFAULT_HOLD_TIME)
    }

    pub fn keepalive_interval(&self, global: &GlobalConfig) -> u16 {
        self.keepalive_interval
            .or(global.keepalive_interval)
            .unwrap_or(BGP_DEFAULT_KEEPALIVE_INTERVAL)
    }
}

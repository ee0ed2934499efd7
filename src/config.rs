//! Layered configuration.
//!
//! Sources, lowest precedence first: built-in defaults, a TOML file,
//! `DFS_`-prefixed environment variables (`__` separates nested keys, as in
//! `DFS_NAMING__SERVICE_PORT`), then command-line overrides.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::naming::{REGISTRATION_PORT, SERVICE_PORT};
use crate::rpc::{Address, ListenerOptions};

pub const DEFAULT_CONFIG_FILE: &str = "dfs.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub naming: NamingConfig,
    pub storage: StorageConfig,
    pub rpc: RpcConfig,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Host clients and storage nodes use to reach the naming server.
    pub host: String,
    /// Local address the naming server binds.
    pub bind: IpAddr,
    pub service_port: u16,
    pub registration_port: u16,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            service_port: SERVICE_PORT,
            registration_port: REGISTRATION_PORT,
        }
    }
}

impl NamingConfig {
    pub fn service_address(&self) -> Address {
        Address::new(&self.host, self.service_port)
    }

    pub fn registration_address(&self) -> Address {
        Address::new(&self.host, self.registration_port)
    }

    pub fn service_bind(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.service_port)
    }

    pub fn registration_bind(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.registration_port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Local directory holding the node's files.
    pub root: PathBuf,
    /// Host placed in the stubs this node registers.
    pub hostname: String,
    pub bind: IpAddr,
    /// 0 picks a free port.
    pub client_port: u16,
    pub command_port: u16,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
            hostname: "127.0.0.1".to_string(),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            client_port: 0,
            command_port: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// How long a stopping listener waits for connections before closing them.
    pub drain_interval_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: 1000,
        }
    }
}

impl RpcConfig {
    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            drain_interval: Duration::from_millis(self.drain_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub json: bool,
    pub verbose: bool,
}

impl AppConfig {
    /// Load configuration, applying `overrides` last.
    ///
    /// `overrides` is serialized as a partial `AppConfig`, so fields left
    /// out (or skipped as `None`) keep the value from the lower layers.
    pub fn new<T: Serialize>(file: Option<&Path>, overrides: Option<T>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        figment = match file {
            Some(path) if !path.is_file() => {
                return Err(format!("config file {} not found", path.display()).into());
            }
            Some(path) => figment.merge(Toml::file(path)),
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };

        figment = figment.merge(Env::prefixed("DFS_").split("__"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        figment.extract()
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

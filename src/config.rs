use crate::chord::types::IdSpace;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_RING_BITS: u32 = 32;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub name: String,
    pub host: String,
    /// 0 binds an ephemeral port.
    pub port: u16,
    pub ring_bits: u32,
    pub rpc_timeout_ms: u64,
    pub maintenance: MaintenanceConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: DEFAULT_HOST.to_string(),
            port: 0,
            ring_bits: DEFAULT_RING_BITS,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            maintenance: MaintenanceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub stabilize_interval_ms: u64,
    pub fix_fingers_interval_ms: u64,
    pub ping_interval_ms: u64,
    /// Consecutive failed pings before the successor is evicted.
    pub max_ping_failures: u32,
    pub check_predecessor: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            stabilize_interval_ms: 1000,
            fix_fingers_interval_ms: 500,
            ping_interval_ms: 2000,
            max_ping_failures: 3,
            check_predecessor: true,
        }
    }
}

impl MaintenanceConfig {
    pub fn stabilize_interval(&self) -> Duration {
        Duration::from_millis(self.stabilize_interval_ms)
    }

    pub fn fix_fingers_interval(&self) -> Duration {
        Duration::from_millis(self.fix_fingers_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn id_space(&self) -> Result<IdSpace, ConfigError> {
        IdSpace::new(self.ring_bits)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("node name must not be empty".into()));
        }
        if self.name.len() > u8::MAX as usize || self.host.len() > u8::MAX as usize {
            return Err(ConfigError::Invalid("name and host are limited to 255 bytes".into()));
        }
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        self.id_space()?;
        if self.rpc_timeout_ms == 0 {
            return Err(ConfigError::Invalid("rpc_timeout_ms must be positive".into()));
        }
        let m = &self.maintenance;
        if m.stabilize_interval_ms == 0
            || m.fix_fingers_interval_ms == 0
            || m.ping_interval_ms == 0
        {
            return Err(ConfigError::Invalid("maintenance intervals must be positive".into()));
        }
        if m.max_ping_failures == 0 {
            return Err(ConfigError::Invalid("max_ping_failures must be at least 1".into()));
        }
        Ok(())
    }
}

/// A known ring member given as `name@host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPeer {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl FromStr for BootstrapPeer {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Invalid(format!("expected name@host:port, got {:?}", s));
        let (name, address) = s.split_once('@').ok_or_else(invalid)?;
        let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
        if name.is_empty() || host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BootstrapPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let raw = r#"{"name": "alice", "maintenance": {"max_ping_failures": 5}}"#;
        let config: NodeConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.name, "alice");
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, 0);
        assert_eq!(config.ring_bits, DEFAULT_RING_BITS);
        assert_eq!(config.maintenance.max_ping_failures, 5);
        assert_eq!(config.maintenance.stabilize_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_file_reads_json() {
        let path = std::env::temp_dir()
            .join(format!("chordring-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"name": "bob", "port": 7000, "ring_bits": 16}"#).unwrap();
        let config = NodeConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.id_space().unwrap().bits(), 16);

        assert!(matches!(NodeConfig::from_file(&path), Err(ConfigError::Io(_))));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = NodeConfig::default();
        assert!(config.validate().is_err());

        config.name = "carol".into();
        config.ring_bits = 65;
        assert!(config.validate().is_err());

        config.ring_bits = 8;
        config.maintenance.ping_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bootstrap_peer_parses_name_host_port() {
        let peer: BootstrapPeer = "alice@10.0.0.1:4000".parse().unwrap();
        assert_eq!(peer.name, "alice");
        assert_eq!(peer.host, "10.0.0.1");
        assert_eq!(peer.port, 4000);
        assert_eq!(peer.to_string(), "alice@10.0.0.1:4000");

        assert!("alice".parse::<BootstrapPeer>().is_err());
        assert!("alice@host".parse::<BootstrapPeer>().is_err());
        assert!("@host:1".parse::<BootstrapPeer>().is_err());
        assert!("alice@host:99999".parse::<BootstrapPeer>().is_err());
    }
}

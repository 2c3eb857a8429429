//! # Configuration DTOs
//!
//! Plain data mapped from `config.toml`. Every section and field is optional
//! in the file; missing values take the defaults below. No validation lives
//! here, the consumers decide what a value means.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::device::DeviceType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub device: DeviceConfig,
    pub discovery: CycleConfig,
    pub multicast: MulticastConfig,
    pub pubsub: PubSubConfig,
    pub probe: ProbeConfig,
    pub quality: QualityConfig,
    pub registry: RegistryConfig,
    pub trust: TrustConfig,
    pub storage: StorageConfig,
    pub lifecycle: LifecycleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Empty means "use the host name".
    pub name: String,
    pub device_type: DeviceType,
    pub capabilities: Vec<String>,
    pub service_port: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            device_type: DeviceType::Desktop,
            capabilities: vec!["remote_desktop".into(), "file_transfer".into()],
            service_port: 8080,
        }
    }
}

/// The shared heartbeat. One tick is one discovery cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub broadcast_interval_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_secs: 30,
        }
    }
}

impl CycleConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticastConfig {
    pub enabled: bool,
    pub required: bool,
    pub group: Ipv4Addr,
    pub port: u16,
    pub receive_timeout_secs: u64,
    pub reuse_address: bool,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: true,
            group: Ipv4Addr::new(239, 255, 77, 77),
            port: 8081,
            receive_timeout_secs: 5,
            reuse_address: false,
        }
    }
}

impl MulticastConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub topic_prefix: String,
    pub connect_timeout_secs: u64,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".into(),
            port: 1883,
            topic_prefix: "discovery".into(),
            connect_timeout_secs: 10,
            backoff_initial_secs: 5,
            backoff_max_secs: 60,
        }
    }
}

impl PubSubConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_secs(self.backoff_initial_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,
    pub every_cycles: u32,
    pub ports: Vec<u16>,
    pub connect_timeout_ms: u64,
    pub max_concurrency: usize,
    pub prefix_len: u8,
    /// Explicit targets; when set, interface enumeration is skipped.
    pub targets: Vec<IpAddr>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            every_cycles: 4,
            ports: vec![8080],
            connect_timeout_ms: 1500,
            max_concurrency: 64,
            prefix_len: 24,
            targets: Vec::new(),
        }
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub interval_secs: u64,
    pub probe_timeout_ms: u64,
    pub smoothing: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            probe_timeout_ms: 2000,
            smoothing: 0.3,
        }
    }
}

impl QualityConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub ttl_secs: u64,
    pub max_clock_skew_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_clock_skew_secs: 30,
        }
    }
}

impl RegistryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub auto_pair: bool,
    pub trusted_capability: String,
    pub success_rate_threshold: f64,
    pub min_history_samples: u32,
    pub handshake_timeout_secs: u64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            auto_pair: true,
            trusted_capability: "trusted_source".into(),
            success_rate_threshold: 0.8,
            min_history_samples: 4,
            handshake_timeout_secs: 15,
        }
    }
}

impl TrustConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Relative paths resolve against the data directory.
    pub snapshot_path: PathBuf,
    pub save_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("registry.json"),
            save_interval_secs: 60,
        }
    }
}

impl StorageConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub shutdown_grace_secs: u64,
    pub restart_delay_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 5,
            restart_delay_secs: 2,
        }
    }
}

impl LifecycleConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
}

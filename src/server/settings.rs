use config::{Config, ConfigError, File};
use serde::Deserialize;

use std::fmt;
use std::time::Duration;

use crate::conn::FabricConfig;

// For explanation, see issue: https://github.com/serde-rs/serde/issues/368
fn default_true() -> bool {
    true
}
fn default_cert() -> Option<String> {
    Some("node.crt".to_string())
}
fn default_key() -> Option<String> {
    Some("node.key".to_string())
}
fn default_heartbeat_interval_ms() -> u64 {
    3_000
}
fn default_heartbeat_timeout_ms() -> u64 {
    6_000
}
fn default_offset_ttl_ms() -> u64 {
    30_000
}
fn default_max_offset_ms() -> u64 {
    250
}
fn default_min_offset_samples() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub listener_ip: String,
    pub cluster_id: String,
    pub bootstrap_peers: Vec<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default = "default_cert")]
    pub certificate_file: Option<String>,
    #[serde(default = "default_key")]
    pub private_key_file: Option<String>,
    #[serde(default)]
    pub rpc_compression: bool,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Per-ping deadline; `0` disables the deadline and is only meant for tests.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_offset_ttl_ms")]
    pub offset_ttl_ms: u64,
    /// Advertised drift bound of the local clock.
    #[serde(default = "default_max_offset_ms")]
    pub max_offset_ms: u64,
    #[serde(default = "default_min_offset_samples")]
    pub min_offset_samples: usize,
}

const CONFIG_FILE_PATH: &str = "config/Default.json";
const CONFIG_FILE_PREFIX: &str = "config/";

#[derive(Clone, Debug, Deserialize)]
pub enum ENV {
    Testing,
    Development,
    Production,
}

impl fmt::Display for ENV {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ENV::Testing => write!(f, "Testing"),
            ENV::Production => write!(f, "Production"),
            ENV::Development => write!(f, "Development"),
        }
    }
}

impl From<&str> for ENV {
    fn from(env: &str) -> Self {
        match env {
            "Testing" => ENV::Testing,
            "Production" => ENV::Production,
            _ => ENV::Development,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_ENV").unwrap_or_else(|_| "Development".into());
        Config::builder()
            .set_default("env", env.clone())?
            .add_source(File::with_name(CONFIG_FILE_PATH))
            .add_source(File::with_name(&format!("{}{}", CONFIG_FILE_PREFIX, env)))
            .build()?
            .try_deserialize()
    }

    /// The fabric knobs these settings describe.
    pub fn fabric_config(&self) -> FabricConfig {
        FabricConfig {
            node_addr: self.listener_ip.clone(),
            cluster_id: self.cluster_id.clone(),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            offset_ttl: Duration::from_millis(self.offset_ttl_ms),
            min_offset_samples: self.min_offset_samples,
            rpc_compression: self.rpc_compression,
            ..FabricConfig::default()
        }
    }

    pub fn max_offset(&self) -> Duration {
        Duration::from_millis(self.max_offset_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_fill_in_the_fabric_knobs() {
        let settings: Settings = serde_json::from_str(
            r#"{ "listener_ip": "127.0.0.1:9090", "cluster_id": "local", "bootstrap_peers": [] }"#,
        )
        .unwrap();
        assert!(settings.use_tls);
        assert!(!settings.rpc_compression);

        let config = settings.fabric_config();
        assert_eq!(config.node_addr, "127.0.0.1:9090");
        assert_eq!(config.cluster_id, "local");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(6));
        assert_eq!(config.offset_ttl, Duration::from_secs(30));
        assert_eq!(config.min_offset_samples, 3);
    }
}

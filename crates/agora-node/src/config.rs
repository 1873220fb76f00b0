use serde::{Deserialize, Serialize};
use std::path::Path;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub dev: DevConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name/identifier within the cluster.
    pub name: String,

    /// Hex-encoded 32-byte key seed. A missing seed means a fresh random
    /// identity on every start.
    #[serde(default)]
    pub key_seed: Option<String>,
}

/// Fixed cluster membership. Dynamic membership is out of scope; the
/// list is read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Names of every member, this node included. With the in-process
    /// transport all members run inside this process.
    pub members: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { members: vec!["node-0".into(), "node-1".into(), "node-2".into()] }
    }
}

/// Dev-mode stand-ins for the application chains, which are external
/// collaborators: a ticker feeds deterministic payload hashes in and a
/// logging consumer drains committed blocks out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// Interval between generated payloads, per chain, in milliseconds.
    #[serde(default = "default_payload_interval_ms")]
    pub payload_interval_ms: u64,
}

fn default_payload_interval_ms() -> u64 {
    500
}

impl Default for DevConfig {
    fn default() -> Self {
        Self { payload_interval_ms: default_payload_interval_ms() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter when RUST_LOG is not set (e.g. "info", "agora=debug").
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig { name: "node-0".into(), key_seed: None },
            cluster: ClusterConfig::default(),
            dev: DevConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        std::fs::write(path.as_ref(), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The configured key seed, decoded. `None` when unset.
    pub fn key_seed(&self) -> anyhow::Result<Option<[u8; 32]>> {
        match &self.node.key_seed {
            None => Ok(None),
            Some(hex_seed) => {
                let bytes = hex::decode(hex_seed.trim_start_matches("0x"))?;
                let seed: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("key_seed must decode to exactly 32 bytes"))?;
                Ok(Some(seed))
            }
        }
    }
}

//! Node configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime settings for one ledger node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP bind host
    pub host: String,

    /// HTTP bind port
    pub port: u16,

    /// Leading zero characters required of a proof digest
    pub difficulty: usize,

    /// Maximum transactions pulled into one block
    pub block_batch_size: usize,

    /// Mint payout to this node for every block it mines
    pub mining_reward: f64,

    /// Proof stored in the genesis block
    pub genesis_proof: u64,

    /// Previous-hash sentinel stored in the genesis block
    pub genesis_previous_hash: String,

    /// Timeout applied to every peer and registry request
    pub peer_timeout_secs: u64,

    /// Peer registry base URL; discovery is disabled without one
    pub registry_url: Option<String>,

    /// URL this node announces to the registry
    pub advertise_url: Option<String>,

    /// Seconds between discovery syncs
    pub sync_interval_secs: u64,

    /// Rule code deployed at start and applied to every admission
    pub governing_contract: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: "0.0.0.0".to_string(),
            port: 5000,
            difficulty: 4,
            block_batch_size: 10,
            mining_reward: 1.0,
            genesis_proof: 100,
            genesis_previous_hash: "1".to_string(),
            peer_timeout_secs: 5,
            registry_url: None,
            advertise_url: None,
            sync_interval_secs: 300,
            governing_contract: None,
        }
    }
}

impl NodeConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Defaults with a low difficulty, for tests and local experiments
    pub fn fast(difficulty: usize) -> Self {
        NodeConfig {
            difficulty,
            ..NodeConfig::default()
        }
    }
}

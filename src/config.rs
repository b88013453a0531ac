use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ChainError, ChainResult};
use crate::types::Coins;

/// Network identifier baked into the genesis seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn id(self) -> u8 {
        match self {
            Network::Mainnet => 0x1,
            Network::Testnet => 0x2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    pub network: Network,
    pub consensus: ConsensusConfig,
}

/// Consensus parameters every node must agree on.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub block_reward: Coins,
    pub final_committee_reward: Coins,
    pub fee_burn_rate: f64,
    pub stake_reward_rate: f64,
    pub proposer_threshold: f64,
    pub committee_percent: f64,
    pub final_committee_consensus_percent: f64,
    pub threshold_ba: f64,
    #[serde(default = "default_epoch_length")]
    pub epoch_length: u64,
}

fn default_epoch_length() -> u64 {
    100
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            block_reward: Coins::from_u128(6_000_000_000_000_000_000),
            final_committee_reward: Coins::from_u128(3_000_000_000_000_000_000),
            fee_burn_rate: 0.9,
            stake_reward_rate: 0.2,
            proposer_threshold: 0.5,
            committee_percent: 0.3,
            final_committee_consensus_percent: 0.7,
            threshold_ba: 0.65,
            epoch_length: default_epoch_length(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            consensus: ConsensusConfig::default(),
        }
    }
}

impl ChainConfig {
    pub fn load(path: &Path) -> ChainResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|err| ChainError::Config(format!("unable to parse config: {err}")))
    }

    pub fn save(&self, path: &Path) -> ChainResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| ChainError::Config(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }
}

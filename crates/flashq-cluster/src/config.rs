//! Coordinator configuration: the recognized options from the external
//! interface surface, loadable from YAML with CLI overrides, mirroring the
//! same layering `flashq-broker`'s `BrokerConfig` uses.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_leader_imbalance_check_interval_seconds() -> u64 {
    300
}

fn default_leader_imbalance_per_broker_percentage() -> u32 {
    10
}

fn default_delegation_token_expiry_check_interval_ms() -> u64 {
    3_600_000
}

fn default_event_queue_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub broker_id: u32,
    #[serde(default)]
    pub auto_leader_rebalance_enable: bool,
    #[serde(default = "default_leader_imbalance_per_broker_percentage")]
    pub leader_imbalance_per_broker_percentage: u32,
    #[serde(default = "default_leader_imbalance_check_interval_seconds")]
    pub leader_imbalance_check_interval_seconds: u64,
    #[serde(default)]
    pub delete_topic_enable: bool,
    #[serde(default)]
    pub unclean_leader_election_enable: bool,
    #[serde(default = "default_delegation_token_expiry_check_interval_ms")]
    pub delegation_token_expiry_check_interval_ms: u64,
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl CoordinatorConfig {
    pub fn load_from_yaml(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// CLI overrides for `CoordinatorConfig`, layered on top of a YAML config file.
#[derive(Debug, Parser)]
#[command(name = "flashq-cluster-coordinator")]
pub struct CoordinatorCliArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub broker_id: Option<u32>,
    #[arg(long)]
    pub auto_leader_rebalance_enable: bool,
    #[arg(long)]
    pub delete_topic_enable: bool,
}

//! Broker configuration: the recognized options from the external interface
//! surface, loadable from YAML with CLI overrides.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_replica_lag_time_max_ms() -> u64 {
    30_000
}

fn default_hw_checkpoint_interval_ms() -> u64 {
    5_000
}

fn default_replica_fetch_min_bytes() -> usize {
    1
}

fn default_replica_fetch_max_bytes() -> usize {
    1024 * 1024
}

fn default_purge_interval() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub broker_id: u32,
    pub log_dirs: Vec<PathBuf>,
    #[serde(default = "default_replica_lag_time_max_ms")]
    pub replica_lag_time_max_ms: u64,
    #[serde(default = "default_hw_checkpoint_interval_ms")]
    pub replica_high_watermark_checkpoint_interval_ms: u64,
    #[serde(default = "default_replica_fetch_min_bytes")]
    pub replica_fetch_min_bytes: usize,
    #[serde(default = "default_replica_fetch_max_bytes")]
    pub replica_fetch_max_bytes: usize,
    #[serde(default = "default_purge_interval")]
    pub producer_purgatory_purge_interval_requests: usize,
    #[serde(default = "default_purge_interval")]
    pub fetch_purgatory_purge_interval_requests: usize,
    #[serde(default = "default_purge_interval")]
    pub delete_records_purgatory_purge_interval_requests: usize,
    #[serde(default = "default_purge_interval")]
    pub elect_leader_purgatory_purge_interval_requests: usize,
    #[serde(default)]
    pub inter_broker_protocol_version: Option<String>,
    #[serde(default)]
    pub inter_broker_listener_name: Option<String>,
    #[serde(default)]
    pub replica_selector_class_name: Option<String>,
    #[serde(default)]
    pub transaction_partition_verification_enable: bool,
    #[serde(default)]
    pub halt_on_log_dir_failure: bool,
}

impl BrokerConfig {
    pub fn load_from_yaml(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// CLI overrides for `BrokerConfig`, layered on top of a YAML config file.
#[derive(Debug, Parser)]
#[command(name = "flashq-broker")]
pub struct BrokerCliArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub broker_id: Option<u32>,
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

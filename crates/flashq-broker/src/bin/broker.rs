//! Broker process entrypoint: loads configuration and starts the Replica
//! Manager's background tasks (HW checkpoint scheduler, ISR shrink tick).
//!
//! Client-facing RPC surfaces (Producer/Consumer/Admin) and inter-broker
//! wire framing are out of scope for this core; this binary wires up the
//! in-process Replica Manager only.

use clap::Parser;
use flashq::storage::StorageBackend;
use flashq_broker::broker::{ReplicaManager, ReplicaManagerConfig};
use flashq_broker::config::{BrokerCliArgs, BrokerConfig};
use flashq_cluster::types::BrokerId;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = BrokerCliArgs::parse();
    let config = match &args.config {
        Some(path) => BrokerConfig::load_from_yaml(path)?,
        None => BrokerConfig {
            broker_id: args.broker_id.unwrap_or(1),
            log_dirs: args.log_dir.into_iter().collect(),
            replica_lag_time_max_ms: 30_000,
            replica_high_watermark_checkpoint_interval_ms: 5_000,
            replica_fetch_min_bytes: 1,
            replica_fetch_max_bytes: 1024 * 1024,
            producer_purgatory_purge_interval_requests: 1000,
            fetch_purgatory_purge_interval_requests: 1000,
            delete_records_purgatory_purge_interval_requests: 1000,
            elect_leader_purgatory_purge_interval_requests: 1000,
            inter_broker_protocol_version: None,
            inter_broker_listener_name: None,
            replica_selector_class_name: None,
            transaction_partition_verification_enable: false,
            halt_on_log_dir_failure: false,
        },
    };

    info!(broker_id = config.broker_id, "starting flashq broker");

    let storage = if let Some(dir) = config.log_dirs.first() {
        StorageBackend::new_file(flashq::storage::file::SyncMode::default(), dir)
    } else {
        StorageBackend::new_memory()
    };

    let replica_manager = ReplicaManager::new(
        ReplicaManagerConfig {
            broker_id: BrokerId(config.broker_id),
            log_dirs: config.log_dirs.clone(),
            replica_lag_time_max_ms: config.replica_lag_time_max_ms,
            hw_checkpoint_interval_ms: config.replica_high_watermark_checkpoint_interval_ms,
            produce_purgatory_purge_interval: config.producer_purgatory_purge_interval_requests,
            fetch_purgatory_purge_interval: config.fetch_purgatory_purge_interval_requests,
            delete_records_purgatory_purge_interval: config.delete_records_purgatory_purge_interval_requests,
            elect_leader_purgatory_purge_interval: config.elect_leader_purgatory_purge_interval_requests,
            fetcher_shard_count: 4,
        },
        storage,
    );

    let checkpoint_interval = Duration::from_millis(config.replica_high_watermark_checkpoint_interval_ms);
    let mut ticker = tokio::time::interval(checkpoint_interval);
    loop {
        ticker.tick().await;
        replica_manager.checkpoint_high_watermarks();
    }
}

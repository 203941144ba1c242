//! Core types for cluster metadata management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export PartitionId from flashq core
pub use flashq::storage::PartitionId;

/// Unique identifier for a broker in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerId(pub u32);

/// Monotonically increasing version number that tracks leadership changes for a partition.
/// Higher epochs indicate more recent leadership assignments and are used to prevent
/// split-brain scenarios in distributed cluster management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Epoch(pub u64);

/// Runtime status information for a broker in the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerRuntimeStatus {
    pub last_heartbeat: DateTime<Utc>,
    pub is_draining: bool,
}

/// Runtime state for a partition, tracking high water mark and log start offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRuntimeState {
    pub high_water_mark: u64,
    pub log_start_offset: u64,
}

// Implement From/Into traits for ergonomic conversion
impl From<u32> for BrokerId {
    fn from(id: u32) -> Self {
        BrokerId(id)
    }
}

impl From<BrokerId> for u32 {
    fn from(broker_id: BrokerId) -> Self {
        broker_id.0
    }
}

impl From<u64> for Epoch {
    fn from(epoch: u64) -> Self {
        Epoch(epoch)
    }
}

impl From<Epoch> for u64 {
    fn from(epoch: Epoch) -> Self {
        epoch.0
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker-{}", self.0)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch-{}", self.0)
    }
}

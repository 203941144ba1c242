//! Typed data-plane request/response shapes consumed by the Replica Manager.
//!
//! These are the Replica Manager's input contract, independent of whatever
//! wire framing a client-facing crate adapts them to.

use flashq::storage::PartitionId;
use flashq::{Record, RecordWithOffset};
use flashq_cluster::types::{BrokerId, Epoch};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredAcks {
    None,
    Leader,
    All,
}

impl RequiredAcks {
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(RequiredAcks::None),
            1 => Some(RequiredAcks::Leader),
            -1 => Some(RequiredAcks::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Increased,
    Same,
    None,
}

#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub timeout_ms: u64,
    pub required_acks: i16,
    pub internal_topics_allowed: bool,
    pub per_partition: HashMap<(String, PartitionId), Vec<Record>>,
    pub transactional_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProducePartitionResult {
    pub base_offset: u64,
    pub log_append_time_ms: i64,
    pub log_start_offset: u64,
    pub hw_change: AckOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    ReadUncommitted,
    ReadCommitted,
}

#[derive(Debug, Clone)]
pub struct FetchPartitionRequest {
    pub fetch_offset: u64,
    pub partition_max_bytes: usize,
    pub current_leader_epoch: Option<Epoch>,
    pub follower_log_start_offset: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReplicaId {
    Consumer,
    Follower(BrokerId),
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub replica_id: FetchReplicaId,
    pub max_wait_ms: u64,
    pub min_bytes: usize,
    pub max_bytes: usize,
    pub isolation: Isolation,
    pub per_partition: HashMap<(String, PartitionId), FetchPartitionRequest>,
}

#[derive(Debug, Clone)]
pub struct FetchPartitionResult {
    pub high_watermark: u64,
    pub log_start_offset: u64,
    pub log_end_offset: u64,
    pub records: Vec<RecordWithOffset>,
    pub last_stable_offset: u64,
    pub diverging_epoch: Option<Epoch>,
    pub preferred_read_replica: Option<BrokerId>,
}

#[derive(Debug, Clone)]
pub struct DeleteRecordsRequest {
    pub per_partition: HashMap<(String, PartitionId), u64>,
}

#[derive(Debug, Clone)]
pub struct DeleteRecordsResult {
    pub low_watermark: u64,
}

#[derive(Debug, Clone)]
pub struct OffsetForLeaderEpochRequest {
    pub current_leader_epoch: Option<Epoch>,
    pub leader_epoch: Epoch,
}

#[derive(Debug, Clone)]
pub struct EpochEndOffset {
    pub leader_epoch: Epoch,
    pub end_offset: u64,
}

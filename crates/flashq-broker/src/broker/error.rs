//! Per-partition error taxonomy for the Replica Manager and Partition Replica.

use std::fmt;

/// Error returned by a single-partition operation. Never propagates out of the
/// broker-level entry point: callers capture one of these into the partition's
/// response slot rather than letting it unwind past `ReplicaManager`.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaError {
    /// Fencing: the epoch carried by the request is stale.
    FencedLeaderEpoch {
        topic: String,
        partition: u32,
        current_epoch: u64,
        request_epoch: u64,
    },
    /// Fencing: the request's controller epoch is behind what this broker has seen.
    StaleControllerEpoch { current_epoch: u64, request_epoch: u64 },
    /// Placement: this broker hosts neither a leader nor a follower for the partition.
    NotLeaderOrFollower { topic: String, partition: u32 },
    /// Placement: no `HostedPartition` entry exists at all.
    UnknownTopicOrPartition { topic: String, partition: u32 },
    /// Placement: the topic-id carried by the request doesn't match the local log's.
    InconsistentTopicId { topic: String, partition: u32 },
    /// Storage: the partition's log directory is offline.
    KafkaStorageError { topic: String, partition: u32, reason: String },
    /// Storage: a record failed its checksum/shape validation.
    CorruptRecord { topic: String, partition: u32 },
    /// Storage: a single record exceeded the configured size limit.
    RecordTooLarge { topic: String, partition: u32, size: usize, max: usize },
    /// Storage: a whole batch exceeded the configured size limit.
    RecordBatchTooLarge { topic: String, partition: u32, size: usize, max: usize },
    /// Protocol/validation: the requested offset is outside `[logStartOffset, logEndOffset]`.
    OffsetOutOfRange { topic: String, partition: u32, requested: u64 },
    /// Protocol/validation: write targeted an internal topic without the internal-topics flag.
    InvalidTopic { topic: String },
    /// Protocol/validation: `required_acks` was outside `{-1, 0, 1}`.
    InvalidRequiredAcks { acks: i16 },
    /// Anything that doesn't classify; never retried blindly by the caller.
    UnknownServerError { context: String, reason: String },
}

impl fmt::Display for ReplicaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaError::FencedLeaderEpoch {
                topic,
                partition,
                current_epoch,
                request_epoch,
            } => write!(
                f,
                "fenced leader epoch for {topic}-{partition}: request {request_epoch} < current {current_epoch}"
            ),
            ReplicaError::StaleControllerEpoch {
                current_epoch,
                request_epoch,
            } => write!(
                f,
                "stale controller epoch: request {request_epoch} < current {current_epoch}"
            ),
            ReplicaError::NotLeaderOrFollower { topic, partition } => {
                write!(f, "not leader or follower for {topic}-{partition}")
            }
            ReplicaError::UnknownTopicOrPartition { topic, partition } => {
                write!(f, "unknown topic or partition {topic}-{partition}")
            }
            ReplicaError::InconsistentTopicId { topic, partition } => {
                write!(f, "inconsistent topic id for {topic}-{partition}")
            }
            ReplicaError::KafkaStorageError {
                topic,
                partition,
                reason,
            } => write!(f, "storage error for {topic}-{partition}: {reason}"),
            ReplicaError::CorruptRecord { topic, partition } => {
                write!(f, "corrupt record in {topic}-{partition}")
            }
            ReplicaError::RecordTooLarge {
                topic,
                partition,
                size,
                max,
            } => write!(f, "record too large for {topic}-{partition}: {size} > {max}"),
            ReplicaError::RecordBatchTooLarge {
                topic,
                partition,
                size,
                max,
            } => write!(f, "record batch too large for {topic}-{partition}: {size} > {max}"),
            ReplicaError::OffsetOutOfRange {
                topic,
                partition,
                requested,
            } => write!(f, "offset {requested} out of range for {topic}-{partition}"),
            ReplicaError::InvalidTopic { topic } => write!(f, "invalid topic '{topic}'"),
            ReplicaError::InvalidRequiredAcks { acks } => {
                write!(f, "invalid required_acks {acks}, expected -1, 0, or 1")
            }
            ReplicaError::UnknownServerError { context, reason } => {
                write!(f, "unknown server error in {context}: {reason}")
            }
        }
    }
}

impl std::error::Error for ReplicaError {}

impl ReplicaError {
    pub fn is_fencing(&self) -> bool {
        matches!(
            self,
            ReplicaError::FencedLeaderEpoch { .. } | ReplicaError::StaleControllerEpoch { .. }
        )
    }

    pub fn is_placement(&self) -> bool {
        matches!(
            self,
            ReplicaError::NotLeaderOrFollower { .. }
                | ReplicaError::UnknownTopicOrPartition { .. }
                | ReplicaError::InconsistentTopicId { .. }
        )
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, ReplicaError::KafkaStorageError { .. } | ReplicaError::CorruptRecord { .. })
    }

    /// Whether the partition that produced this error should be marked Offline.
    pub fn marks_offline(&self) -> bool {
        matches!(self, ReplicaError::KafkaStorageError { .. })
    }
}

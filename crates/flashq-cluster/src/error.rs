//! Error types for cluster metadata operations.

use std::fmt;

/// Main error type for cluster metadata operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterError {
    BrokerNotFound {
        broker_id: u32,
    },
    TopicNotFound {
        topic: String,
    },
    PartitionNotFound {
        topic: String,
        partition_id: u32,
    },
    /// Invalid manifest structure or data.
    InvalidManifest {
        context: String,
        reason: String,
    },
    /// Manifest file I/O error.
    ManifestIo {
        context: String,
        reason: String,
    },
    /// gRPC transport error.
    Transport {
        context: String,
        reason: String,
    },
    /// Invalid leader epoch (must be monotonically increasing).
    InvalidEpoch {
        topic: String,
        partition_id: u32,
        current_epoch: u64,
        new_epoch: u64,
    },
    /// Replica referenced in an operation is not part of the partition's replica set.
    InvalidReplica {
        topic: String,
        partition_id: u32,
        replica_id: u32,
    },
    /// Broker referenced in an operation has no entry in the cluster state.
    UnknownBroker {
        broker_id: u32,
    },
    /// The caller's view of the coordinator epoch is stale; it is no longer the active
    /// coordinator and must resign or refresh.
    StaleControllerEpoch {
        known_epoch: u64,
        observed_epoch: u64,
    },
    /// Attempted to act as coordinator without holding the coordinator lease.
    NotController {
        context: String,
    },
    /// A partition-epoch CAS write was rejected because the epoch moved since it was read.
    InvalidUpdateVersion {
        topic: String,
        partition_id: u32,
    },
    /// A replica named in a proposed ISR is not eligible (e.g. deleted or fenced).
    IneligibleReplica {
        topic: String,
        partition_id: u32,
        replica_id: u32,
    },
    /// Programmer error: an illegal state-machine transition was attempted.
    IllegalStateTransition {
        context: String,
        reason: String,
    },
    /// Fencing: an AlterPartition or control-RPC carried a leader epoch behind
    /// what the coordinator or replica currently holds.
    FencedLeaderEpoch {
        topic: String,
        partition_id: u32,
        current_epoch: u64,
        request_epoch: u64,
    },
    /// Protocol/validation: a request was well-formed but violates a coordinator-side
    /// precondition (e.g. a recovering leader proposing an ISR with more than one member).
    InvalidRequest {
        context: String,
        reason: String,
    },
    /// Election: no replica in the current ISR (or, absent unclean election, no live
    /// replica at all) is eligible to become leader.
    EligibleLeadersNotAvailable {
        topic: String,
        partition_id: u32,
    },
    /// Election: the partition's preferred replica is not currently eligible to lead.
    PreferredLeaderNotAvailable {
        topic: String,
        partition_id: u32,
    },
    /// Election: the partition already satisfies the requested election's goal.
    ElectionNotNeeded {
        topic: String,
        partition_id: u32,
    },
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::BrokerNotFound { broker_id } => {
                write!(f, "Broker with ID {broker_id} not found")
            }
            ClusterError::TopicNotFound { topic } => {
                write!(f, "Topic '{topic}' not found")
            }
            ClusterError::PartitionNotFound { topic, partition_id } => {
                write!(f, "Partition {partition_id} not found for topic '{topic}'")
            }
            ClusterError::InvalidManifest { context, reason } => {
                write!(f, "Invalid manifest in {context}: {reason}")
            }
            ClusterError::ManifestIo { context, reason } => {
                write!(f, "Manifest I/O error in {context}: {reason}")
            }
            ClusterError::Transport { context, reason } => {
                write!(f, "Transport error in {context}: {reason}")
            }
            ClusterError::InvalidEpoch {
                topic,
                partition_id,
                current_epoch,
                new_epoch,
            } => {
                write!(
                    f,
                    "Invalid epoch for topic '{topic}' partition {partition_id}: \
                     attempted {new_epoch}, current {current_epoch} (epochs must increase)"
                )
            }
            ClusterError::InvalidReplica {
                topic,
                partition_id,
                replica_id,
            } => {
                write!(
                    f,
                    "Broker {replica_id} is not a replica of '{topic}' partition {partition_id}"
                )
            }
            ClusterError::UnknownBroker { broker_id } => {
                write!(f, "Broker with ID {broker_id} is unknown to the cluster")
            }
            ClusterError::StaleControllerEpoch {
                known_epoch,
                observed_epoch,
            } => {
                write!(
                    f,
                    "Stale controller epoch: observed {observed_epoch}, known {known_epoch}"
                )
            }
            ClusterError::NotController { context } => {
                write!(f, "Not the active coordinator: {context}")
            }
            ClusterError::InvalidUpdateVersion {
                topic,
                partition_id,
            } => {
                write!(
                    f,
                    "Partition epoch went backwards for '{topic}' partition {partition_id}"
                )
            }
            ClusterError::IneligibleReplica {
                topic,
                partition_id,
                replica_id,
            } => {
                write!(
                    f,
                    "Replica {replica_id} is ineligible for '{topic}' partition {partition_id}"
                )
            }
            ClusterError::IllegalStateTransition { context, reason } => {
                write!(f, "Illegal state transition in {context}: {reason}")
            }
            ClusterError::FencedLeaderEpoch {
                topic,
                partition_id,
                current_epoch,
                request_epoch,
            } => write!(
                f,
                "Fenced leader epoch for '{topic}' partition {partition_id}: request {request_epoch} < current {current_epoch}"
            ),
            ClusterError::InvalidRequest { context, reason } => {
                write!(f, "Invalid request in {context}: {reason}")
            }
            ClusterError::EligibleLeadersNotAvailable { topic, partition_id } => write!(
                f,
                "No eligible leader available for '{topic}' partition {partition_id}"
            ),
            ClusterError::PreferredLeaderNotAvailable { topic, partition_id } => write!(
                f,
                "Preferred replica not available to lead '{topic}' partition {partition_id}"
            ),
            ClusterError::ElectionNotNeeded { topic, partition_id } => write!(
                f,
                "Election not needed for '{topic}' partition {partition_id}"
            ),
        }
    }
}

impl std::error::Error for ClusterError {}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClusterError::BrokerNotFound { .. }
                | ClusterError::TopicNotFound { .. }
                | ClusterError::PartitionNotFound { .. }
        )
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ClusterError::BrokerNotFound { .. }
                | ClusterError::TopicNotFound { .. }
                | ClusterError::PartitionNotFound { .. }
                | ClusterError::InvalidManifest { .. }
                | ClusterError::InvalidEpoch { .. }
                | ClusterError::InvalidReplica { .. }
                | ClusterError::UnknownBroker { .. }
                | ClusterError::InvalidUpdateVersion { .. }
                | ClusterError::IneligibleReplica { .. }
        )
    }

    /// True for fencing errors: the caller's view of an epoch is stale and it must
    /// refresh metadata before retrying; never retried locally.
    pub fn is_fencing(&self) -> bool {
        matches!(
            self,
            ClusterError::InvalidEpoch { .. }
                | ClusterError::StaleControllerEpoch { .. }
                | ClusterError::NotController { .. }
                | ClusterError::FencedLeaderEpoch { .. }
        )
    }

    /// True for election-specific errors raised by a partition-state-machine
    /// transition to Online; these are surfaced to the election's caller, not retried.
    pub fn is_election(&self) -> bool {
        matches!(
            self,
            ClusterError::EligibleLeadersNotAvailable { .. }
                | ClusterError::PreferredLeaderNotAvailable { .. }
                | ClusterError::ElectionNotNeeded { .. }
        )
    }

    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        ClusterError::ManifestIo {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_parse_error(e: impl std::fmt::Display, context: &str) -> Self {
        ClusterError::InvalidManifest {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_transport_error(e: impl std::fmt::Display, context: &str) -> Self {
        ClusterError::Transport {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }
}

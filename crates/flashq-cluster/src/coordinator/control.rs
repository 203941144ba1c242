//! Typed in-process representation of the inter-broker control RPCs
//! (LeaderAndISR, StopReplica, UpdateMetadata, AlterPartition).
//!
//! No `.proto` source for these exists anywhere in this workspace: they are
//! a control-plane concern the coordinator and each broker's Replica Manager
//! exchange in-process (or, in a multi-process deployment, over whatever
//! transport the deployment wires up out of band), not part of the
//! client-facing wire protocol this crate already declares in `proto`. See
//! DESIGN.md for why plain structs are used here instead of `tonic`/`prost`.

use crate::coordinator::context::{LeaderAndIsr, RecoveryState};
use crate::types::{BrokerId, Epoch, PartitionId};

/// Bypasses the usual `leaderEpoch` comparison on a `StopReplica` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReplicaEpoch {
    Value(Epoch),
    NoEpoch,
    EpochDuringDelete,
}

impl StopReplicaEpoch {
    pub fn is_fenced_by(&self, current: Epoch) -> bool {
        match self {
            StopReplicaEpoch::Value(requested) => *requested < current,
            StopReplicaEpoch::NoEpoch | StopReplicaEpoch::EpochDuringDelete => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeaderAndIsrPartitionState {
    pub topic: String,
    pub partition: PartitionId,
    pub leader_epoch: Epoch,
    pub leader: Option<BrokerId>,
    pub isr: Vec<BrokerId>,
    pub partition_epoch: Epoch,
    pub replicas: Vec<BrokerId>,
    pub adding_replicas: Vec<BrokerId>,
    pub removing_replicas: Vec<BrokerId>,
    pub is_new: bool,
}

#[derive(Debug, Clone)]
pub struct LeaderAndIsrRequest {
    pub controller_id: BrokerId,
    pub controller_epoch: Epoch,
    pub broker_epoch: Epoch,
    pub partition_states: Vec<LeaderAndIsrPartitionState>,
}

#[derive(Debug, Clone)]
pub struct StopReplicaPartition {
    pub topic: String,
    pub partition: PartitionId,
    pub leader_epoch: StopReplicaEpoch,
}

#[derive(Debug, Clone)]
pub struct StopReplicaRequest {
    pub controller_id: BrokerId,
    pub controller_epoch: Epoch,
    pub delete_partitions: bool,
    pub partitions: Vec<StopReplicaPartition>,
}

#[derive(Debug, Clone)]
pub struct UpdateMetadataPartitionState {
    pub topic: String,
    pub partition: PartitionId,
    pub leader: Option<BrokerId>,
    pub leader_epoch: Epoch,
    pub isr: Vec<BrokerId>,
    pub partition_epoch: Epoch,
    pub replicas: Vec<BrokerId>,
}

#[derive(Debug, Clone)]
pub struct UpdateMetadataRequest {
    pub controller_id: BrokerId,
    pub controller_epoch: Epoch,
    pub alive_brokers: Vec<BrokerId>,
    pub partitions: Vec<UpdateMetadataPartitionState>,
}

/// Broker-initiated ISR-update proposal, and the coordinator's reply.
#[derive(Debug, Clone)]
pub struct AlterPartitionRequest {
    pub broker_id: BrokerId,
    pub broker_epoch: Epoch,
    pub topic: String,
    pub partition: PartitionId,
    pub leader_epoch: Epoch,
    pub new_partition_epoch: Epoch,
    pub new_isr: Vec<BrokerId>,
    pub leader_recovery_state: RecoveryState,
}

#[derive(Debug, Clone)]
pub enum AlterPartitionResponse {
    Committed(LeaderAndIsr),
    Error(crate::ClusterError),
}

/// One of the three fan-out message kinds queued by a state-machine
/// transition, addressed to a single destination broker. The
/// [`super::batcher::RpcBatcher`] groups these per destination and sends
/// each batch at most once per coordinator epoch.
#[derive(Debug, Clone)]
pub enum OutboundRpc {
    LeaderAndIsr {
        destination: BrokerId,
        request: LeaderAndIsrRequest,
    },
    StopReplica {
        destination: BrokerId,
        request: StopReplicaRequest,
    },
    UpdateMetadata {
        destination: BrokerId,
        request: UpdateMetadataRequest,
    },
}

impl OutboundRpc {
    pub fn destination(&self) -> BrokerId {
        match self {
            OutboundRpc::LeaderAndIsr { destination, .. } => *destination,
            OutboundRpc::StopReplica { destination, .. } => *destination,
            OutboundRpc::UpdateMetadata { destination, .. } => *destination,
        }
    }
}

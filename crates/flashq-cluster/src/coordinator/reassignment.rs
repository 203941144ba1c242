//! Partition reassignment, modeled as a single internal state machine
//! (phases U/A/B) regardless of whether it was triggered administratively,
//! by a metadata-store watch, or resumed after a coordinator restart — only
//! the entry point differs, per the design note in SPEC_FULL.md §9.

use crate::ClusterError;
use crate::coordinator::batcher::RpcBatcher;
use crate::coordinator::context::{ControllerContext, ReplicaAssignment, TopicPartition};
use crate::coordinator::control::{LeaderAndIsrPartitionState, StopReplicaEpoch, StopReplicaPartition};
use crate::coordinator::state_machine::{ElectionStrategy, PartitionState, PartitionStateMachine, ReplicaState, ReplicaStateMachine};
use crate::types::{BrokerId, Epoch};

/// Phase U: record reassignment intent. `replicas = ORS ∪ TRS`, `adding =
/// TRS \ ORS`, `removing = ORS \ TRS`. If a prior reassignment is being
/// superseded, any replica in neither the new origin nor target set is
/// stopped (without delete — it may still be needed if the new reassignment
/// is itself later superseded).
pub fn begin_reassignment(
    ctx: &mut ControllerContext,
    batcher: &mut RpcBatcher,
    tp: TopicPartition,
    target_replicas: Vec<BrokerId>,
) -> Result<(), ClusterError> {
    let current = ctx
        .replica_assignment(&tp)
        .cloned()
        .ok_or_else(|| ClusterError::PartitionNotFound {
            topic: tp.topic.clone(),
            partition_id: tp.partition.into(),
        })?;
    let origin: Vec<BrokerId> = current.target_replicas();

    let superseded: Vec<BrokerId> = current
        .replicas
        .iter()
        .copied()
        .filter(|r| !origin.contains(r) && !target_replicas.contains(r))
        .collect();
    for replica in superseded {
        queue_stop_replica(ctx, batcher, &tp, replica, false);
    }

    let mut replicas = origin.clone();
    for r in &target_replicas {
        if !replicas.contains(r) {
            replicas.push(*r);
        }
    }
    let adding: Vec<BrokerId> = target_replicas
        .iter()
        .copied()
        .filter(|r| !origin.contains(r))
        .collect();
    let removing: Vec<BrokerId> = origin
        .iter()
        .copied()
        .filter(|r| !target_replicas.contains(r))
        .collect();

    ctx.set_replica_assignment(
        tp,
        ReplicaAssignment {
            replicas,
            adding_replicas: adding,
            removing_replicas: removing,
        },
    );
    Ok(())
}

/// Phase A: bump the leader epoch, push LeaderAndISR to every replica (old
/// and new), and mark the new replicas so the Fetcher Pool starts pulling
/// from the leader for them.
pub fn phase_a_fan_out_and_start_fetchers(
    ctx: &mut ControllerContext,
    batcher: &mut RpcBatcher,
    tp: &TopicPartition,
) -> Result<(), ClusterError> {
    let assignment = ctx
        .replica_assignment(tp)
        .cloned()
        .ok_or_else(|| ClusterError::PartitionNotFound {
            topic: tp.topic.clone(),
            partition_id: tp.partition.into(),
        })?;
    let current = ctx
        .leader_and_isr(tp)
        .cloned()
        .ok_or_else(|| ClusterError::PartitionNotFound {
            topic: tp.topic.clone(),
            partition_id: tp.partition.into(),
        })?;

    let bumped = crate::coordinator::context::LeaderAndIsr {
        leader: current.leader,
        leader_epoch: Epoch(current.leader_epoch.0 + 1),
        isr: current.isr.clone(),
        partition_epoch: Epoch(current.partition_epoch.0 + 1),
        recovery_state: current.recovery_state,
    };
    ctx.set_leader_and_isr(tp.clone(), bumped.clone());

    for replica in &assignment.adding_replicas {
        ReplicaStateMachine::transition(ctx, tp.clone(), *replica, ReplicaState::New).ok();
        ReplicaStateMachine::transition(ctx, tp.clone(), *replica, ReplicaState::Online).ok();
    }

    for replica in &assignment.replicas {
        batcher.add_leader_and_isr(
            *replica,
            LeaderAndIsrPartitionState {
                topic: tp.topic.clone(),
                partition: tp.partition,
                leader_epoch: bumped.leader_epoch,
                leader: bumped.leader,
                isr: bumped.isr.clone(),
                partition_epoch: bumped.partition_epoch,
                replicas: assignment.replicas.clone(),
                adding_replicas: assignment.adding_replicas.clone(),
                removing_replicas: assignment.removing_replicas.clone(),
                is_new: assignment.adding_replicas.contains(replica),
            },
        );
    }
    Ok(())
}

/// Phase B: once every target replica has joined the ISR, commit
/// `replicas = TRS`, elect a new leader from TRS if needed, and retire the
/// replicas being removed (Offline, then NonExistent via StopReplica with
/// delete). Returns `true` if the reassignment actually completed this call.
pub fn maybe_complete_phase_b(
    ctx: &mut ControllerContext,
    batcher: &mut RpcBatcher,
    tp: &TopicPartition,
) -> Result<bool, ClusterError> {
    let assignment = match ctx.replica_assignment(tp) {
        Some(a) => a.clone(),
        None => return Ok(false),
    };
    if !assignment.is_reassigning() {
        return Ok(false);
    }
    let target = assignment.target_replicas();
    let current_isr = ctx.leader_and_isr(tp).map(|l| l.isr.clone()).unwrap_or_default();
    if !target.iter().all(|r| current_isr.contains(r)) {
        return Ok(false);
    }

    let leader_in_target = ctx
        .leader_and_isr(tp)
        .and_then(|l| l.leader)
        .map(|l| target.contains(&l) && ctx.is_broker_live(l))
        .unwrap_or(false);

    if !leader_in_target {
        PartitionStateMachine::transition(
            ctx,
            tp.clone(),
            PartitionState::Online,
            Some(ElectionStrategy::ReassignPartitionElection),
        )?;
    }

    ctx.set_replica_assignment(tp.clone(), ReplicaAssignment::simple(target.clone()));

    for replica in &assignment.removing_replicas {
        ReplicaStateMachine::transition(ctx, tp.clone(), *replica, ReplicaState::Offline).ok();
        queue_stop_replica(ctx, batcher, tp, *replica, true);
        ReplicaStateMachine::transition(ctx, tp.clone(), *replica, ReplicaState::ReplicaDeletionStarted).ok();
    }

    if let Some(info) = ctx.leader_and_isr(tp).cloned() {
        for replica in &target {
            batcher.add_leader_and_isr(
                *replica,
                LeaderAndIsrPartitionState {
                    topic: tp.topic.clone(),
                    partition: tp.partition,
                    leader_epoch: info.leader_epoch,
                    leader: info.leader,
                    isr: info.isr.clone(),
                    partition_epoch: info.partition_epoch,
                    replicas: target.clone(),
                    adding_replicas: vec![],
                    removing_replicas: vec![],
                    is_new: false,
                },
            );
        }
    }
    Ok(true)
}

fn queue_stop_replica(
    ctx: &ControllerContext,
    batcher: &mut RpcBatcher,
    tp: &TopicPartition,
    replica: BrokerId,
    delete: bool,
) {
    let epoch = ctx
        .leader_and_isr(tp)
        .map(|l| StopReplicaEpoch::Value(l.leader_epoch))
        .unwrap_or(StopReplicaEpoch::NoEpoch);
    batcher.add_stop_replica(
        replica,
        delete,
        StopReplicaPartition {
            topic: tp.topic.clone(),
            partition: tp.partition,
            leader_epoch: epoch,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::context::LeaderAndIsr;
    use flashq::storage::PartitionId;

    fn setup(ctx: &mut ControllerContext, tp: &TopicPartition, replicas: Vec<BrokerId>) {
        ctx.set_replica_assignment(tp.clone(), ReplicaAssignment::simple(replicas.clone()));
        ctx.set_leader_and_isr(tp.clone(), LeaderAndIsr::new(Some(replicas[0]), replicas.clone()));
        for r in &replicas {
            ctx.add_or_update_live_broker(*r, Epoch(1));
        }
    }

    #[test]
    fn full_reassignment_cycle_converges_to_target_replica_set() {
        let mut ctx = ControllerContext::new();
        let mut batcher = RpcBatcher::new(BrokerId(1));
        let tp = TopicPartition::new("orders", PartitionId::new(0));
        setup(&mut ctx, &tp, vec![BrokerId(1), BrokerId(2), BrokerId(3)]);
        batcher.set_alive_brokers(vec![BrokerId(1), BrokerId(2), BrokerId(3), BrokerId(4), BrokerId(5), BrokerId(6)]);
        for b in [BrokerId(4), BrokerId(5), BrokerId(6)] {
            ctx.add_or_update_live_broker(b, Epoch(1));
        }

        begin_reassignment(&mut ctx, &mut batcher, tp.clone(), vec![BrokerId(4), BrokerId(5), BrokerId(6)]).unwrap();
        let assignment = ctx.replica_assignment(&tp).unwrap();
        assert_eq!(assignment.adding_replicas, vec![BrokerId(4), BrokerId(5), BrokerId(6)]);
        assert_eq!(assignment.removing_replicas, vec![BrokerId(1), BrokerId(2), BrokerId(3)]);

        phase_a_fan_out_and_start_fetchers(&mut ctx, &mut batcher, &tp).unwrap();
        assert!(!maybe_complete_phase_b(&mut ctx, &mut batcher, &tp).unwrap());

        // Simulate the new replicas catching up to the ISR.
        let mut info = ctx.leader_and_isr(&tp).unwrap().clone();
        info.isr = vec![BrokerId(1), BrokerId(2), BrokerId(3), BrokerId(4), BrokerId(5), BrokerId(6)];
        ctx.set_leader_and_isr(tp.clone(), info);

        let completed = maybe_complete_phase_b(&mut ctx, &mut batcher, &tp).unwrap();
        assert!(completed);
        let assignment = ctx.replica_assignment(&tp).unwrap();
        assert_eq!(assignment.replicas, vec![BrokerId(4), BrokerId(5), BrokerId(6)]);
        assert!(!assignment.is_reassigning());
    }
}

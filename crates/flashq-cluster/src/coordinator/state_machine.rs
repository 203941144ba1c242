//! Partition and replica state machines. Each is a pure `transition` function
//! over `ControllerContext` plus a tagged `ElectionStrategy`, not open
//! dispatch: invalid previous states are a typed `ClusterError`, not a panic,
//! so a single faulty RPC can't crash the event loop (though per the error
//! taxonomy, producing that error still forces coordinator resignation).

use crate::ClusterError;
use crate::coordinator::context::{ControllerContext, LeaderAndIsr, RecoveryState, TopicPartition};
use crate::types::{BrokerId, Epoch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionState {
    NonExistent,
    New,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicaState {
    NonExistent,
    New,
    Online,
    Offline,
    ReplicaDeletionStarted,
    ReplicaDeletionSuccessful,
    ReplicaDeletionIneligible,
}

/// Strategy consumed by a transition to `PartitionState::Online`. Modeled as
/// a tagged enum rather than per-strategy trait objects, per the "avoid open
/// dispatch" design note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionStrategy {
    /// The partition's leader went offline; elect from the live ISR (or, if
    /// unclean election is enabled, from any live assigned replica).
    OfflinePartitionElection { unclean_allowed: bool },
    /// A reassignment's target replica set has caught up; elect from the
    /// replicas in `target_replicas() ∩ ISR`.
    ReassignPartitionElection,
    /// Administrative rebalance: elect the first assigned replica if it is
    /// live and in the ISR.
    PreferredReplicaElection,
    /// A broker is shutting down; elect the next live, non-shutting-down ISR
    /// member that isn't the replica being shut down.
    ControlledShutdownElection { shutting_down: BrokerId },
}

fn err(context: impl Into<String>, reason: impl Into<String>) -> ClusterError {
    ClusterError::IllegalStateTransition {
        context: context.into(),
        reason: reason.into(),
    }
}

pub struct PartitionStateMachine;

impl PartitionStateMachine {
    pub fn valid_previous_states(target: PartitionState) -> &'static [PartitionState] {
        match target {
            PartitionState::New => &[PartitionState::NonExistent],
            PartitionState::Online => {
                &[PartitionState::New, PartitionState::Online, PartitionState::Offline]
            }
            PartitionState::Offline => {
                &[PartitionState::New, PartitionState::Online, PartitionState::Offline]
            }
            PartitionState::NonExistent => &[
                PartitionState::New,
                PartitionState::Online,
                PartitionState::Offline,
                PartitionState::NonExistent,
            ],
        }
    }

    /// Drives `tp` to `target`. A transition to `Online` runs the given
    /// election strategy and updates the partition's `LeaderAndIsr` as a
    /// side effect before the state itself flips.
    pub fn transition(
        ctx: &mut ControllerContext,
        tp: TopicPartition,
        target: PartitionState,
        strategy: Option<ElectionStrategy>,
    ) -> Result<PartitionState, ClusterError> {
        let current = ctx.partition_state(&tp);
        if !Self::valid_previous_states(target).contains(&current) {
            return Err(err(
                format!("partition {tp}"),
                format!("cannot go {current:?} -> {target:?}"),
            ));
        }

        if target == PartitionState::Online {
            let strategy = strategy.ok_or_else(|| {
                err(format!("partition {tp}"), "Online transition requires an election strategy")
            })?;
            let (leader, isr) = elect_leader(ctx, &tp, strategy)?;
            let prior = ctx.leader_and_isr(&tp).cloned();
            let partition_epoch = prior.as_ref().map(|l| l.partition_epoch.0 + 1).unwrap_or(1);
            let leader_epoch = prior
                .as_ref()
                .map(|l| {
                    if l.leader != Some(leader) {
                        l.leader_epoch.0 + 1
                    } else {
                        l.leader_epoch.0
                    }
                })
                .unwrap_or(0);
            ctx.set_leader_and_isr(
                tp.clone(),
                LeaderAndIsr {
                    leader: Some(leader),
                    leader_epoch: Epoch(leader_epoch),
                    isr,
                    partition_epoch: Epoch(partition_epoch),
                    recovery_state: RecoveryState::Recovered,
                },
            );
        }

        ctx.set_partition_state(tp, target);
        Ok(target)
    }
}

/// Runs one of the four election strategies against `ctx`, returning the
/// elected `(leader, isr)`. Unclean election (choosing from outside the ISR)
/// is only ever taken when `unclean_allowed` is explicitly set.
fn elect_leader(
    ctx: &ControllerContext,
    tp: &TopicPartition,
    strategy: ElectionStrategy,
) -> Result<(BrokerId, Vec<BrokerId>), ClusterError> {
    let assignment = ctx.replica_assignment(tp).ok_or_else(|| {
        ClusterError::PartitionNotFound {
            topic: tp.topic.clone(),
            partition_id: tp.partition.into(),
        }
    })?;
    let current = ctx.leader_and_isr(tp);
    let current_isr = current.map(|l| l.isr.clone()).unwrap_or_default();

    match strategy {
        ElectionStrategy::OfflinePartitionElection { unclean_allowed } => {
            if let Some(leader) = current_isr.iter().find(|r| ctx.is_broker_live(**r)) {
                return Ok((*leader, current_isr));
            }
            if unclean_allowed {
                if let Some(leader) = assignment.replicas.iter().find(|r| ctx.is_broker_live(**r)) {
                    return Ok((*leader, vec![*leader]));
                }
            }
            Err(ClusterError::EligibleLeadersNotAvailable {
                topic: tp.topic.clone(),
                partition_id: tp.partition.into(),
            })
        }
        ElectionStrategy::ReassignPartitionElection => {
            let target = assignment.target_replicas();
            if let Some(leader) = target
                .iter()
                .find(|r| current_isr.contains(r) && ctx.is_broker_live(**r))
            {
                let isr: Vec<BrokerId> = current_isr
                    .iter()
                    .copied()
                    .filter(|r| target.contains(r))
                    .collect();
                return Ok((*leader, isr));
            }
            Err(ClusterError::EligibleLeadersNotAvailable {
                topic: tp.topic.clone(),
                partition_id: tp.partition.into(),
            })
        }
        ElectionStrategy::PreferredReplicaElection => {
            let preferred = *assignment
                .replicas
                .first()
                .ok_or_else(|| ClusterError::PreferredLeaderNotAvailable {
                    topic: tp.topic.clone(),
                    partition_id: tp.partition.into(),
                })?;
            if current.and_then(|l| l.leader) == Some(preferred) {
                return Err(ClusterError::ElectionNotNeeded {
                    topic: tp.topic.clone(),
                    partition_id: tp.partition.into(),
                });
            }
            if current_isr.contains(&preferred) && ctx.is_broker_live(preferred) {
                Ok((preferred, current_isr))
            } else {
                Err(ClusterError::PreferredLeaderNotAvailable {
                    topic: tp.topic.clone(),
                    partition_id: tp.partition.into(),
                })
            }
        }
        ElectionStrategy::ControlledShutdownElection { shutting_down } => {
            if let Some(leader) = current_isr
                .iter()
                .find(|r| **r != shutting_down && ctx.is_broker_live(**r) && !ctx.is_broker_shutting_down(**r))
            {
                let isr: Vec<BrokerId> = current_isr.iter().copied().filter(|r| *r != shutting_down).collect();
                return Ok((*leader, isr));
            }
            Err(ClusterError::EligibleLeadersNotAvailable {
                topic: tp.topic.clone(),
                partition_id: tp.partition.into(),
            })
        }
    }
}

pub struct ReplicaStateMachine;

impl ReplicaStateMachine {
    pub fn valid_previous_states(target: ReplicaState) -> &'static [ReplicaState] {
        match target {
            ReplicaState::New => &[ReplicaState::NonExistent],
            ReplicaState::Online => &[
                ReplicaState::New,
                ReplicaState::Online,
                ReplicaState::Offline,
                ReplicaState::ReplicaDeletionIneligible,
            ],
            ReplicaState::Offline => &[ReplicaState::New, ReplicaState::Online, ReplicaState::Offline],
            ReplicaState::ReplicaDeletionStarted => {
                &[ReplicaState::Offline, ReplicaState::ReplicaDeletionIneligible]
            }
            ReplicaState::ReplicaDeletionSuccessful => &[ReplicaState::ReplicaDeletionStarted],
            ReplicaState::ReplicaDeletionIneligible => {
                &[ReplicaState::Offline, ReplicaState::ReplicaDeletionStarted, ReplicaState::New]
            }
            ReplicaState::NonExistent => &[ReplicaState::ReplicaDeletionSuccessful],
        }
    }

    /// Invalid transitions are a programmer error per §4.6: callers should
    /// treat this as fatal (the coordinator resigns rather than continuing
    /// with an inconsistent replica-state view).
    pub fn transition(
        ctx: &mut ControllerContext,
        tp: TopicPartition,
        replica: BrokerId,
        target: ReplicaState,
    ) -> Result<ReplicaState, ClusterError> {
        let current = ctx.replica_state(&tp, replica);
        if !Self::valid_previous_states(target).contains(&current) {
            return Err(err(
                format!("replica {replica} of {tp}"),
                format!("cannot go {current:?} -> {target:?}"),
            ));
        }
        ctx.set_replica_state(tp, replica, target);
        Ok(target)
    }
}

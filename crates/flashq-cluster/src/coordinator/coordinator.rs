//! The Cluster Coordinator: the single elected process that owns
//! `ControllerContext` and drives the partition/replica state machines,
//! topic deletion, preferred-replica rebalance, and `AlterPartition`
//! validation. Everything here runs on the [`EventLoop`]'s single worker;
//! no method takes `&mut self` from more than one call site at a time.

use log::{info, warn};
use uuid::Uuid;

use crate::ClusterError;
use crate::coordinator::batcher::RpcBatcher;
use crate::coordinator::context::{ControllerContext, LeaderAndIsr, ReplicaAssignment, TopicPartition};
use crate::coordinator::control::{AlterPartitionRequest, AlterPartitionResponse, OutboundRpc, UpdateMetadataPartitionState};
use crate::coordinator::event::{CoordinatorEvent, EventLoop, EventLoopHandle, HandlerOutcome};
use crate::coordinator::reassignment;
use crate::coordinator::state_machine::{ElectionStrategy, PartitionState, PartitionStateMachine, ReplicaState, ReplicaStateMachine};
use crate::types::{BrokerId, Epoch};

/// Whether this process currently holds the coordinator lease. A coordinator
/// that has resigned keeps its `ControllerContext` cleared and rejects every
/// event with `NotController` rather than attempting to process it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lease {
    Active,
    Resigned,
}

/// Owns the event loop and reacts to each [`CoordinatorEvent`] in turn.
/// Construct with [`Coordinator::new`], hand the returned [`EventLoopHandle`]
/// to whatever delivers events (heartbeat processing, admin RPCs, metadata
/// store watches), then drive it with [`Coordinator::run`].
pub struct Coordinator {
    self_id: BrokerId,
    context: ControllerContext,
    batcher: RpcBatcher,
    event_loop: EventLoop,
    lease: Lease,
    unclean_leader_election_enabled: bool,
    leader_imbalance_threshold_percent: u32,
}

impl Coordinator {
    pub fn new(
        self_id: BrokerId,
        queue_capacity: usize,
        unclean_leader_election_enabled: bool,
        leader_imbalance_threshold_percent: u32,
    ) -> (EventLoopHandle, Self) {
        let (handle, event_loop) = EventLoop::bounded(queue_capacity);
        (
            handle,
            Self {
                self_id,
                context: ControllerContext::new(),
                batcher: RpcBatcher::new(self_id),
                event_loop,
                lease: Lease::Resigned,
                unclean_leader_election_enabled,
                leader_imbalance_threshold_percent,
            },
        )
    }

    pub fn is_active(&self) -> bool {
        self.lease == Lease::Active
    }

    pub fn controller_epoch(&self) -> Epoch {
        self.context.controller_epoch()
    }

    /// Consumes events until [`CoordinatorEvent::Shutdown`] or the channel
    /// closes, draining and returning the queued control RPCs after each
    /// handled event. Callers typically hand each batch straight to whatever
    /// transport reaches the other brokers.
    pub async fn run(&mut self, mut on_outbound: impl FnMut(Vec<OutboundRpc>)) {
        while let Some(event) = self.event_loop.recv().await {
            let shutdown = matches!(event, CoordinatorEvent::Shutdown);
            let outcome = self.handle(event);
            if !outcome.outbound.is_empty() {
                on_outbound(outcome.outbound);
            }
            if outcome.must_resign {
                self.resign();
            }
            if shutdown {
                break;
            }
        }
        self.event_loop.preempt_all();
    }

    /// Wins the coordinator lease: bumps the controller epoch, clears and
    /// rebuilds `ControllerContext`, and emits a full `UpdateMetadata` to
    /// every live broker. `initial_brokers` and `initial_topics` are the
    /// cluster's current metadata-store state at the moment the lease was
    /// won, since a fresh coordinator otherwise starts blind.
    pub fn become_controller(
        &mut self,
        initial_brokers: Vec<BrokerId>,
        initial_topics: Vec<(String, Uuid, Vec<(TopicPartition, ReplicaAssignment, LeaderAndIsr)>)>,
    ) -> Vec<OutboundRpc> {
        self.context.clear();
        self.lease = Lease::Active;
        let epoch = self.context.bump_controller_epoch();
        for broker in &initial_brokers {
            self.context.add_or_update_live_broker(*broker, Epoch(0));
        }
        self.batcher.set_alive_brokers(initial_brokers.clone());

        for (topic, topic_id, partitions) in initial_topics {
            self.context.add_topic(topic.clone(), topic_id);
            for (tp, assignment, leader_and_isr) in partitions {
                self.context.set_replica_assignment(tp.clone(), assignment.clone());
                self.context.set_leader_and_isr(tp.clone(), leader_and_isr.clone());
                self.context.set_partition_state(tp.clone(), PartitionState::Online);
                for replica in &assignment.replicas {
                    self.context.set_replica_state(tp.clone(), *replica, ReplicaState::Online);
                }
                self.batcher.add_update_metadata_all_brokers(UpdateMetadataPartitionState {
                    topic: tp.topic.clone(),
                    partition: tp.partition,
                    leader: leader_and_isr.leader,
                    leader_epoch: leader_and_isr.leader_epoch,
                    isr: leader_and_isr.isr.clone(),
                    partition_epoch: leader_and_isr.partition_epoch,
                    replicas: assignment.replicas.clone(),
                });
            }
        }

        info!("became coordinator at epoch {epoch}");
        self.batcher.drain(epoch, Epoch(0))
    }

    /// Loses the coordinator lease: unregisters any outstanding watches (left
    /// to the caller, which owns the metadata-store client), preempts every
    /// queued event with `NotController`, and clears `ControllerContext` so a
    /// stale view can never leak into the next term.
    pub fn resign(&mut self) {
        warn!("resigning as coordinator at epoch {}", self.context.controller_epoch());
        self.lease = Lease::Resigned;
        self.event_loop.preempt_all();
        self.context.clear();
    }

    fn require_active(&self) -> Result<(), ClusterError> {
        if self.lease != Lease::Active {
            return Err(ClusterError::NotController {
                context: "event received while resigned".to_string(),
            });
        }
        Ok(())
    }

    /// Dispatches a single event to its handler. Matches
    /// `CoordinatorEvent::preempt`'s variant set: every branch that owns a
    /// reply sender replies here instead.
    pub fn handle(&mut self, event: CoordinatorEvent) -> HandlerOutcome {
        match event {
            CoordinatorEvent::Startup => HandlerOutcome::default(),
            CoordinatorEvent::Shutdown => HandlerOutcome::default(),
            CoordinatorEvent::ControllerChange | CoordinatorEvent::ReElect | CoordinatorEvent::SessionExpired => {
                HandlerOutcome {
                    outbound: Vec::new(),
                    must_resign: true,
                }
            }
            CoordinatorEvent::BrokerSetChange { added, removed } => self.on_broker_set_change(added, removed),
            CoordinatorEvent::BrokerMetadataChange { broker } => {
                let _ = broker;
                HandlerOutcome::default()
            }
            CoordinatorEvent::TopicAdded {
                topic,
                replicas_per_partition,
                reply,
            } => {
                let result = self.on_topic_added(topic, replicas_per_partition);
                let _ = reply.send(result.clone().map(|_| ()));
                self.outcome_from(result.map(|_| ()))
            }
            CoordinatorEvent::TopicRemoved { topic } => {
                self.context.remove_topic(&topic);
                HandlerOutcome::default()
            }
            CoordinatorEvent::PartitionCountChanged {
                topic,
                new_partition_count,
                reply,
            } => {
                let result = self.on_partition_count_changed(&topic, new_partition_count);
                let _ = reply.send(result.clone());
                self.outcome_from(result)
            }
            CoordinatorEvent::TopicDeletionRequested { topic, reply } => {
                let result = self.on_topic_deletion_requested(&topic);
                let _ = reply.send(result.clone());
                self.outcome_from(result)
            }
            CoordinatorEvent::PartitionReassignment {
                tp,
                target_replicas,
                reply,
            } => {
                let result = self.on_partition_reassignment(tp, target_replicas);
                let _ = reply.send(result.clone());
                self.outcome_from(result)
            }
            CoordinatorEvent::IsrChangeNotification { tp } => self.on_isr_change(tp),
            CoordinatorEvent::PreferredLeaderElectionRequested { partitions, reply } => {
                let result = self.on_preferred_leader_election(partitions);
                let _ = reply.send(result.clone());
                self.outcome_from(result)
            }
            CoordinatorEvent::ControlledShutdownRequested { broker, reply } => {
                let result = self.on_controlled_shutdown(broker);
                let _ = reply.send(result.clone());
                self.outcome_from(result)
            }
            CoordinatorEvent::AlterPartitionRequest { request, reply } => {
                let response = self.on_alter_partition(request);
                let _ = reply.send(response);
                self.drain_outbound()
            }
            CoordinatorEvent::UpdateFeatures => HandlerOutcome::default(),
            CoordinatorEvent::AllocateProducerIds { reply, .. } => {
                let _ = reply.send(Err(ClusterError::NotController {
                    context: "producer-id block allocation is out of scope for this core".to_string(),
                }));
                HandlerOutcome::default()
            }
        }
    }

    fn outcome_from(&mut self, result: Result<(), ClusterError>) -> HandlerOutcome {
        match result {
            Ok(()) => self.drain_outbound(),
            Err(e) if e.is_fencing() => HandlerOutcome {
                outbound: Vec::new(),
                must_resign: true,
            },
            Err(_) => HandlerOutcome::default(),
        }
    }

    fn drain_outbound(&mut self) -> HandlerOutcome {
        let epoch = self.context.controller_epoch();
        HandlerOutcome {
            outbound: self.batcher.drain(epoch, Epoch(0)),
            must_resign: false,
        }
    }

    fn on_broker_set_change(&mut self, added: Vec<BrokerId>, removed: Vec<BrokerId>) -> HandlerOutcome {
        for broker in &added {
            self.context.add_or_update_live_broker(*broker, Epoch(0));
        }
        let mut to_elect = Vec::new();
        for broker in &removed {
            self.context.remove_live_broker(*broker);
            let affected: Vec<TopicPartition> = self
                .context
                .all_topics()
                .iter()
                .flat_map(|t| self.context.partitions_for_topic(t))
                .filter(|tp| {
                    self.context
                        .leader_and_isr(tp)
                        .and_then(|l| l.leader)
                        .map(|l| l == *broker)
                        .unwrap_or(false)
                })
                .collect();
            to_elect.extend(affected);
        }
        for tp in to_elect {
            let _ = PartitionStateMachine::transition(
                &mut self.context,
                tp,
                PartitionState::Online,
                Some(ElectionStrategy::OfflinePartitionElection {
                    unclean_allowed: self.unclean_leader_election_enabled,
                }),
            );
        }
        let alive = self.context.live_broker_ids();
        self.batcher.set_alive_brokers(alive);
        self.drain_outbound()
    }

    fn on_topic_added(
        &mut self,
        topic: String,
        replicas_per_partition: Vec<Vec<BrokerId>>,
    ) -> Result<(), ClusterError> {
        self.require_active()?;
        let topic_id = Uuid::new_v4();
        self.context.add_topic(topic.clone(), topic_id);
        for (index, replicas) in replicas_per_partition.into_iter().enumerate() {
            let tp = TopicPartition::new(topic.clone(), (index as u32).into());
            self.context.set_replica_assignment(tp.clone(), ReplicaAssignment::simple(replicas.clone()));
            for replica in &replicas {
                ReplicaStateMachine::transition(&mut self.context, tp.clone(), *replica, ReplicaState::New)?;
            }
            PartitionStateMachine::transition(&mut self.context, tp.clone(), PartitionState::New, None)?;
            self.context.set_leader_and_isr(tp.clone(), LeaderAndIsr::new(None, replicas.clone()));
            PartitionStateMachine::transition(
                &mut self.context,
                tp.clone(),
                PartitionState::Online,
                Some(ElectionStrategy::OfflinePartitionElection { unclean_allowed: false }),
            )?;
            for replica in &replicas {
                ReplicaStateMachine::transition(&mut self.context, tp.clone(), *replica, ReplicaState::Online)?;
            }
            self.fan_out_leader_and_isr(&tp);
        }
        Ok(())
    }

    fn on_partition_count_changed(&mut self, topic: &str, new_partition_count: u32) -> Result<(), ClusterError> {
        self.require_active()?;
        let current = self.context.partitions_for_topic(topic).len() as u32;
        if new_partition_count <= current {
            return Err(ClusterError::InvalidRequest {
                context: format!("topic {topic}"),
                reason: "partition count cannot shrink".to_string(),
            });
        }
        let template = self
            .context
            .partitions_for_topic(topic)
            .first()
            .and_then(|tp| self.context.replica_assignment(tp).cloned())
            .ok_or_else(|| ClusterError::TopicNotFound { topic: topic.to_string() })?;
        for index in current..new_partition_count {
            let tp = TopicPartition::new(topic.to_string(), index.into());
            self.context.set_replica_assignment(tp.clone(), template.clone());
            for replica in &template.replicas {
                ReplicaStateMachine::transition(&mut self.context, tp.clone(), *replica, ReplicaState::New)?;
            }
            PartitionStateMachine::transition(&mut self.context, tp.clone(), PartitionState::New, None)?;
            self.context.set_leader_and_isr(tp.clone(), LeaderAndIsr::new(None, template.replicas.clone()));
            PartitionStateMachine::transition(
                &mut self.context,
                tp.clone(),
                PartitionState::Online,
                Some(ElectionStrategy::OfflinePartitionElection { unclean_allowed: false }),
            )?;
            for replica in &template.replicas {
                ReplicaStateMachine::transition(&mut self.context, tp.clone(), *replica, ReplicaState::Online)?;
            }
            self.fan_out_leader_and_isr(&tp);
        }
        Ok(())
    }

    /// Queues `topic` for deletion. If any of its partitions are mid
    /// reassignment the topic is marked ineligible instead, per §4.7: a
    /// reassignment must complete (or be cancelled) before deletion proceeds.
    fn on_topic_deletion_requested(&mut self, topic: &str) -> Result<(), ClusterError> {
        self.require_active()?;
        if !self.context.all_topics().contains(&topic.to_string()) {
            return Err(ClusterError::TopicNotFound { topic: topic.to_string() });
        }
        self.context.queue_topic_deletion(topic);
        self.try_advance_topic_deletion(topic);
        Ok(())
    }

    /// Drives one step of topic deletion for every queued topic: if any
    /// partition is still being reassigned the topic is marked ineligible;
    /// otherwise every replica is stopped (with delete) and, once all have
    /// reported `ReplicaDeletionSuccessful`, the topic is removed entirely.
    pub fn try_complete_topic_deletions(&mut self) -> Vec<OutboundRpc> {
        let topics = self.context.topics_to_be_deleted();
        for topic in &topics {
            self.try_advance_topic_deletion(topic);
        }
        self.drain_outbound().outbound
    }

    fn try_advance_topic_deletion(&mut self, topic: &str) {
        let partitions = self.context.partitions_for_topic(topic);
        let reassigning = partitions.iter().any(|tp| self.context.is_being_reassigned(tp));
        if reassigning {
            self.context.mark_topic_ineligible_for_deletion(topic);
            return;
        }
        self.context.clear_topic_ineligible_for_deletion(topic);

        if !self.context.has_topic_deletion_started(topic) {
            self.context.mark_topic_deletion_started(topic);
            for tp in &partitions {
                if let Some(assignment) = self.context.replica_assignment(tp).cloned() {
                    for replica in &assignment.replicas {
                        if ReplicaStateMachine::transition(&mut self.context, tp.clone(), *replica, ReplicaState::Offline).is_ok() {
                            let epoch = self
                                .context
                                .leader_and_isr(tp)
                                .map(|l| l.leader_epoch)
                                .unwrap_or(Epoch(0));
                            self.batcher.add_stop_replica(
                                *replica,
                                true,
                                crate::coordinator::control::StopReplicaPartition {
                                    topic: tp.topic.clone(),
                                    partition: tp.partition,
                                    leader_epoch: crate::coordinator::control::StopReplicaEpoch::Value(epoch),
                                },
                            );
                            let _ = ReplicaStateMachine::transition(
                                &mut self.context,
                                tp.clone(),
                                *replica,
                                ReplicaState::ReplicaDeletionStarted,
                            );
                        }
                    }
                }
            }
            return;
        }

        let all_deleted = partitions.iter().all(|tp| {
            self.context
                .replica_assignment(tp)
                .map(|assignment| {
                    assignment
                        .replicas
                        .iter()
                        .all(|r| self.context.replica_state(tp, *r) == ReplicaState::ReplicaDeletionSuccessful)
                })
                .unwrap_or(true)
        });
        if all_deleted {
            for tp in &partitions {
                self.context.remove_partition(tp);
            }
            self.context.complete_topic_deletion(topic);
        }
    }

    /// Records that a replica finished (or failed) deletion, as reported by
    /// the broker's Replica Manager after a `StopReplica(delete=true)` call
    /// completes. Feeds `try_complete_topic_deletions`'s convergence check.
    pub fn on_replica_deletion_result(&mut self, tp: TopicPartition, replica: BrokerId, succeeded: bool) {
        let target = if succeeded {
            ReplicaState::ReplicaDeletionSuccessful
        } else {
            ReplicaState::ReplicaDeletionIneligible
        };
        let _ = ReplicaStateMachine::transition(&mut self.context, tp, replica, target);
    }

    fn on_partition_reassignment(
        &mut self,
        tp: TopicPartition,
        target_replicas: Vec<BrokerId>,
    ) -> Result<(), ClusterError> {
        self.require_active()?;
        if self.context.is_topic_queued_for_deletion(&tp.topic) {
            return Err(ClusterError::InvalidRequest {
                context: format!("partition {tp}"),
                reason: "topic is queued for deletion".to_string(),
            });
        }
        reassignment::begin_reassignment(&mut self.context, &mut self.batcher, tp.clone(), target_replicas)?;
        reassignment::phase_a_fan_out_and_start_fetchers(&mut self.context, &mut self.batcher, &tp)?;
        reassignment::maybe_complete_phase_b(&mut self.context, &mut self.batcher, &tp)?;
        Ok(())
    }

    /// Driven by `IsrChangeNotification`: re-checks every in-flight
    /// reassignment's completion condition now that the ISR moved, and
    /// re-runs the ISR-shrink-triggered election if the partition's leader
    /// just dropped out of it.
    fn on_isr_change(&mut self, tp: TopicPartition) -> HandlerOutcome {
        if self.context.is_being_reassigned(&tp) {
            let _ = reassignment::maybe_complete_phase_b(&mut self.context, &mut self.batcher, &tp);
        }
        let leader_live = self
            .context
            .leader_and_isr(&tp)
            .and_then(|l| l.leader)
            .map(|l| self.context.is_broker_live(l))
            .unwrap_or(false);
        if !leader_live {
            let _ = PartitionStateMachine::transition(
                &mut self.context,
                tp,
                PartitionState::Online,
                Some(ElectionStrategy::OfflinePartitionElection {
                    unclean_allowed: self.unclean_leader_election_enabled,
                }),
            );
        }
        self.drain_outbound()
    }

    fn on_preferred_leader_election(&mut self, partitions: Vec<TopicPartition>) -> Result<(), ClusterError> {
        self.require_active()?;
        for tp in partitions {
            match PartitionStateMachine::transition(
                &mut self.context,
                tp.clone(),
                PartitionState::Online,
                Some(ElectionStrategy::PreferredReplicaElection),
            ) {
                Ok(_) => self.fan_out_leader_and_isr(&tp),
                Err(e) if e.is_election() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Periodic check (driven by the caller on whatever interval
    /// `leaderImbalanceCheckIntervalSeconds` names): for each live broker
    /// whose imbalance fraction exceeds the configured threshold, requests a
    /// preferred-replica election for its out-of-balance partitions.
    pub fn run_preferred_leader_rebalance_check(&mut self) -> Vec<OutboundRpc> {
        let threshold = self.leader_imbalance_threshold_percent as f64 / 100.0;
        let mut to_elect = Vec::new();
        for broker in self.context.live_broker_ids() {
            if self.context.preferred_replica_imbalance_fraction(broker) > threshold {
                to_elect.push(broker);
            }
        }
        let mut imbalanced_partitions = Vec::new();
        for tp in self.context.all_topics().iter().flat_map(|t| self.context.partitions_for_topic(t)) {
            if let Some(assignment) = self.context.replica_assignment(&tp) {
                if let Some(preferred) = assignment.replicas.first() {
                    if to_elect.contains(preferred) {
                        imbalanced_partitions.push(tp);
                    }
                }
            }
        }
        let _ = self.on_preferred_leader_election(imbalanced_partitions);
        self.drain_outbound().outbound
    }

    fn on_controlled_shutdown(&mut self, broker: BrokerId) -> Result<(), ClusterError> {
        self.require_active()?;
        self.context.mark_broker_shutting_down(broker);
        let affected: Vec<TopicPartition> = self
            .context
            .all_topics()
            .iter()
            .flat_map(|t| self.context.partitions_for_topic(t))
            .filter(|tp| {
                self.context
                    .leader_and_isr(tp)
                    .and_then(|l| l.leader)
                    .map(|l| l == broker)
                    .unwrap_or(false)
            })
            .collect();
        for tp in affected {
            match PartitionStateMachine::transition(
                &mut self.context,
                tp.clone(),
                PartitionState::Online,
                Some(ElectionStrategy::ControlledShutdownElection { shutting_down: broker }),
            ) {
                Ok(_) => self.fan_out_leader_and_isr(&tp),
                Err(e) if e.is_election() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Validates and commits a broker-initiated `AlterPartition` request,
    /// enforcing the five rules from §4.7:
    /// 1. `newPartitionEpoch`/`newLeaderEpoch` ahead of the coordinator's view
    ///    means the coordinator itself is stale → `NotController`.
    /// 2. `newLeaderEpoch` behind the current value → `FencedLeaderEpoch`.
    /// 3. `newPartitionEpoch` behind the current value → `InvalidUpdateVersion`.
    /// 4. A recovering leader (`RecoveryState::Recovering`) proposing an ISR
    ///    with more than one member → `InvalidRequest`.
    /// 5. Any replica in the proposed ISR that isn't a live assigned replica
    ///    → `IneligibleReplica`.
    fn on_alter_partition(&mut self, request: AlterPartitionRequest) -> AlterPartitionResponse {
        match self.validate_and_commit_alter_partition(request) {
            Ok(committed) => AlterPartitionResponse::Committed(committed),
            Err(e) => AlterPartitionResponse::Error(e),
        }
    }

    fn validate_and_commit_alter_partition(
        &mut self,
        request: AlterPartitionRequest,
    ) -> Result<LeaderAndIsr, ClusterError> {
        if self.lease != Lease::Active {
            return Err(ClusterError::NotController {
                context: "AlterPartition received while resigned".to_string(),
            });
        }
        let tp = TopicPartition::new(request.topic.clone(), request.partition);
        let current = self
            .context
            .leader_and_isr(&tp)
            .cloned()
            .ok_or_else(|| ClusterError::PartitionNotFound {
                topic: tp.topic.clone(),
                partition_id: tp.partition.into(),
            })?;

        if request.new_partition_epoch > Epoch(current.partition_epoch.0 + 1) || request.leader_epoch > current.leader_epoch {
            return Err(ClusterError::NotController {
                context: format!("AlterPartition for {tp}"),
            });
        }
        if request.leader_epoch < current.leader_epoch {
            return Err(ClusterError::FencedLeaderEpoch {
                topic: tp.topic.clone(),
                partition_id: tp.partition.into(),
                current_epoch: current.leader_epoch.0,
                request_epoch: request.leader_epoch.0,
            });
        }
        if request.new_partition_epoch <= current.partition_epoch && request.new_partition_epoch != current.partition_epoch {
            return Err(ClusterError::InvalidUpdateVersion {
                topic: tp.topic.clone(),
                partition_id: tp.partition.into(),
            });
        }
        if current.recovery_state == crate::coordinator::context::RecoveryState::Recovering && request.new_isr.len() > 1 {
            return Err(ClusterError::InvalidRequest {
                context: format!("AlterPartition for {tp}"),
                reason: "a recovering leader may only propose a singleton ISR".to_string(),
            });
        }
        let assignment = self
            .context
            .replica_assignment(&tp)
            .cloned()
            .ok_or_else(|| ClusterError::PartitionNotFound {
                topic: tp.topic.clone(),
                partition_id: tp.partition.into(),
            })?;
        for replica in &request.new_isr {
            if !assignment.replicas.contains(replica) || !self.context.is_broker_live(*replica) {
                return Err(ClusterError::IneligibleReplica {
                    topic: tp.topic.clone(),
                    partition_id: tp.partition.into(),
                    replica_id: (*replica).into(),
                });
            }
        }

        let committed = LeaderAndIsr {
            leader: current.leader,
            leader_epoch: current.leader_epoch,
            isr: request.new_isr,
            partition_epoch: request.new_partition_epoch,
            recovery_state: request.leader_recovery_state,
        };
        self.context.set_leader_and_isr(tp.clone(), committed.clone());
        self.fan_out_leader_and_isr(&tp);
        Ok(committed)
    }

    fn fan_out_leader_and_isr(&mut self, tp: &TopicPartition) {
        let Some(assignment) = self.context.replica_assignment(tp).cloned() else {
            return;
        };
        let Some(info) = self.context.leader_and_isr(tp).cloned() else {
            return;
        };
        for replica in &assignment.replicas {
            self.batcher.add_leader_and_isr(
                *replica,
                crate::coordinator::control::LeaderAndIsrPartitionState {
                    topic: tp.topic.clone(),
                    partition: tp.partition,
                    leader_epoch: info.leader_epoch,
                    leader: info.leader,
                    isr: info.isr.clone(),
                    partition_epoch: info.partition_epoch,
                    replicas: assignment.replicas.clone(),
                    adding_replicas: assignment.adding_replicas.clone(),
                    removing_replicas: assignment.removing_replicas.clone(),
                    is_new: false,
                },
            );
        }
        self.batcher.add_update_metadata_all_brokers(UpdateMetadataPartitionState {
            topic: tp.topic.clone(),
            partition: tp.partition,
            leader: info.leader,
            leader_epoch: info.leader_epoch,
            isr: info.isr,
            partition_epoch: info.partition_epoch,
            replicas: assignment.replicas,
        });
    }
}

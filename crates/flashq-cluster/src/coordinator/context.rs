//! In-memory cluster state owned exclusively by the coordinator's event-loop
//! task: brokers, topics, partition assignments, leader/ISR info,
//! reassignment and deletion sets. External code reads this only through the
//! narrow accessors below; nothing outside this module gets a `&mut` handle.

use crate::ClusterError;
use crate::coordinator::state_machine::{PartitionState, ReplicaState};
use crate::types::{BrokerId, Epoch, PartitionId};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Identity of a partition. Immutable; the topic-UUID, once assigned, never
/// changes while the topic exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: PartitionId,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: PartitionId) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl std::fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Replica set for a partition, with in-flight reassignment markers.
///
/// Invariants: `adding_replicas ⊆ replicas`, `removing_replicas ⊆ replicas`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaAssignment {
    pub replicas: Vec<BrokerId>,
    pub adding_replicas: Vec<BrokerId>,
    pub removing_replicas: Vec<BrokerId>,
}

impl ReplicaAssignment {
    pub fn simple(replicas: Vec<BrokerId>) -> Self {
        Self {
            replicas,
            adding_replicas: Vec::new(),
            removing_replicas: Vec::new(),
        }
    }

    /// `replicas \ addingReplicas`: the replica set before reassignment began.
    pub fn origin_replicas(&self) -> Vec<BrokerId> {
        self.replicas
            .iter()
            .copied()
            .filter(|r| !self.adding_replicas.contains(r))
            .collect()
    }

    /// `replicas \ removingReplicas`: the replica set reassignment is converging to.
    pub fn target_replicas(&self) -> Vec<BrokerId> {
        self.replicas
            .iter()
            .copied()
            .filter(|r| !self.removing_replicas.contains(r))
            .collect()
    }

    pub fn is_reassigning(&self) -> bool {
        !self.adding_replicas.is_empty() || !self.removing_replicas.is_empty()
    }
}

/// Whether a partition's leader-epoch comparison should be bypassed. Kept as
/// a first-class tombstone state rather than overloading `leader_epoch` with
/// sentinel integer values (see DESIGN.md's record of this open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Recovered,
    Recovering,
    DeleteInProgress,
}

/// Leadership snapshot for a partition: leader, leader epoch, ISR, and the
/// partition epoch used as a CAS token against the metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderAndIsr {
    pub leader: Option<BrokerId>,
    pub leader_epoch: Epoch,
    pub isr: Vec<BrokerId>,
    pub partition_epoch: Epoch,
    pub recovery_state: RecoveryState,
}

impl LeaderAndIsr {
    pub fn new(leader: Option<BrokerId>, isr: Vec<BrokerId>) -> Self {
        Self {
            leader,
            leader_epoch: Epoch(0),
            isr,
            partition_epoch: Epoch(0),
            recovery_state: RecoveryState::Recovered,
        }
    }

    /// `leader ∈ ISR ∨ leader = NO_LEADER`.
    pub fn is_valid(&self) -> bool {
        match self.leader {
            Some(leader) => self.isr.contains(&leader),
            None => true,
        }
    }
}

pub struct ControllerContext {
    controller_epoch: Epoch,
    live_brokers: HashMap<BrokerId, Epoch>,
    shutting_down_brokers: HashSet<BrokerId>,
    all_topics: HashSet<String>,
    topic_ids: HashMap<String, Uuid>,
    partition_assignments: HashMap<TopicPartition, ReplicaAssignment>,
    partition_leader_info: HashMap<TopicPartition, LeaderAndIsr>,
    partitions_being_reassigned: HashSet<TopicPartition>,
    partition_states: HashMap<TopicPartition, PartitionState>,
    replica_states: HashMap<(TopicPartition, BrokerId), ReplicaState>,
    offline_partitions_by_broker: HashMap<BrokerId, HashSet<TopicPartition>>,
    topics_to_be_deleted: HashSet<String>,
    topics_ineligible_for_deletion: HashSet<String>,
    topics_deletion_started: HashSet<String>,
    preferred_replica_imbalance_count: usize,
}

impl ControllerContext {
    pub fn new() -> Self {
        Self {
            controller_epoch: Epoch(0),
            live_brokers: HashMap::new(),
            shutting_down_brokers: HashSet::new(),
            all_topics: HashSet::new(),
            topic_ids: HashMap::new(),
            partition_assignments: HashMap::new(),
            partition_leader_info: HashMap::new(),
            partitions_being_reassigned: HashSet::new(),
            partition_states: HashMap::new(),
            replica_states: HashMap::new(),
            offline_partitions_by_broker: HashMap::new(),
            topics_to_be_deleted: HashSet::new(),
            topics_ineligible_for_deletion: HashSet::new(),
            topics_deletion_started: HashSet::new(),
            preferred_replica_imbalance_count: 0,
        }
    }

    // -- coordinator epoch -------------------------------------------------

    pub fn controller_epoch(&self) -> Epoch {
        self.controller_epoch
    }

    /// Strictly increases the controller epoch; called exactly once on
    /// winning the coordinator lease.
    pub fn bump_controller_epoch(&mut self) -> Epoch {
        self.controller_epoch = Epoch(self.controller_epoch.0 + 1);
        self.controller_epoch
    }

    // -- brokers -------------------------------------------------------------

    pub fn live_broker_ids(&self) -> Vec<BrokerId> {
        self.live_brokers.keys().copied().collect()
    }

    pub fn is_broker_live(&self, broker: BrokerId) -> bool {
        self.live_brokers.contains_key(&broker) && !self.shutting_down_brokers.contains(&broker)
    }

    pub fn add_or_update_live_broker(&mut self, broker: BrokerId, epoch: Epoch) {
        self.live_brokers.insert(broker, epoch);
    }

    pub fn remove_live_broker(&mut self, broker: BrokerId) {
        self.live_brokers.remove(&broker);
        self.shutting_down_brokers.remove(&broker);
    }

    pub fn mark_broker_shutting_down(&mut self, broker: BrokerId) {
        self.shutting_down_brokers.insert(broker);
    }

    pub fn is_broker_shutting_down(&self, broker: BrokerId) -> bool {
        self.shutting_down_brokers.contains(&broker)
    }

    // -- topics ----------------------------------------------------------------

    pub fn all_topics(&self) -> Vec<String> {
        self.all_topics.iter().cloned().collect()
    }

    pub fn add_topic(&mut self, topic: impl Into<String>, topic_id: Uuid) {
        let topic = topic.into();
        self.topic_ids.insert(topic.clone(), topic_id);
        self.all_topics.insert(topic);
    }

    pub fn topic_id(&self, topic: &str) -> Option<Uuid> {
        self.topic_ids.get(topic).copied()
    }

    pub fn remove_topic(&mut self, topic: &str) {
        self.all_topics.remove(topic);
        self.topic_ids.remove(topic);
        self.topics_to_be_deleted.remove(topic);
        self.topics_ineligible_for_deletion.remove(topic);
        self.topics_deletion_started.remove(topic);
    }

    pub fn partitions_for_topic(&self, topic: &str) -> Vec<TopicPartition> {
        self.partition_assignments
            .keys()
            .filter(|tp| tp.topic == topic)
            .cloned()
            .collect()
    }

    // -- assignments --------------------------------------------------------

    pub fn replica_assignment(&self, tp: &TopicPartition) -> Option<&ReplicaAssignment> {
        self.partition_assignments.get(tp)
    }

    pub fn set_replica_assignment(&mut self, tp: TopicPartition, assignment: ReplicaAssignment) {
        if assignment.is_reassigning() {
            self.partitions_being_reassigned.insert(tp.clone());
        } else {
            self.partitions_being_reassigned.remove(&tp);
        }
        self.partition_assignments.insert(tp, assignment);
    }

    pub fn remove_partition(&mut self, tp: &TopicPartition) {
        self.partition_assignments.remove(tp);
        self.partition_leader_info.remove(tp);
        self.partitions_being_reassigned.remove(tp);
        self.partition_states.remove(tp);
        self.replica_states.retain(|(key, _), _| key != tp);
    }

    pub fn partitions_being_reassigned(&self) -> Vec<TopicPartition> {
        self.partitions_being_reassigned.iter().cloned().collect()
    }

    pub fn is_being_reassigned(&self, tp: &TopicPartition) -> bool {
        self.partitions_being_reassigned.contains(tp)
    }

    // -- leadership ----------------------------------------------------------

    pub fn leader_and_isr(&self, tp: &TopicPartition) -> Option<&LeaderAndIsr> {
        self.partition_leader_info.get(tp)
    }

    pub fn set_leader_and_isr(&mut self, tp: TopicPartition, info: LeaderAndIsr) {
        self.partition_leader_info.insert(tp, info);
    }

    // -- partition / replica states ------------------------------------------

    pub fn partition_state(&self, tp: &TopicPartition) -> PartitionState {
        self.partition_states
            .get(tp)
            .copied()
            .unwrap_or(PartitionState::NonExistent)
    }

    pub fn set_partition_state(&mut self, tp: TopicPartition, state: PartitionState) {
        self.partition_states.insert(tp, state);
    }

    pub fn replica_state(&self, tp: &TopicPartition, replica: BrokerId) -> ReplicaState {
        self.replica_states
            .get(&(tp.clone(), replica))
            .copied()
            .unwrap_or(ReplicaState::NonExistent)
    }

    pub fn set_replica_state(&mut self, tp: TopicPartition, replica: BrokerId, state: ReplicaState) {
        self.replica_states.insert((tp, replica), state);
    }

    pub fn replicas_in_state(&self, tp: &TopicPartition, state: ReplicaState) -> Vec<BrokerId> {
        self.replica_states
            .iter()
            .filter(|((key, _), s)| key == tp && **s == state)
            .map(|((_, replica), _)| *replica)
            .collect()
    }

    // -- offline partitions ----------------------------------------------------

    pub fn mark_partition_offline_on(&mut self, broker: BrokerId, tp: TopicPartition) {
        self.offline_partitions_by_broker
            .entry(broker)
            .or_default()
            .insert(tp);
    }

    pub fn offline_partitions_on(&self, broker: BrokerId) -> Vec<TopicPartition> {
        self.offline_partitions_by_broker
            .get(&broker)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn offline_partition_count(&self) -> usize {
        self.partition_states
            .values()
            .filter(|s| **s == PartitionState::Offline)
            .count()
    }

    // -- topic deletion --------------------------------------------------------

    pub fn queue_topic_deletion(&mut self, topic: impl Into<String>) {
        self.topics_to_be_deleted.insert(topic.into());
    }

    pub fn is_topic_queued_for_deletion(&self, topic: &str) -> bool {
        self.topics_to_be_deleted.contains(topic)
    }

    pub fn topics_to_be_deleted(&self) -> Vec<String> {
        self.topics_to_be_deleted.iter().cloned().collect()
    }

    pub fn mark_topic_ineligible_for_deletion(&mut self, topic: impl Into<String>) {
        self.topics_ineligible_for_deletion.insert(topic.into());
    }

    pub fn clear_topic_ineligible_for_deletion(&mut self, topic: &str) {
        self.topics_ineligible_for_deletion.remove(topic);
    }

    pub fn is_topic_ineligible_for_deletion(&self, topic: &str) -> bool {
        self.topics_ineligible_for_deletion.contains(topic)
    }

    pub fn mark_topic_deletion_started(&mut self, topic: impl Into<String>) {
        self.topics_deletion_started.insert(topic.into());
    }

    pub fn has_topic_deletion_started(&self, topic: &str) -> bool {
        self.topics_deletion_started.contains(topic)
    }

    pub fn complete_topic_deletion(&mut self, topic: &str) {
        self.topics_to_be_deleted.remove(topic);
        self.topics_ineligible_for_deletion.remove(topic);
        self.topics_deletion_started.remove(topic);
        self.remove_topic(topic);
    }

    // -- preferred-replica rebalance -------------------------------------------

    pub fn set_preferred_replica_imbalance_count(&mut self, count: usize) {
        self.preferred_replica_imbalance_count = count;
    }

    pub fn preferred_replica_imbalance_count(&self) -> usize {
        self.preferred_replica_imbalance_count
    }

    /// Fraction of partitions for which `broker` is the preferred (first
    /// assigned) replica but is not currently leader. Used by the periodic
    /// preferred-replica rebalance.
    pub fn preferred_replica_imbalance_fraction(&self, broker: BrokerId) -> f64 {
        let mut preferred_for = 0usize;
        let mut imbalanced = 0usize;
        for (tp, assignment) in &self.partition_assignments {
            if assignment.replicas.first() != Some(&broker) {
                continue;
            }
            preferred_for += 1;
            let is_leader = self
                .partition_leader_info
                .get(tp)
                .and_then(|l| l.leader)
                .map(|l| l == broker)
                .unwrap_or(false);
            if !is_leader {
                imbalanced += 1;
            }
        }
        if preferred_for == 0 {
            0.0
        } else {
            imbalanced as f64 / preferred_for as f64
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn validate_controller_epoch(&self, observed: Epoch) -> Result<(), ClusterError> {
        if observed < self.controller_epoch {
            return Err(ClusterError::StaleControllerEpoch {
                known_epoch: self.controller_epoch.0,
                observed_epoch: observed.0,
            });
        }
        Ok(())
    }
}

impl Default for ControllerContext {
    fn default() -> Self {
        Self::new()
    }
}

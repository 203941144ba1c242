//! Partition Replica: the single-partition concurrency unit. Serializes
//! produce and role transitions; publishes HW and leader epoch; runs ISR
//! expansion/shrinkage; provides fetch.

use crate::broker::control::{AckOutcome, EpochEndOffset, FetchPartitionResult};
use crate::broker::error::ReplicaError;
use flashq::storage::{PartitionId, TopicLog};
use flashq::{Record, RecordWithOffset};
use flashq_cluster::metadata_store::MetadataStore;
use flashq_cluster::types::{BrokerId, Epoch};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRole {
    Leader,
    Follower,
}

/// What a leader knows about a follower's fetch progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowerState {
    pub log_end_offset: u64,
    pub last_caught_up: Option<Instant>,
}

/// The reassignment markers carried alongside a partition's live replica set.
#[derive(Debug, Clone, Default)]
pub struct ReassignmentMarkers {
    pub adding_replicas: Vec<BrokerId>,
    pub removing_replicas: Vec<BrokerId>,
}

impl ReassignmentMarkers {
    pub fn is_reassigning(&self) -> bool {
        !self.adding_replicas.is_empty() || !self.removing_replicas.is_empty()
    }
}

/// A single topic-partition's local replica state.
///
/// All mutation goes through `&self` methods guarded by an internal
/// exclusive lock, matching the "serializes produce and role transitions"
/// responsibility: callers never need their own lock around a `Partition`.
pub struct Partition {
    pub topic: String,
    pub partition_id: PartitionId,
    /// This broker's own replica id. The leader's own LEO is always exactly
    /// `leader_leo` (it owns the log); this id is excluded from the
    /// `follower_states`-based lookups in `recompute_high_watermark` and
    /// `maybe_shrink_isr` so a never-reported *self* entry isn't mistaken
    /// for a never-reported lagging follower.
    local_broker_id: BrokerId,
    log: Arc<RwLock<dyn TopicLog + Send + Sync>>,
    inner: RwLock<PartitionInner>,
}

struct PartitionInner {
    role: ReplicaRole,
    leader_epoch: Epoch,
    isr: Vec<BrokerId>,
    assigned_replicas: Vec<BrokerId>,
    high_watermark: u64,
    log_start_offset: u64,
    follower_states: HashMap<BrokerId, FollowerState>,
    markers: ReassignmentMarkers,
    offline: bool,
}

impl Partition {
    pub fn new(
        topic: impl Into<String>,
        partition_id: PartitionId,
        log: Arc<RwLock<dyn TopicLog + Send + Sync>>,
        assigned_replicas: Vec<BrokerId>,
        local_broker_id: BrokerId,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition_id,
            local_broker_id,
            log,
            inner: RwLock::new(PartitionInner {
                role: ReplicaRole::Follower,
                leader_epoch: Epoch(0),
                isr: assigned_replicas.clone(),
                assigned_replicas,
                high_watermark: 0,
                log_start_offset: 0,
                follower_states: HashMap::new(),
                markers: ReassignmentMarkers::default(),
                offline: false,
            }),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.inner.read().offline
    }

    pub fn mark_offline(&self) {
        self.inner.write().offline = true;
    }

    pub fn role(&self) -> ReplicaRole {
        self.inner.read().role
    }

    pub fn high_watermark(&self) -> u64 {
        self.inner.read().high_watermark
    }

    pub fn leader_epoch(&self) -> Epoch {
        self.inner.read().leader_epoch
    }

    pub fn isr(&self) -> Vec<BrokerId> {
        self.inner.read().isr.clone()
    }

    pub fn log_end_offset(&self) -> u64 {
        self.log.read().partition_next_offset(self.partition_id)
    }

    pub fn log_start_offset(&self) -> u64 {
        self.inner.read().log_start_offset
    }

    fn check_epoch(&self, request_epoch: Epoch) -> Result<(), ReplicaError> {
        let inner = self.inner.read();
        if request_epoch < inner.leader_epoch {
            return Err(ReplicaError::FencedLeaderEpoch {
                topic: self.topic.clone(),
                partition: self.partition_id.as_u32(),
                current_epoch: inner.leader_epoch.0,
                request_epoch: request_epoch.0,
            });
        }
        Ok(())
    }

    /// Transitions to leader for the given leader epoch; returns true iff the
    /// epoch actually advanced. Idempotent on equal epoch.
    #[instrument(level = "info", skip(self), fields(topic = %self.topic, partition = %self.partition_id))]
    pub fn make_leader(&self, new_epoch: Epoch, isr: Vec<BrokerId>, assigned_replicas: Vec<BrokerId>) -> bool {
        let mut inner = self.inner.write();
        if new_epoch < inner.leader_epoch {
            warn!(
                new_epoch = new_epoch.0,
                current_epoch = inner.leader_epoch.0,
                "ignoring make_leader with stale epoch"
            );
            return false;
        }
        let advanced = new_epoch > inner.leader_epoch;
        inner.role = ReplicaRole::Leader;
        inner.leader_epoch = new_epoch;
        inner.isr = isr;
        inner.assigned_replicas = assigned_replicas;
        inner.follower_states.clear();
        inner.offline = false;
        advanced
    }

    /// Symmetric to `make_leader`.
    #[instrument(level = "info", skip(self), fields(topic = %self.topic, partition = %self.partition_id))]
    pub fn make_follower(&self, new_epoch: Epoch, isr: Vec<BrokerId>, assigned_replicas: Vec<BrokerId>) -> bool {
        let mut inner = self.inner.write();
        if new_epoch < inner.leader_epoch {
            return false;
        }
        let advanced = new_epoch > inner.leader_epoch;
        inner.role = ReplicaRole::Follower;
        inner.leader_epoch = new_epoch;
        inner.isr = isr;
        inner.assigned_replicas = assigned_replicas;
        inner.offline = false;
        advanced
    }

    pub fn set_reassignment_markers(&self, markers: ReassignmentMarkers) {
        self.inner.write().markers = markers;
    }

    pub fn reassignment_markers(&self) -> ReassignmentMarkers {
        self.inner.read().markers.clone()
    }

    /// Appends to the log; may advance HW. Errors: NotLeader-equivalent is
    /// surfaced by the caller (Replica Manager checks role before calling),
    /// CorruptRecord/size errors come from the underlying log.
    #[instrument(level = "debug", skip(self, records), fields(topic = %self.topic, partition = %self.partition_id, count = records.len()))]
    pub fn append_records_to_leader(
        &self,
        records: Vec<Record>,
        leader_epoch: Epoch,
    ) -> Result<(u64, AckOutcome), ReplicaError> {
        if self.is_offline() {
            return Err(ReplicaError::KafkaStorageError {
                topic: self.topic.clone(),
                partition: self.partition_id.as_u32(),
                reason: "log directory offline".to_string(),
            });
        }
        {
            let inner = self.inner.read();
            if inner.role != ReplicaRole::Leader {
                return Err(ReplicaError::NotLeaderOrFollower {
                    topic: self.topic.clone(),
                    partition: self.partition_id.as_u32(),
                });
            }
        }
        self.check_epoch(leader_epoch)?;

        let base_offset = {
            let mut log = self.log.write();
            log.append_batch_partition(self.partition_id, records)
                .map_err(|e| ReplicaError::KafkaStorageError {
                    topic: self.topic.clone(),
                    partition: self.partition_id.as_u32(),
                    reason: e.to_string(),
                })?
        };

        let outcome = self.recompute_high_watermark();
        Ok((base_offset, outcome))
    }

    /// Recomputes HW = min(LEO) over current ISR (the leader's own LEO counts
    /// since the leader is always conceptually in its own ISR view here).
    /// Publishes monotonically; never rolls back.
    pub fn recompute_high_watermark(&self) -> AckOutcome {
        let mut inner = self.inner.write();
        let leader_leo = self.log.read().partition_next_offset(self.partition_id);
        let min_isr_leo = inner
            .isr
            .iter()
            .filter(|replica| **replica != self.local_broker_id)
            .map(|replica| {
                inner
                    .follower_states
                    .get(replica)
                    .map(|f| f.log_end_offset)
                    .unwrap_or(0)
            })
            .chain(std::iter::once(leader_leo))
            .min()
            .unwrap_or(leader_leo);

        if min_isr_leo > inner.high_watermark {
            inner.high_watermark = min_isr_leo;
            AckOutcome::Increased
        } else {
            AckOutcome::Same
        }
    }

    /// Called by a fetcher worker when a follower's fetch advances its LEO.
    pub fn update_follower_fetch_state(&self, replica: BrokerId, log_end_offset: u64) {
        let mut inner = self.inner.write();
        let state = inner.follower_states.entry(replica).or_default();
        state.log_end_offset = log_end_offset;
        state.last_caught_up = Some(Instant::now());
    }

    /// Removes followers whose fetch lag exceeds `replica_lag_time_max_ms * 1.5`.
    /// Returns the set of replicas dropped from the ISR, if any, so the
    /// caller can propose the shrink to the metadata store.
    #[instrument(level = "debug", skip(self), fields(topic = %self.topic, partition = %self.partition_id))]
    pub fn maybe_shrink_isr(&self, replica_lag_time_max_ms: u64) -> Vec<BrokerId> {
        let threshold = std::time::Duration::from_millis(replica_lag_time_max_ms * 3 / 2);
        let now = Instant::now();
        let mut inner = self.inner.write();
        let lagging: Vec<BrokerId> = inner
            .isr
            .iter()
            .copied()
            .filter(|replica| {
                if inner.role != ReplicaRole::Leader {
                    return false;
                }
                if *replica == self.local_broker_id {
                    return false;
                }
                match inner.follower_states.get(replica) {
                    Some(state) => match state.last_caught_up {
                        Some(last) => now.duration_since(last) > threshold,
                        None => true,
                    },
                    // never fetched: treated as lagging immediately.
                    None => true,
                }
            })
            .collect();

        if !lagging.is_empty() {
            inner.isr.retain(|r| !lagging.contains(r));
        }
        lagging
    }

    /// Expands the ISR once a follower's fetch position reaches the leader LEO.
    pub fn maybe_expand_isr(&self, replica: BrokerId) -> bool {
        let leo = self.log_end_offset();
        let mut inner = self.inner.write();
        if inner.isr.contains(&replica) {
            return false;
        }
        if !inner.assigned_replicas.contains(&replica) {
            return false;
        }
        let caught_up = inner
            .follower_states
            .get(&replica)
            .map(|s| s.log_end_offset >= leo)
            .unwrap_or(false);
        if caught_up {
            inner.isr.push(replica);
            true
        } else {
            false
        }
    }

    /// Proposes an ISR change to the metadata store with optimistic
    /// concurrency; on conflict, re-reads state and retries at most once.
    pub fn propose_isr_change(&self, store: &dyn MetadataStore) -> Result<(), ReplicaError> {
        let isr = self.inner.read().isr.clone();
        let mut attempts = 0;
        loop {
            let current = store
                .get_partition_epoch(&self.topic, self.partition_id)
                .map_err(|e| ReplicaError::UnknownServerError {
                    context: "propose_isr_change".to_string(),
                    reason: e.to_string(),
                })?;
            for replica in &isr {
                let _ = store.update_in_sync_replica(&self.topic, self.partition_id, *replica, true);
            }
            let next = Epoch(current.0 + 1);
            match store.compare_and_set_epoch(&self.topic, self.partition_id, current, next) {
                Ok(true) => return Ok(()),
                Ok(false) if attempts == 0 => {
                    attempts += 1;
                    continue;
                }
                Ok(false) => {
                    return Err(ReplicaError::UnknownServerError {
                        context: "propose_isr_change".to_string(),
                        reason: "epoch CAS conflict persisted after retry".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ReplicaError::UnknownServerError {
                        context: "propose_isr_change".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Reads from the local log and reports the usual fetch metadata. If the
    /// fetcher is a follower, updates its tracked fetch position.
    #[instrument(level = "debug", skip(self), fields(topic = %self.topic, partition = %self.partition_id))]
    pub fn fetch_records(
        &self,
        fetch_offset: u64,
        max_bytes: usize,
        follower: Option<BrokerId>,
        current_leader_epoch: Option<Epoch>,
    ) -> Result<FetchPartitionResult, ReplicaError> {
        if self.is_offline() {
            return Err(ReplicaError::KafkaStorageError {
                topic: self.topic.clone(),
                partition: self.partition_id.as_u32(),
                reason: "log directory offline".to_string(),
            });
        }
        if let Some(epoch) = current_leader_epoch {
            self.check_epoch(epoch)?;
        }

        let leo = self.log_end_offset();
        let log_start = self.log_start_offset();
        if fetch_offset > leo || fetch_offset < log_start {
            return Err(ReplicaError::OffsetOutOfRange {
                topic: self.topic.clone(),
                partition: self.partition_id.as_u32(),
                requested: fetch_offset,
            });
        }

        let records: Vec<RecordWithOffset> = self
            .log
            .read()
            .read_from_partition(self.partition_id, fetch_offset, Some(max_bytes))
            .map_err(|e| ReplicaError::KafkaStorageError {
                topic: self.topic.clone(),
                partition: self.partition_id.as_u32(),
                reason: e.to_string(),
            })?;

        if let Some(replica) = follower {
            let new_leo = records
                .last()
                .map(|r| r.offset + 1)
                .unwrap_or(fetch_offset);
            self.update_follower_fetch_state(replica, new_leo);
            self.maybe_expand_isr(replica);
            self.recompute_high_watermark();
        }

        let hw = self.high_watermark();
        Ok(FetchPartitionResult {
            high_watermark: hw,
            log_start_offset: log_start,
            log_end_offset: leo,
            records,
            last_stable_offset: hw,
            diverging_epoch: None,
            preferred_read_replica: None,
        })
    }

    /// Truncates the logical log head up to `offset`, reporting the new
    /// low-watermark. The underlying log collaborator (out of scope here)
    /// keeps the bytes; `log_start_offset` is the logical marker consumers
    /// and `fetch_records`/`fetch_offset_for_timestamp` respect.
    #[instrument(level = "info", skip(self), fields(topic = %self.topic, partition = %self.partition_id))]
    pub fn delete_records_on_leader(&self, offset: u64) -> Result<u64, ReplicaError> {
        let mut inner = self.inner.write();
        if inner.role != ReplicaRole::Leader {
            return Err(ReplicaError::NotLeaderOrFollower {
                topic: self.topic.clone(),
                partition: self.partition_id.as_u32(),
            });
        }
        let new_low_watermark = offset.max(inner.log_start_offset);
        inner.log_start_offset = new_low_watermark;
        Ok(new_low_watermark)
    }

    /// Epoch-based offset lookup for follower truncation. Without per-record
    /// epoch tracking in the underlying log, this degrades to reporting the
    /// current leader epoch against the current LEO, which is correct for a
    /// replica that has never seen a leader change mid-log.
    pub fn last_offset_for_leader_epoch(&self, requested_epoch: Epoch) -> EpochEndOffset {
        let current_epoch = self.leader_epoch();
        if requested_epoch >= current_epoch {
            EpochEndOffset {
                leader_epoch: current_epoch,
                end_offset: self.log_end_offset(),
            }
        } else {
            EpochEndOffset {
                leader_epoch: requested_epoch,
                end_offset: self.log_start_offset(),
            }
        }
    }
}

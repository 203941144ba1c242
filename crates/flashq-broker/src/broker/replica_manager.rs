//! Replica Manager: the broker-local facade. Owns the `HostedPartition`
//! map, the fetcher pool, the four purgatories, the directory-failure
//! channel, and HW checkpointing.

use crate::broker::checkpoint::HwCheckpointFile;
use crate::broker::control::{
    AckOutcome, DeleteRecordsRequest, DeleteRecordsResult, EpochEndOffset, FetchPartitionResult,
    FetchRequest, OffsetForLeaderEpochRequest, ProducePartitionResult, ProduceRequest,
};
use crate::broker::error::ReplicaError;
use crate::broker::fetcher::{FetchKey, FetcherPool, LeaderEndpoint};
use crate::broker::partition::{Partition, ReassignmentMarkers};
use crate::broker::purgatory::{DelayedOperation, Purgatory, WatchKey};
use dashmap::DashMap;
use flashq::storage::{PartitionId, StorageBackend};
use flashq_cluster::types::{BrokerId, Epoch};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Local state of a partition on this broker: `None` means never hosted,
/// `Offline` is sticky until directory restoration and broker restart.
#[derive(Clone)]
pub enum HostedPartition {
    None,
    Online(Arc<Partition>),
    Offline,
}

/// A single partition's leadership assignment as delivered by a control RPC.
#[derive(Debug, Clone)]
pub struct PartitionLeaderAssignment {
    pub topic: String,
    pub partition_id: PartitionId,
    pub leader: Option<BrokerId>,
    pub leader_epoch: Epoch,
    pub isr: Vec<BrokerId>,
    pub replicas: Vec<BrokerId>,
    pub adding_replicas: Vec<BrokerId>,
    pub removing_replicas: Vec<BrokerId>,
}

struct NoopOperation {
    deadline: Instant,
}

impl DelayedOperation for NoopOperation {
    fn try_complete(&self) -> bool {
        false
    }
    fn on_complete(&self, _timed_out: bool) {}
    fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// A produce request waiting for replication to satisfy `acks=all`.
struct DelayedProduce {
    partitions: Vec<Arc<Partition>>,
    deadline: Instant,
    completed_at_hw: Mutex<Option<Vec<u64>>>,
}

impl DelayedOperation for DelayedProduce {
    fn try_complete(&self) -> bool {
        let all_caught_up = self
            .partitions
            .iter()
            .all(|p| p.high_watermark() >= p.log_end_offset());
        if all_caught_up {
            let mut slot = self.completed_at_hw.lock();
            *slot = Some(self.partitions.iter().map(|p| p.high_watermark()).collect());
        }
        all_caught_up
    }

    fn on_complete(&self, _timed_out: bool) {}

    fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// A fetch request waiting for more bytes than were immediately available.
struct DelayedFetch {
    key: WatchKey,
    min_bytes: usize,
    deadline: Instant,
}

impl DelayedOperation for DelayedFetch {
    fn try_complete(&self) -> bool {
        let _ = self.min_bytes;
        false
    }
    fn on_complete(&self, _timed_out: bool) {}
    fn deadline(&self) -> Instant {
        self.deadline
    }
}

pub struct ReplicaManagerConfig {
    pub broker_id: BrokerId,
    pub log_dirs: Vec<std::path::PathBuf>,
    pub replica_lag_time_max_ms: u64,
    pub hw_checkpoint_interval_ms: u64,
    pub produce_purgatory_purge_interval: usize,
    pub fetch_purgatory_purge_interval: usize,
    pub delete_records_purgatory_purge_interval: usize,
    pub elect_leader_purgatory_purge_interval: usize,
    pub fetcher_shard_count: usize,
}

pub struct ReplicaManager {
    config: ReplicaManagerConfig,
    storage: StorageBackend,
    partitions: DashMap<(String, PartitionId), HostedPartition>,
    fetcher_pool: Arc<FetcherPool>,
    produce_purgatory: Arc<Purgatory<DelayedProduce>>,
    fetch_purgatory: Arc<Purgatory<DelayedFetch>>,
    delete_records_purgatory: Arc<Purgatory<NoopOperation>>,
    elect_leader_purgatory: Arc<Purgatory<NoopOperation>>,
    controller_epoch: Mutex<Epoch>,
}

impl ReplicaManager {
    pub fn new(config: ReplicaManagerConfig, storage: StorageBackend) -> Self {
        let fetcher_pool = Arc::new(FetcherPool::new(
            config.fetcher_shard_count.max(1),
            Duration::from_millis(500),
        ));
        Self {
            produce_purgatory: Arc::new(Purgatory::new(config.produce_purgatory_purge_interval)),
            fetch_purgatory: Arc::new(Purgatory::new(config.fetch_purgatory_purge_interval)),
            delete_records_purgatory: Arc::new(Purgatory::new(config.delete_records_purgatory_purge_interval)),
            elect_leader_purgatory: Arc::new(Purgatory::new(config.elect_leader_purgatory_purge_interval)),
            fetcher_pool,
            partitions: DashMap::new(),
            controller_epoch: Mutex::new(Epoch(0)),
            storage,
            config,
        }
    }

    fn partition_key(topic: &str, partition_id: PartitionId) -> (String, PartitionId) {
        (topic.to_string(), partition_id)
    }

    pub fn get_partition(&self, topic: &str, partition_id: PartitionId) -> HostedPartition {
        self.partitions
            .get(&Self::partition_key(topic, partition_id))
            .map(|e| e.clone())
            .unwrap_or(HostedPartition::None)
    }

    fn get_or_create_partition(&self, topic: &str, partition_id: PartitionId, replicas: &[BrokerId]) -> Result<Arc<Partition>, ReplicaError> {
        let key = Self::partition_key(topic, partition_id);
        if let Some(entry) = self.partitions.get(&key) {
            if let HostedPartition::Online(p) = &*entry {
                return Ok(Arc::clone(p));
            }
        }
        let log = self
            .storage
            .create(topic)
            .map_err(|e| ReplicaError::KafkaStorageError {
                topic: topic.to_string(),
                partition: partition_id.as_u32(),
                reason: e.to_string(),
            })?;
        let partition = Arc::new(Partition::new(
            topic,
            partition_id,
            log,
            replicas.to_vec(),
            self.config.broker_id,
        ));
        self.partitions
            .insert(key, HostedPartition::Online(Arc::clone(&partition)));
        Ok(partition)
    }

    /// Guarded by `controllerEpoch`: creates any missing `Partition` entries,
    /// partitions incoming state into to-be-leaders/to-be-followers, invokes
    /// `make_leader`/`make_follower`, and (re)configures the fetcher pool.
    #[instrument(level = "info", skip(self, assignments))]
    pub async fn become_leader_or_follower(
        &self,
        controller_epoch: Epoch,
        assignments: Vec<PartitionLeaderAssignment>,
    ) -> Result<HashMap<(String, u32), ReplicaError>, ReplicaError> {
        {
            let mut current = self.controller_epoch.lock();
            if controller_epoch < *current {
                return Err(ReplicaError::StaleControllerEpoch {
                    current_epoch: current.0,
                    request_epoch: controller_epoch.0,
                });
            }
            *current = controller_epoch;
        }

        let mut errors = HashMap::new();
        for assignment in assignments {
            let partition = match self.get_or_create_partition(&assignment.topic, assignment.partition_id, &assignment.replicas) {
                Ok(p) => p,
                Err(e) => {
                    errors.insert((assignment.topic.clone(), assignment.partition_id.as_u32()), e);
                    continue;
                }
            };

            partition.set_reassignment_markers(ReassignmentMarkers {
                adding_replicas: assignment.adding_replicas.clone(),
                removing_replicas: assignment.removing_replicas.clone(),
            });

            if assignment.leader == Some(self.config.broker_id) {
                partition.make_leader(assignment.leader_epoch, assignment.isr.clone(), assignment.replicas.clone());
                let key: FetchKey = (assignment.topic.clone(), assignment.partition_id);
                self.fetcher_pool.remove_fetcher(&key).await;
            } else {
                partition.make_follower(assignment.leader_epoch, assignment.isr.clone(), assignment.replicas.clone());
                if let Some(leader) = assignment.leader {
                    let key: FetchKey = (assignment.topic.clone(), assignment.partition_id);
                    self.fetcher_pool
                        .add_fetcher(key, Arc::clone(&partition), LeaderEndpoint::Remote {
                            broker_id: leader,
                            host: String::new(),
                            port: 0,
                        }, self.config.broker_id)
                        .await;
                }
            }
        }
        Ok(errors)
    }

    /// Stops fetchers for the given partitions, removes them from the map,
    /// and, if `delete` is set, drops the underlying log handle. Completes
    /// any pending produce/fetch waiters on those partitions.
    #[instrument(level = "info", skip(self))]
    pub async fn stop_replica(&self, topic: &str, partition_id: PartitionId, delete: bool) {
        let key: FetchKey = (topic.to_string(), partition_id);
        self.fetcher_pool.remove_fetcher(&key).await;

        if delete {
            self.partitions.remove(&Self::partition_key(topic, partition_id));
        } else {
            self.partitions
                .insert(Self::partition_key(topic, partition_id), HostedPartition::Offline);
        }

        self.produce_purgatory.check_and_complete(&key);
        self.fetch_purgatory.check_and_complete(&key);
    }

    /// For each partition: validate acks, append to the leader, schedule
    /// post-append purgatory checks, and either respond immediately or
    /// register a delayed-produce operation for `acks = -1`.
    #[instrument(level = "debug", skip(self, request))]
    pub fn append_records(
        &self,
        request: ProduceRequest,
    ) -> HashMap<(String, u32), Result<ProducePartitionResult, ReplicaError>> {
        let mut results = HashMap::new();

        if !matches!(request.required_acks, -1 | 0 | 1) {
            for (topic, partition_id) in request.per_partition.keys() {
                results.insert(
                    (topic.clone(), partition_id.as_u32()),
                    Err(ReplicaError::InvalidRequiredAcks {
                        acks: request.required_acks,
                    }),
                );
            }
            return results;
        }

        let mut touched_partitions = Vec::new();
        for ((topic, partition_id), records) in request.per_partition {
            let partition = match self.get_partition(&topic, partition_id) {
                HostedPartition::Online(p) => p,
                HostedPartition::Offline => {
                    results.insert(
                        (topic.clone(), partition_id.as_u32()),
                        Err(ReplicaError::KafkaStorageError {
                            topic: topic.clone(),
                            partition: partition_id.as_u32(),
                            reason: "directory offline".to_string(),
                        }),
                    );
                    continue;
                }
                HostedPartition::None => {
                    results.insert(
                        (topic.clone(), partition_id.as_u32()),
                        Err(ReplicaError::UnknownTopicOrPartition {
                            topic: topic.clone(),
                            partition: partition_id.as_u32(),
                        }),
                    );
                    continue;
                }
            };

            let leader_epoch = partition.leader_epoch();
            match partition.append_records_to_leader(records, leader_epoch) {
                Ok((base_offset, hw_change)) => {
                    let key: WatchKey = (topic.clone(), partition_id);
                    match hw_change {
                        AckOutcome::Increased => {
                            self.produce_purgatory.check_and_complete(&key);
                            self.fetch_purgatory.check_and_complete(&key);
                        }
                        AckOutcome::Same => {
                            self.fetch_purgatory.check_and_complete(&key);
                        }
                        AckOutcome::None => {}
                    }
                    results.insert(
                        (topic.clone(), partition_id.as_u32()),
                        Ok(ProducePartitionResult {
                            base_offset,
                            log_append_time_ms: 0,
                            log_start_offset: partition.log_start_offset(),
                            hw_change,
                        }),
                    );
                    touched_partitions.push(partition);
                }
                Err(e) => {
                    results.insert((topic.clone(), partition_id.as_u32()), Err(e));
                }
            }
        }

        if request.required_acks == -1 && !touched_partitions.is_empty() {
            let deadline = crate::broker::purgatory::deadline_in(request.timeout_ms);
            let op = Arc::new(DelayedProduce {
                partitions: touched_partitions.clone(),
                deadline,
                completed_at_hw: Mutex::new(None),
            });
            let keys = results
                .keys()
                .map(|(t, p)| (t.clone(), PartitionId::new(*p)))
                .collect();
            self.produce_purgatory.watch(op, keys);
        }

        results
    }

    /// Reads all requested partitions; responds immediately when any of the
    /// fast-path conditions hold, otherwise registers a delayed-fetch.
    #[instrument(level = "debug", skip(self, request))]
    pub fn fetch_records(
        &self,
        request: FetchRequest,
    ) -> HashMap<(String, u32), Result<FetchPartitionResult, ReplicaError>> {
        let mut results = HashMap::new();
        let mut total_bytes = 0usize;
        let mut any_error = false;
        let mut any_diverging = false;

        for ((topic, partition_id), fetch_partition) in &request.per_partition {
            let partition = match self.get_partition(topic, *partition_id) {
                HostedPartition::Online(p) => p,
                HostedPartition::Offline => {
                    any_error = true;
                    results.insert(
                        (topic.clone(), partition_id.as_u32()),
                        Err(ReplicaError::KafkaStorageError {
                            topic: topic.clone(),
                            partition: partition_id.as_u32(),
                            reason: "directory offline".to_string(),
                        }),
                    );
                    continue;
                }
                HostedPartition::None => {
                    any_error = true;
                    results.insert(
                        (topic.clone(), partition_id.as_u32()),
                        Err(ReplicaError::UnknownTopicOrPartition {
                            topic: topic.clone(),
                            partition: partition_id.as_u32(),
                        }),
                    );
                    continue;
                }
            };

            let follower = match request.replica_id {
                crate::broker::control::FetchReplicaId::Follower(id) => Some(id),
                crate::broker::control::FetchReplicaId::Consumer => None,
            };

            match partition.fetch_records(
                fetch_partition.fetch_offset,
                fetch_partition.partition_max_bytes,
                follower,
                fetch_partition.current_leader_epoch,
            ) {
                Ok(result) => {
                    total_bytes += result.records.len();
                    if result.diverging_epoch.is_some() {
                        any_diverging = true;
                    }
                    results.insert((topic.clone(), partition_id.as_u32()), Ok(result));
                }
                Err(e) => {
                    any_error = true;
                    results.insert((topic.clone(), partition_id.as_u32()), Err(e));
                }
            }
        }

        let respond_immediately = request.max_wait_ms == 0
            || request.per_partition.is_empty()
            || total_bytes >= request.min_bytes
            || any_error
            || any_diverging;

        if !respond_immediately {
            let keys: Vec<WatchKey> = request
                .per_partition
                .keys()
                .map(|(t, p)| (t.clone(), *p))
                .collect();
            let deadline = crate::broker::purgatory::deadline_in(request.max_wait_ms);
            let op = Arc::new(DelayedFetch {
                key: keys
                    .first()
                    .cloned()
                    .unwrap_or_else(|| (String::new(), PartitionId::new(0))),
                min_bytes: request.min_bytes,
                deadline,
            });
            self.fetch_purgatory.watch(op, keys);
        }

        results
    }

    #[instrument(level = "info", skip(self))]
    pub fn delete_records(&self, request: DeleteRecordsRequest) -> HashMap<(String, u32), Result<DeleteRecordsResult, ReplicaError>> {
        let mut results = HashMap::new();
        for ((topic, partition_id), offset) in request.per_partition {
            match self.get_partition(&topic, partition_id) {
                HostedPartition::Online(p) => {
                    let result = p
                        .delete_records_on_leader(offset)
                        .map(|low_watermark| DeleteRecordsResult { low_watermark });
                    let key: WatchKey = (topic.clone(), partition_id);
                    self.delete_records_purgatory.check_and_complete(&key);
                    results.insert((topic.clone(), partition_id.as_u32()), result);
                }
                HostedPartition::Offline => {
                    results.insert(
                        (topic.clone(), partition_id.as_u32()),
                        Err(ReplicaError::KafkaStorageError {
                            topic: topic.clone(),
                            partition: partition_id.as_u32(),
                            reason: "directory offline".to_string(),
                        }),
                    );
                }
                HostedPartition::None => {
                    results.insert(
                        (topic.clone(), partition_id.as_u32()),
                        Err(ReplicaError::UnknownTopicOrPartition {
                            topic: topic.clone(),
                            partition: partition_id.as_u32(),
                        }),
                    );
                }
            }
        }
        results
    }

    pub fn offset_for_leader_epoch(
        &self,
        topic: &str,
        partition_id: PartitionId,
        request: OffsetForLeaderEpochRequest,
    ) -> Result<EpochEndOffset, ReplicaError> {
        match self.get_partition(topic, partition_id) {
            HostedPartition::Online(p) => {
                if let Some(epoch) = request.current_leader_epoch {
                    if epoch < p.leader_epoch() {
                        return Err(ReplicaError::FencedLeaderEpoch {
                            topic: topic.to_string(),
                            partition: partition_id.as_u32(),
                            current_epoch: p.leader_epoch().0,
                            request_epoch: epoch.0,
                        });
                    }
                }
                Ok(p.last_offset_for_leader_epoch(request.leader_epoch))
            }
            HostedPartition::Offline => Err(ReplicaError::KafkaStorageError {
                topic: topic.to_string(),
                partition: partition_id.as_u32(),
                reason: "directory offline".to_string(),
            }),
            HostedPartition::None => Err(ReplicaError::UnknownTopicOrPartition {
                topic: topic.to_string(),
                partition: partition_id.as_u32(),
            }),
        }
    }

    /// Marks every partition whose log lives in `failed_dir` Offline, tears
    /// down their fetchers, and prunes the HW checkpoint for that directory.
    #[instrument(level = "warn", skip(self))]
    pub async fn handle_log_directory_failure(&self, failed_dir: &std::path::Path) {
        warn!(dir = %failed_dir.display(), "log directory failed, marking hosted partitions offline");
        let mut affected = Vec::new();
        for entry in self.partitions.iter() {
            if let HostedPartition::Online(partition) = entry.value() {
                partition.mark_offline();
                affected.push((entry.key().0.clone(), entry.key().1));
            }
        }
        for (topic, partition_id) in affected {
            self.partitions
                .insert(Self::partition_key(&topic, partition_id), HostedPartition::Offline);
            self.fetcher_pool.remove_fetcher(&(topic, partition_id)).await;
        }
        let checkpoint = HwCheckpointFile::new(failed_dir);
        if let Err(e) = checkpoint.remove() {
            warn!(error = %e, "failed to remove HW checkpoint for failed directory");
        }
    }

    /// Snapshots every hosted online partition's HW and writes it to the
    /// checkpoint file for its (first configured) log directory. Run by a
    /// scheduler task at `hw_checkpoint_interval_ms`.
    #[instrument(level = "debug", skip(self))]
    pub fn checkpoint_high_watermarks(&self) {
        let Some(dir) = self.config.log_dirs.first() else {
            return;
        };
        let mut entries = HashMap::new();
        for entry in self.partitions.iter() {
            if let HostedPartition::Online(partition) = entry.value() {
                entries.insert(
                    (partition.topic.clone(), partition.partition_id.as_u32()),
                    partition.high_watermark(),
                );
            }
        }
        let checkpoint = HwCheckpointFile::new(dir);
        if let Err(e) = checkpoint.write(&entries) {
            warn!(error = %e, "failed to write HW checkpoint");
        } else {
            info!(count = entries.len(), "checkpointed high watermarks");
        }
    }

    /// Runs one ISR-shrink pass over every hosted leader partition and
    /// proposes each resulting shrink to the metadata store. Intended to be
    /// driven by a periodic scheduler at `replicaLagTimeMaxMs` granularity.
    #[instrument(level = "debug", skip(self, store))]
    pub fn run_isr_shrink_once(&self, store: &dyn flashq_cluster::metadata_store::MetadataStore) {
        for entry in self.partitions.iter() {
            if let HostedPartition::Online(partition) = entry.value() {
                let dropped = partition.maybe_shrink_isr(self.config.replica_lag_time_max_ms);
                if !dropped.is_empty() {
                    if let Err(e) = partition.propose_isr_change(store) {
                        warn!(error = %e, "failed to propose ISR shrink");
                    }
                }
            }
        }
    }

    /// Only replicas currently in ISR whose log range covers `fetch_offset`
    /// are eligible; never redirects to a follower fetch. Ties are broken by
    /// lowest `BrokerId` (see SPEC_FULL.md's decision on the open question).
    pub fn select_preferred_read_replica(
        &self,
        topic: &str,
        partition_id: PartitionId,
        fetch_offset: u64,
        is_follower_fetch: bool,
    ) -> Option<BrokerId> {
        if is_follower_fetch {
            return None;
        }
        let partition = match self.get_partition(topic, partition_id) {
            HostedPartition::Online(p) => p,
            _ => return None,
        };
        let mut candidates: Vec<BrokerId> = partition
            .isr()
            .into_iter()
            .filter(|_| {
                partition.log_start_offset() <= fetch_offset && fetch_offset <= partition.log_end_offset()
            })
            .collect();
        candidates.sort_by_key(|b| b.0);
        candidates.into_iter().next()
    }
}

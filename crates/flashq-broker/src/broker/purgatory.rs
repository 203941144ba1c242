//! Delayed-operation purgatory: holds operations that cannot complete
//! immediately and completes them on a trigger or on timeout.

use dashmap::DashMap;
use flashq::storage::PartitionId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

pub type WatchKey = (String, PartitionId);

/// An operation that may need to wait before it can complete.
///
/// `try_complete` is a pure function of visible state: it must not block and
/// must not panic on missing state, since the purgatory treats a panic the
/// same as "unsatisfied" only at the call site that catches it, never inside
/// the trait itself.
pub trait DelayedOperation: Send + Sync {
    /// Re-evaluate whether this operation can complete now. Returning `true`
    /// means the operation completed as a side effect of this call.
    fn try_complete(&self) -> bool;

    /// Invoked exactly once, either because `try_complete` returned true or
    /// because the deadline elapsed first. `timed_out` distinguishes the two
    /// so the callback can report partial results on expiry.
    fn on_complete(&self, timed_out: bool);

    fn deadline(&self) -> Instant;
}

struct Watched<T> {
    op: Arc<T>,
    completed: Arc<AtomicBool>,
}

/// Indexed map of pending delayed operations, keyed by partition, with timer-driven expiry.
///
/// Completion is idempotent and mutually exclusive with timeout: both paths
/// race on the same `AtomicBool`, and only the winner invokes `on_complete`.
pub struct Purgatory<T: DelayedOperation + 'static> {
    watched: DashMap<WatchKey, Vec<Watched<T>>>,
    purge_interval: usize,
    completed_since_purge: Mutex<usize>,
}

impl<T: DelayedOperation + 'static> Purgatory<T> {
    pub fn new(purge_interval: usize) -> Self {
        Self {
            watched: DashMap::new(),
            purge_interval,
            completed_since_purge: Mutex::new(0),
        }
    }

    /// Attempt completion once synchronously; if unsatisfied, register under
    /// every key and arm a timer for the operation's deadline.
    #[instrument(level = "debug", skip_all, fields(keys = keys.len()))]
    pub fn watch(self: &Arc<Self>, op: Arc<T>, keys: Vec<WatchKey>) {
        if self.try_complete_now(&op) {
            return;
        }

        let completed = Arc::new(AtomicBool::new(false));
        for key in &keys {
            self.watched
                .entry(key.clone())
                .or_default()
                .push(Watched {
                    op: Arc::clone(&op),
                    completed: Arc::clone(&completed),
                });
        }

        let deadline = op.deadline();
        let purgatory = Arc::clone(self);
        tokio::spawn(async move {
            let now = Instant::now();
            if deadline > now {
                tokio::time::sleep(deadline - now).await;
            }
            if completed.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                op.on_complete(true);
                purgatory.note_completion();
            }
        });
    }

    fn try_complete_now(&self, op: &Arc<T>) -> bool {
        if op.try_complete() {
            op.on_complete(false);
            self.note_completion();
            true
        } else {
            false
        }
    }

    /// Re-evaluate every operation registered under `key`; operations that now
    /// satisfy their predicate are completed exactly once.
    #[instrument(level = "debug", skip(self))]
    pub fn check_and_complete(&self, key: &WatchKey) -> usize {
        let mut completed_count = 0;
        if let Some(mut entry) = self.watched.get_mut(key) {
            entry.retain(|watched| {
                if watched.completed.load(Ordering::SeqCst) {
                    return false;
                }
                if watched.op.try_complete() {
                    if watched
                        .completed
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        watched.op.on_complete(false);
                        completed_count += 1;
                    }
                    false
                } else {
                    true
                }
            });
        }
        if completed_count > 0 {
            for _ in 0..completed_count {
                self.note_completion();
            }
        }
        debug!(completed_count, "purgatory check_and_complete finished");
        completed_count
    }

    fn note_completion(&self) {
        let mut count = self.completed_since_purge.lock();
        *count += 1;
        if *count >= self.purge_interval {
            *count = 0;
            self.purge_tombstones();
        }
    }

    /// Drop entries whose operation has already completed; called once the
    /// completed count crosses `purge_interval` so the watch lists don't grow
    /// unbounded under a steady stream of producing partitions.
    fn purge_tombstones(&self) {
        let mut purged = 0usize;
        self.watched.retain(|_key, entries| {
            let before = entries.len();
            entries.retain(|w| !w.completed.load(Ordering::SeqCst));
            purged += before - entries.len();
            !entries.is_empty()
        });
        if purged > 0 {
            warn!(purged, "purged completed purgatory entries");
        }
    }

    pub fn watched_count(&self, key: &WatchKey) -> usize {
        self.watched.get(key).map(|e| e.len()).unwrap_or(0)
    }
}

/// Helper for building a deadline `purge_interval` milliseconds from now.
pub fn deadline_in(millis: u64) -> Instant {
    Instant::now() + Duration::from_millis(millis)
}

use crate::storage::file::{FileConsumerGroup, FileTopicLog, SyncMode};
use crate::storage::{ConsumerGroup, InMemoryConsumerGroup, InMemoryTopicLog, TopicLog};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// Picks the concrete `TopicLog`/`ConsumerGroup` implementation a single node uses.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    Memory {
        batch_bytes: usize,
    },
    File {
        sync_mode: SyncMode,
        data_dir: std::path::PathBuf,
        segment_size_bytes: u64,
        batch_bytes: usize,
    },
}

impl StorageBackend {
    pub fn new_memory() -> Self {
        StorageBackend::Memory {
            batch_bytes: crate::storage::batching_heuristics::default_batch_bytes(),
        }
    }

    pub fn new_file<P: AsRef<Path>>(sync_mode: SyncMode, data_dir: P) -> Self {
        const DEFAULT_SEGMENT_SIZE: u64 = 1024 * 1024 * 1024;
        StorageBackend::File {
            sync_mode,
            data_dir: data_dir.as_ref().to_path_buf(),
            segment_size_bytes: DEFAULT_SEGMENT_SIZE,
            batch_bytes: crate::storage::batching_heuristics::default_batch_bytes(),
        }
    }

    pub fn create(&self, topic: &str) -> Result<Arc<RwLock<dyn TopicLog + Send + Sync>>, std::io::Error> {
        match self {
            StorageBackend::Memory { batch_bytes } => Ok(Arc::new(RwLock::new(
                InMemoryTopicLog::new_with_batch_bytes(*batch_bytes),
            ))),
            StorageBackend::File {
                sync_mode,
                data_dir,
                segment_size_bytes,
                batch_bytes,
            } => {
                let file_log = FileTopicLog::new_with_batch_bytes(
                    topic,
                    *sync_mode,
                    data_dir,
                    *segment_size_bytes,
                    *batch_bytes,
                )?;
                Ok(Arc::new(RwLock::new(file_log)))
            }
        }
    }

    pub fn create_consumer_group(
        &self,
        group_id: &str,
    ) -> Result<Arc<RwLock<dyn ConsumerGroup>>, std::io::Error> {
        match self {
            StorageBackend::Memory { .. } => Ok(Arc::new(RwLock::new(InMemoryConsumerGroup::new(
                group_id.to_string(),
            )))),
            StorageBackend::File {
                sync_mode,
                data_dir,
                ..
            } => {
                let consumer_group = FileConsumerGroup::new(group_id, *sync_mode, data_dir)?;
                Ok(Arc::new(RwLock::new(consumer_group)))
            }
        }
    }
}

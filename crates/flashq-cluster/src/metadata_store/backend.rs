//! Metadata store backend implementations and configuration.

use crate::{
    ClusterError,
    manifest::types::ClusterManifest,
    metadata_store::{memory::InMemoryMetadataStore, r#trait::MetadataStore},
};
use std::sync::{Arc, RwLock};

/// Backend storage configuration for cluster metadata.
#[derive(Debug)]
pub enum MetadataBackend {
    /// In-memory storage backend.
    ///
    /// Fast but ephemeral - all metadata is lost on restart.
    /// Suitable for development, testing, and single-node deployments.
    Memory,
}

impl MetadataBackend {
    /// Create a new in-memory metadata backend.
    pub fn new_memory() -> Self {
        MetadataBackend::Memory
    }

    /// Create a metadata store instance from this backend configuration.
    pub fn create(&self) -> Result<Arc<RwLock<dyn MetadataStore + Send + Sync>>, ClusterError> {
        match self {
            MetadataBackend::Memory => Ok(Arc::new(RwLock::new(InMemoryMetadataStore::new()))),
        }
    }

    /// Create a metadata store instance initialized with the given manifest.
    pub fn create_with_manifest(
        &self,
        manifest: ClusterManifest,
    ) -> Result<Arc<RwLock<dyn MetadataStore + Send + Sync>>, ClusterError> {
        match self {
            MetadataBackend::Memory => {
                let store = InMemoryMetadataStore::new_with_manifest(manifest)?;
                Ok(Arc::new(RwLock::new(store)))
            }
        }
    }
}

impl Default for MetadataBackend {
    fn default() -> Self {
        Self::new_memory()
    }
}

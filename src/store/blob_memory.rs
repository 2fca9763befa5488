//! In-memory blob store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{KpiError, Missing, Result};
use crate::model::{Blob, BlobId, BlobMetadata};

use super::{BlobStore, Failpoint, Faults};

/// Blob store held in a `HashMap`
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<BlobId, Blob>>>,
    faults: Faults,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failpoints consulted by this store
    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: BlobId) -> bool {
        self.blobs.read().contains_key(&id)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: Bytes, metadata: BlobMetadata) -> Result<BlobId> {
        self.faults.check(Failpoint::BlobPut).await?;

        let id = BlobId::new();
        self.blobs.write().insert(id, Blob { id, metadata, data });
        Ok(id)
    }

    async fn get(&self, id: BlobId) -> Result<Blob> {
        self.faults.check(Failpoint::BlobGet).await?;

        self.blobs
            .read()
            .get(&id)
            .cloned()
            .ok_or(KpiError::NotFound(Missing::Blob(id)))
    }

    async fn delete(&self, id: BlobId) -> Result<()> {
        self.faults.check(Failpoint::BlobDelete).await?;

        match self.blobs.write().remove(&id) {
            Some(_) => Ok(()),
            None => Err(KpiError::NotFound(Missing::Blob(id))),
        }
    }
}

//! Content-addressed ciphertext storage.

use crate::error::{PipelineError, PipelineResult};
use crate::types::{StoreOptions, StoredBlob};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Stores opaque ciphertext and returns it by id. Nothing here sees plaintext.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bytes: Vec<u8>, options: StoreOptions) -> PipelineResult<StoredBlob>;

    async fn get(&self, blob_id: &str) -> PipelineResult<Vec<u8>>;
}

/// In-process blob store keyed by content hash.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the store being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Overwrites stored bytes in place (for tamper tests).
    pub async fn replace(&self, blob_id: &str, bytes: Vec<u8>) {
        self.blobs.write().await.insert(blob_id.to_string(), bytes);
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    fn check_online(&self) -> PipelineResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PipelineError::NetworkUnavailable(
                "blob store offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>, _options: StoreOptions) -> PipelineResult<StoredBlob> {
        self.check_online()?;
        let blob_id = hex::encode(Sha256::digest(&bytes));
        let mut blobs = self.blobs.write().await;
        let newly_created = !blobs.contains_key(&blob_id);
        blobs.insert(blob_id.clone(), bytes);
        debug!("stored blob {blob_id} (new: {newly_created})");

        Ok(StoredBlob {
            object_id: newly_created.then(|| format!("0x{}", &blob_id[..40])),
            blob_id,
        })
    }

    async fn get(&self, blob_id: &str) -> PipelineResult<Vec<u8>> {
        self.check_online()?;
        self.blobs
            .read()
            .await
            .get(blob_id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("blob {blob_id}")))
    }
}

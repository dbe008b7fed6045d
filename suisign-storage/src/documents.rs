//! Per-participant document projections over a [`KvStore`].
//!
//! Key layout:
//! - `docs/<owner>`: JSON list of [`DocumentRecord`], newest first
//! - `docs:last_created`: most recently created record
//! - `blobs/<blob id>`: [`StoredBlobMeta`]
//!
//! The cache is advisory; the ledger stays authoritative. An entry that no
//! longer parses is logged and treated as empty rather than failing reads.

use crate::error::StorageResult;
use crate::kv::KvStore;
use crate::types::{DocumentRecord, DocumentStatus, StoredBlobMeta};
use std::sync::Arc;
use suisign_crypto::Address;
use tracing::{debug, warn};

const DOCS_PREFIX: &str = "docs/";
const LAST_CREATED_KEY: &str = "docs:last_created";
const BLOBS_PREFIX: &str = "blobs/";

#[derive(Clone)]
pub struct DocumentCache {
    store: Arc<dyn KvStore>,
}

impl DocumentCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn docs_key(owner: &Address) -> String {
        format!("{DOCS_PREFIX}{owner}")
    }

    /// Loads every record visible to `owner`, newest first.
    pub fn load_docs(&self, owner: &Address) -> StorageResult<Vec<DocumentRecord>> {
        let Some(raw) = self.store.get(&Self::docs_key(owner))? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<DocumentRecord>>(&raw) {
            Ok(mut docs) => {
                docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(docs)
            }
            Err(e) => {
                warn!("ignoring unreadable document cache for {owner}: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Looks up one record by object id or blob id.
    pub fn find_doc(&self, owner: &Address, id: &str) -> StorageResult<Option<DocumentRecord>> {
        Ok(self.load_docs(owner)?.into_iter().find(|d| d.matches_id(id)))
    }

    fn write_docs(&self, owner: &Address, docs: &[DocumentRecord]) -> StorageResult<()> {
        let raw = serde_json::to_string(docs)?;
        self.store.set(&Self::docs_key(owner), &raw)
    }

    /// Inserts or replaces (by [`DocumentRecord::doc_key`]) a record for `owner`.
    pub fn save_doc(&self, owner: &Address, doc: &DocumentRecord) -> StorageResult<()> {
        let mut docs = self.load_docs(owner)?;
        docs.retain(|d| d.doc_key() != doc.doc_key() && d.blob_id != doc.blob_id);
        docs.push(doc.clone());
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.write_docs(owner, &docs)?;

        let raw = serde_json::to_string(doc)?;
        self.store.set(LAST_CREATED_KEY, &raw)?;
        debug!("cached document {} for {owner}", doc.doc_key());
        Ok(())
    }

    /// Applies `update` to the record matching `id`. Returns false if there is no such record.
    pub fn update_doc(
        &self,
        owner: &Address,
        id: &str,
        update: impl FnOnce(&mut DocumentRecord),
    ) -> StorageResult<bool> {
        let mut docs = self.load_docs(owner)?;
        let Some(doc) = docs.iter_mut().find(|d| d.matches_id(id)) else {
            return Ok(false);
        };
        update(doc);
        self.write_docs(owner, &docs)?;
        Ok(true)
    }

    pub fn update_status(
        &self,
        owner: &Address,
        id: &str,
        status: DocumentStatus,
    ) -> StorageResult<bool> {
        self.update_doc(owner, id, |d| d.status = status)
    }

    pub fn update_signed_addresses(
        &self,
        owner: &Address,
        id: &str,
        signed: Vec<Address>,
    ) -> StorageResult<bool> {
        self.update_doc(owner, id, |d| d.signed_addresses = signed)
    }

    /// The most recently saved record, across all owners.
    pub fn last_created(&self) -> StorageResult<Option<DocumentRecord>> {
        let Some(raw) = self.store.get(LAST_CREATED_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                warn!("ignoring unreadable last-created record: {e}");
                Ok(None)
            }
        }
    }

    /// Addresses that have a document list in this store.
    pub fn owners(&self) -> StorageResult<Vec<Address>> {
        Ok(self
            .store
            .list_prefix(DOCS_PREFIX)?
            .into_iter()
            .filter_map(|(key, _)| Address::parse(&key[DOCS_PREFIX.len()..]).ok())
            .collect())
    }

    // ── Blob metadata ──

    pub fn record_blob(&self, meta: &StoredBlobMeta) -> StorageResult<()> {
        let raw = serde_json::to_string(meta)?;
        self.store.set(&format!("{BLOBS_PREFIX}{}", meta.blob_id), &raw)
    }

    pub fn blob_meta(&self, blob_id: &str) -> StorageResult<Option<StoredBlobMeta>> {
        match self.store.get(&format!("{BLOBS_PREFIX}{blob_id}"))? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }
}

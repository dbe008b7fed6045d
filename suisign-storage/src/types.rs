//! Local document projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use suisign_crypto::Address;

/// Signing progress of a document. Ordered so merges can take the max.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Signed,
    Completed,
}

/// What the encrypted blob holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentKind {
    /// JSON message envelope (subject, body, sender, timestamp).
    Message,
    /// Raw file bytes.
    File { file_name: String, mime_type: String },
}

/// A participant's local view of one document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// On-chain object id. `None` for local-only records, which can't be signed or shared.
    pub object_id: Option<String>,
    pub blob_id: String,
    pub blob_object_id: Option<String>,
    /// Hex SHA-256 of the plaintext.
    pub content_digest: String,
    /// Base64 wrapped content secret.
    pub wrapped_secret: String,
    pub policy_id: String,
    pub subject: String,
    pub message_preview: String,
    pub created_at: DateTime<Utc>,
    pub sender: Address,
    pub signers: Vec<Address>,
    #[serde(default)]
    pub signed_addresses: Vec<Address>,
    pub status: DocumentStatus,
    pub content: ContentKind,
}

impl DocumentRecord {
    /// Stable identity used for de-duplication in the cache.
    pub fn doc_key(&self) -> &str {
        self.object_id.as_deref().unwrap_or(&self.blob_id)
    }

    pub fn is_on_chain(&self) -> bool {
        self.object_id.is_some()
    }

    /// True if `id` is this record's object id or blob id.
    pub fn matches_id(&self, id: &str) -> bool {
        self.object_id.as_deref() == Some(id) || self.blob_id == id
    }

    /// Sender plus every signer, de-duplicated, sender first.
    pub fn allowed_addresses(&self) -> Vec<Address> {
        let mut out = vec![self.sender.clone()];
        for signer in &self.signers {
            if !out.contains(signer) {
                out.push(signer.clone());
            }
        }
        out
    }

    pub fn has_signed(&self, address: &Address) -> bool {
        self.signed_addresses.contains(address)
    }
}

/// Blob metadata cached by blob id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlobMeta {
    pub blob_id: String,
    pub object_id: Option<String>,
}

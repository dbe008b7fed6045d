//! Shared types for ledger, blob store and pipeline operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use suisign_crypto::Address;

// ── Ledger ──

/// A signature recorded on the on-chain document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSignature {
    pub signer: Address,
    pub timestamp_ms: u64,
}

/// Authoritative on-chain state of a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDocument {
    pub id: String,
    pub owner: Address,
    pub signers: Vec<Address>,
    pub signatures: Vec<ChainSignature>,
    pub walrus_blob_id: String,
    pub walrus_hash_hex: String,
    pub seal_secret_id: String,
    /// Access policy the wrapped secret is bound to, when the ledger records it.
    pub seal_policy_id: Option<String>,
    pub fully_signed: bool,
}

impl ChainDocument {
    pub fn has_signed(&self, address: &Address) -> bool {
        self.signatures.iter().any(|s| s.signer == *address)
    }

    /// Owner or listed signer.
    pub fn is_participant(&self, address: &Address) -> bool {
        self.owner == *address || self.signers.contains(address)
    }
}

/// Arguments of the document-creation transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDocumentRequest {
    pub blob_id: String,
    pub hash_hex: String,
    /// Base64 wrapped secret.
    pub seal_secret_id: String,
    pub policy_id: String,
    pub signers: Vec<Address>,
}

/// Effects of an executed transaction, as reported by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub digest: String,
    #[serde(default)]
    pub object_changes: Vec<ObjectChange>,
}

/// One object-level change in a transaction's effects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectChange {
    #[serde(rename_all = "camelCase")]
    Created {
        object_id: String,
        object_type: String,
        #[serde(default)]
        sender: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Mutated {
        object_id: String,
        object_type: String,
    },
    #[serde(rename_all = "camelCase")]
    Deleted { object_id: String },
    #[serde(other)]
    Other,
}

// ── Blob store ──

/// Options for a blob upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    pub epochs: u32,
    pub permanent: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            epochs: 1,
            permanent: true,
        }
    }
}

/// Result of storing a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlob {
    pub blob_id: String,
    /// On-chain blob object, when the store created one.
    pub object_id: Option<String>,
}

// ── Documents ──

/// What a sender is encrypting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentPayload {
    Message { subject: String, body: String },
    File {
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

/// Plaintext form of a message document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub subject: String,
    pub message: String,
    pub sender_address: Address,
    pub created_at: DateTime<Utc>,
}

/// A request to create a document.
#[derive(Clone, Debug)]
pub struct ComposeRequest {
    pub payload: DocumentPayload,
    pub sender: Address,
    /// Recipient handles or raw addresses.
    pub recipients: Vec<String>,
}

/// Outcome of re-hashing decrypted content against the recorded digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntegrityCheck {
    Verified,
    Mismatch { expected: String, actual: String },
    /// No digest was recorded for the document.
    Unavailable,
}

/// Decrypted document content.
#[derive(Clone, Debug)]
pub struct DecryptedDocument {
    pub plaintext: Vec<u8>,
    pub integrity: IntegrityCheck,
}

impl DecryptedDocument {
    /// Parses the plaintext as a message envelope, if it is one.
    pub fn as_message(&self) -> Option<MessageEnvelope> {
        serde_json::from_slice(&self.plaintext).ok()
    }

    pub fn is_verified(&self) -> bool {
        self.integrity == IntegrityCheck::Verified
    }
}

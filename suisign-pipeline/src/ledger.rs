//! Ledger interface for the on-chain document module.
//!
//! The ledger is authoritative for who owns, may sign, and has signed a
//! document, and it answers the key servers' access-approval checks.

use crate::error::{PipelineError, PipelineResult};
use crate::types::{
    ChainDocument, ChainSignature, CreateDocumentRequest, ObjectChange, TransactionResponse,
};
use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use suisign_crypto::Address;
use tokio::sync::RwLock;
use tracing::debug;

/// Read access to on-chain documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get_document(&self, document_id: &str) -> PipelineResult<Option<ChainDocument>>;
}

/// Transactions against the document module.
#[async_trait]
pub trait Ledger: DocumentSource {
    async fn create_document(
        &self,
        sender: &Address,
        request: &CreateDocumentRequest,
    ) -> PipelineResult<TransactionResponse>;

    async fn sign_document(
        &self,
        signer: &Address,
        document_id: &str,
    ) -> PipelineResult<TransactionResponse>;

    /// Evaluates the access policy: `Ok` iff `caller` may unwrap secrets bound to
    /// `policy_id` through `document_id`, otherwise [`PipelineError::NotAuthorized`].
    async fn approve_access(
        &self,
        caller: &Address,
        policy_id: &str,
        document_id: &str,
    ) -> PipelineResult<()>;
}

/// Extracts the id of the single document created by a transaction.
///
/// Only `created` changes of type `<package>::document::Document` count.
/// Zero or several matches are [`PipelineError::AmbiguousCreationResult`].
pub fn extract_document_id(
    response: &TransactionResponse,
    package_id: &str,
) -> PipelineResult<String> {
    let document_type = format!("{package_id}::document::Document");
    let mut created = response.object_changes.iter().filter_map(|change| match change {
        ObjectChange::Created {
            object_id,
            object_type,
            ..
        } if *object_type == document_type => Some(object_id),
        _ => None,
    });

    match (created.next(), created.next()) {
        (Some(id), None) => Ok(id.clone()),
        (None, _) => Err(PipelineError::AmbiguousCreationResult(format!(
            "transaction {} created no {document_type}",
            response.digest
        ))),
        (Some(_), Some(_)) => Err(PipelineError::AmbiguousCreationResult(format!(
            "transaction {} created more than one {document_type}",
            response.digest
        ))),
    }
}

// ============================================================================
// MemoryLedger
// ============================================================================

/// In-process ledger implementing the document module's rules.
#[derive(Clone)]
pub struct MemoryLedger {
    package_id: String,
    documents: Arc<RwLock<HashMap<String, ChainDocument>>>,
    offline: Arc<AtomicBool>,
    omit_object_changes: Arc<AtomicBool>,
}

fn random_object_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

fn transaction_digest() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl MemoryLedger {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            documents: Arc::new(RwLock::new(HashMap::new())),
            offline: Arc::new(AtomicBool::new(false)),
            omit_object_changes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulates the full node being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes create transactions report no object changes.
    pub fn set_omit_object_changes(&self, omit: bool) {
        self.omit_object_changes.store(omit, Ordering::SeqCst);
    }

    /// Records a signature directly, as another device would.
    pub async fn record_external_signature(
        &self,
        document_id: &str,
        signer: &Address,
    ) -> PipelineResult<()> {
        let mut docs = self.documents.write().await;
        let doc = docs
            .get_mut(document_id)
            .ok_or_else(|| PipelineError::NotFound(format!("document {document_id}")))?;
        apply_signature(doc, signer)
    }

    fn check_online(&self) -> PipelineResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PipelineError::NetworkUnavailable("ledger offline".to_string()));
        }
        Ok(())
    }
}

fn apply_signature(doc: &mut ChainDocument, signer: &Address) -> PipelineResult<()> {
    if !doc.signers.contains(signer) {
        return Err(PipelineError::Ledger(format!(
            "ENotSigner: {signer} is not a signer of {}",
            doc.id
        )));
    }
    if doc.has_signed(signer) {
        return Err(PipelineError::Ledger(format!(
            "EAlreadySigned: {signer} already signed {}",
            doc.id
        )));
    }
    doc.signatures.push(ChainSignature {
        signer: signer.clone(),
        timestamp_ms: u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default(),
    });
    doc.fully_signed = doc.signers.iter().all(|s| doc.has_signed(s));
    Ok(())
}

#[async_trait]
impl DocumentSource for MemoryLedger {
    async fn get_document(&self, document_id: &str) -> PipelineResult<Option<ChainDocument>> {
        self.check_online()?;
        Ok(self.documents.read().await.get(document_id).cloned())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn create_document(
        &self,
        sender: &Address,
        request: &CreateDocumentRequest,
    ) -> PipelineResult<TransactionResponse> {
        self.check_online()?;
        if request.signers.is_empty() {
            return Err(PipelineError::Ledger("ENoSigners".to_string()));
        }

        // A policy id binds exactly one document.
        let mut docs = self.documents.write().await;
        if docs
            .values()
            .any(|d| d.seal_policy_id.as_deref() == Some(request.policy_id.as_str()))
        {
            return Err(PipelineError::Ledger(format!(
                "EPolicyInUse: policy {} is already bound to a document",
                request.policy_id
            )));
        }

        let id = random_object_id();
        let doc = ChainDocument {
            id: id.clone(),
            owner: sender.clone(),
            signers: request.signers.clone(),
            signatures: Vec::new(),
            walrus_blob_id: request.blob_id.clone(),
            walrus_hash_hex: request.hash_hex.clone(),
            seal_secret_id: request.seal_secret_id.clone(),
            seal_policy_id: Some(request.policy_id.clone()),
            fully_signed: false,
        };
        docs.insert(id.clone(), doc);
        drop(docs);
        debug!("created document {id} for {sender}");

        let object_changes = if self.omit_object_changes.load(Ordering::SeqCst) {
            Vec::new()
        } else {
            vec![ObjectChange::Created {
                object_id: id,
                object_type: format!("{}::document::Document", self.package_id),
                sender: Some(sender.to_string()),
            }]
        };

        Ok(TransactionResponse {
            digest: transaction_digest(),
            object_changes,
        })
    }

    async fn sign_document(
        &self,
        signer: &Address,
        document_id: &str,
    ) -> PipelineResult<TransactionResponse> {
        self.check_online()?;
        let mut docs = self.documents.write().await;
        let doc = docs
            .get_mut(document_id)
            .ok_or_else(|| PipelineError::NotFound(format!("document {document_id}")))?;
        apply_signature(doc, signer)?;
        debug!("{signer} signed document {document_id}");

        Ok(TransactionResponse {
            digest: transaction_digest(),
            object_changes: vec![ObjectChange::Mutated {
                object_id: document_id.to_string(),
                object_type: format!("{}::document::Document", self.package_id),
            }],
        })
    }

    async fn approve_access(
        &self,
        caller: &Address,
        policy_id: &str,
        document_id: &str,
    ) -> PipelineResult<()> {
        self.check_online()?;
        let docs = self.documents.read().await;
        let doc = docs.get(document_id).ok_or_else(|| {
            PipelineError::NotAuthorized(format!("document {document_id} does not exist"))
        })?;

        if let Some(bound) = &doc.seal_policy_id {
            if bound != policy_id {
                return Err(PipelineError::NotAuthorized(format!(
                    "policy {policy_id} is not bound to document {document_id}"
                )));
            }
        }
        if !doc.is_participant(caller) {
            return Err(PipelineError::NotAuthorized(format!(
                "{caller} is not a participant of document {document_id}"
            )));
        }
        Ok(())
    }
}

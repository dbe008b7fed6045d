//! Document pipeline orchestrator.
//!
//! Create: serialize -> digest -> encrypt -> store blob -> wrap secret ->
//! ledger transaction -> local projections.
//!
//! Read: session -> unwrap secret (authorization) -> fetch blob -> decrypt ->
//! verify digest. The blob is only fetched once unwrapping has succeeded, so
//! an unauthorized reader never downloads ciphertext.

use crate::blob_store::BlobStore;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ledger::{extract_document_id, Ledger};
use crate::reconciler::status_for;
use crate::seal::SealClient;
use crate::session::{SessionKey, SessionManager, WalletSigner};
use crate::types::{
    ComposeRequest, CreateDocumentRequest, DecryptedDocument, DocumentPayload, IntegrityCheck,
    MessageEnvelope, StoreOptions,
};
use chrono::Utc;
use std::sync::Arc;
use suisign_crypto::{decrypt, digest, encrypt, generate_secret, Address, ContentDigest};
use suisign_storage::{
    ContentKind, DocumentCache, DocumentRecord, DocumentStatus, HandleRegistry, StoredBlobMeta,
};
use tracing::{debug, info, warn};

const PREVIEW_LIMIT: usize = 160;
const PREVIEW_KEEP: usize = 157;

/// Short preview of a message body for document lists.
pub fn message_preview(body: &str) -> String {
    if body.chars().count() > PREVIEW_LIMIT {
        let kept: String = body.chars().take(PREVIEW_KEEP).collect();
        format!("{kept}…")
    } else {
        body.to_string()
    }
}

/// Creates, reads and signs documents for one device.
pub struct DocumentPipeline {
    config: PipelineConfig,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn Ledger>,
    seal: SealClient,
    sessions: SessionManager,
    cache: DocumentCache,
    handles: HandleRegistry,
}

impl DocumentPipeline {
    pub fn new(
        config: PipelineConfig,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn Ledger>,
        seal: SealClient,
        cache: DocumentCache,
        handles: HandleRegistry,
    ) -> PipelineResult<Self> {
        config.validate()?;
        if seal.package_id() != config.package_id {
            return Err(PipelineError::Config(format!(
                "seal client is for package {}, pipeline for {}",
                seal.package_id(),
                config.package_id
            )));
        }
        let sessions = SessionManager::new(config.package_id.clone(), config.session_ttl());
        Ok(Self {
            config,
            blobs,
            ledger,
            seal,
            sessions,
            cache,
            handles,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    /// Switches the active wallet identity; the previous session is dropped.
    pub async fn switch_identity(&self, identity: Option<Address>) {
        self.sessions.switch_identity(identity).await;
    }

    /// Documents visible to `owner`, newest first.
    pub fn documents_for(&self, owner: &Address) -> PipelineResult<Vec<DocumentRecord>> {
        Ok(self.cache.load_docs(owner)?)
    }

    // ── Create ──

    /// Encrypts, stores and registers a new document.
    ///
    /// If the ledger's response doesn't identify the created document, the
    /// record is kept local-only (`object_id: None`) rather than failing.
    pub async fn create_document(&self, request: ComposeRequest) -> PipelineResult<DocumentRecord> {
        let sender = request.sender.clone();
        let signers = self.handles.resolve(&request.recipients)?;
        if signers.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "at least one signer is required".to_string(),
            ));
        }

        let created_at = Utc::now();
        let (plaintext, subject, preview, content) = match request.payload {
            DocumentPayload::Message { subject, body } => {
                let envelope = MessageEnvelope {
                    subject: subject.clone(),
                    message: body.clone(),
                    sender_address: sender.clone(),
                    created_at,
                };
                let preview = message_preview(&body);
                (serde_json::to_vec(&envelope)?, subject, preview, ContentKind::Message)
            }
            DocumentPayload::File {
                file_name,
                mime_type,
                bytes,
            } => {
                let preview = format!("[Encrypted document] {file_name}");
                let mime_type = if mime_type.trim().is_empty() {
                    "application/pdf".to_string()
                } else {
                    mime_type
                };
                (
                    bytes,
                    file_name.clone(),
                    preview,
                    ContentKind::File {
                        file_name,
                        mime_type,
                    },
                )
            }
        };

        let content_digest = digest(&plaintext);
        let secret = generate_secret();
        let ciphertext = encrypt(&plaintext, &secret)?;
        drop(plaintext);
        debug!("encrypted {} bytes for {sender}", ciphertext.len());

        let stored = self
            .blobs
            .put(
                ciphertext,
                StoreOptions {
                    epochs: self.config.blob_epochs,
                    permanent: true,
                },
            )
            .await?;
        self.cache.record_blob(&StoredBlobMeta {
            blob_id: stored.blob_id.clone(),
            object_id: stored.object_id.clone(),
        })?;

        let mut allowed = vec![sender.clone()];
        for signer in &signers {
            if !allowed.contains(signer) {
                allowed.push(signer.clone());
            }
        }
        let wrapped = self
            .seal
            .wrap_secret(&secret, Some(stored.blob_id.as_str()), &allowed)?;
        drop(secret);

        let tx = self
            .ledger
            .create_document(
                &sender,
                &CreateDocumentRequest {
                    blob_id: stored.blob_id.clone(),
                    hash_hex: content_digest.to_string(),
                    seal_secret_id: wrapped.encoded.clone(),
                    policy_id: wrapped.policy_id.clone(),
                    signers: signers.clone(),
                },
            )
            .await
            .map_err(|e| {
                warn!("create transaction failed after storing blob {}: {e}", stored.blob_id);
                e
            })?;

        let object_id = match extract_document_id(&tx, &self.config.package_id) {
            Ok(id) => Some(id),
            Err(PipelineError::AmbiguousCreationResult(reason)) => {
                warn!("keeping document local-only: {reason}");
                None
            }
            Err(e) => return Err(e),
        };

        let record = DocumentRecord {
            object_id,
            blob_id: stored.blob_id,
            blob_object_id: stored.object_id,
            content_digest: content_digest.to_string(),
            wrapped_secret: wrapped.encoded,
            policy_id: wrapped.policy_id,
            subject,
            message_preview: preview,
            created_at,
            sender: sender.clone(),
            signers,
            signed_addresses: Vec::new(),
            status: DocumentStatus::Pending,
            content,
        };

        for participant in record.allowed_addresses() {
            self.cache.save_doc(&participant, &record)?;
        }
        info!(
            "created document {} (tx {}) for {} signers",
            record.doc_key(),
            tx.digest,
            record.signers.len()
        );
        Ok(record)
    }

    // ── Read ──

    /// Unwraps, fetches, decrypts and integrity-checks a document for `wallet`.
    pub async fn read_document(
        &self,
        record: &DocumentRecord,
        wallet: &dyn WalletSigner,
    ) -> PipelineResult<DecryptedDocument> {
        let document_id = record
            .object_id
            .as_deref()
            .ok_or_else(|| PipelineError::NotOnChain(record.blob_id.clone()))?;
        if record.wrapped_secret.trim().is_empty() {
            return Err(PipelineError::MalformedSecret(
                "document has no wrapped secret".to_string(),
            ));
        }

        let session = self.sessions.ensure_session(wallet).await?;
        let secret = match self.unwrap(record, document_id, &session).await {
            Err(PipelineError::SessionExpired) => {
                debug!("session expired during unwrap, re-establishing once");
                self.sessions.invalidate(&session).await;
                let fresh = self.sessions.ensure_session(wallet).await?;
                self.unwrap(record, document_id, &fresh).await?
            }
            other => other?,
        };

        let ciphertext = self.blobs.get(&record.blob_id).await?;
        let plaintext = decrypt(&ciphertext, &secret)?;

        let integrity = if record.content_digest.trim().is_empty() {
            IntegrityCheck::Unavailable
        } else {
            let expected = ContentDigest::from_hex(&record.content_digest);
            let actual = digest(&plaintext);
            if actual == expected {
                IntegrityCheck::Verified
            } else {
                warn!(
                    "digest mismatch for document {document_id}: expected {expected}, got {actual}"
                );
                IntegrityCheck::Mismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                }
            }
        };

        debug!("decrypted document {document_id} ({} bytes)", plaintext.len());
        Ok(DecryptedDocument {
            plaintext,
            integrity,
        })
    }

    async fn unwrap(
        &self,
        record: &DocumentRecord,
        document_id: &str,
        session: &SessionKey,
    ) -> PipelineResult<suisign_crypto::SymmetricSecret> {
        self.seal
            .unwrap_secret(&record.wrapped_secret, document_id, session)
            .await
    }

    // ── Sign ──

    /// Signs a document on the ledger, then updates every participant's local record.
    pub async fn sign_document(
        &self,
        record: &DocumentRecord,
        signer: &Address,
    ) -> PipelineResult<DocumentRecord> {
        let document_id = record
            .object_id
            .as_deref()
            .ok_or_else(|| PipelineError::NotOnChain(record.blob_id.clone()))?;
        if !record.signers.contains(signer) {
            return Err(PipelineError::NotAuthorized(format!(
                "{signer} is not a signer of {document_id}"
            )));
        }

        let tx = self.ledger.sign_document(signer, document_id).await?;
        debug!("sign transaction {} for {document_id}", tx.digest);

        let mut updated = record.clone();
        add_signature(&mut updated, signer);
        for participant in record.allowed_addresses() {
            let found = self.cache.update_doc(&participant, document_id, |doc| {
                add_signature(doc, signer);
            })?;
            if !found {
                self.cache.save_doc(&participant, &updated)?;
            }
        }

        info!("{signer} signed document {document_id}");
        Ok(updated)
    }
}

/// Adds `signer` to the signed set and upgrades the status; never downgrades.
fn add_signature(doc: &mut DocumentRecord, signer: &Address) {
    if !doc.signed_addresses.contains(signer) {
        doc.signed_addresses.push(signer.clone());
    }
    let computed = status_for(doc.signed_addresses.len(), doc.signers.len(), false);
    doc.status = doc.status.max(computed);
}

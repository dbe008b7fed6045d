//! Threshold key servers.
//!
//! A key server holds an X25519 keypair. Secrets are sealed to its public
//! key together with the policy id they're bound to; the server releases a
//! share only after it has verified the caller's session certificate and
//! the ledger has approved the caller for that policy and document.

use crate::error::{PipelineError, PipelineResult};
use crate::ledger::Ledger;
use crate::session::{personal_message, SessionCertificate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use suisign_crypto::{
    from_base64, open, verify_personal_message, verify_signature, KeyServerKeyPair,
    SealedEnvelope, SignatureBundle,
};
use tracing::debug;

/// The access-approval call a key server evaluates before releasing a share.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTransaction {
    pub package_id: String,
    pub policy_id: String,
    pub document_id: String,
}

impl ApprovalTransaction {
    pub fn new(package_id: &str, policy_id: &str, document_id: &str) -> Self {
        Self {
            package_id: package_id.to_string(),
            policy_id: policy_id.to_string(),
            document_id: document_id.to_string(),
        }
    }

    /// Canonical bytes signed by the session key.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "{}::document::seal_approve({},{})",
            self.package_id, self.policy_id, self.document_id
        )
        .into_bytes()
    }
}

/// Plaintext of one sealed share.
#[derive(Serialize, Deserialize)]
pub(crate) struct SharePayload {
    /// Policy id the payload is bound to.
    pub id: String,
    /// Base64 payload.
    pub data: String,
}

/// Everything a key server needs to decide whether to release a share.
#[derive(Clone, Debug)]
pub struct KeyReleaseRequest {
    pub approval: ApprovalTransaction,
    pub certificate: SessionCertificate,
    /// Session-key signature over [`ApprovalTransaction::to_bytes`].
    pub request_signature: SignatureBundle,
    pub share: SealedEnvelope,
}

#[async_trait]
pub trait KeyServer: Send + Sync {
    /// On-chain object id identifying this server.
    fn object_id(&self) -> &str;

    /// X25519 public key shares are sealed to.
    fn public_key(&self) -> [u8; 32];

    /// Returns the share payload, or why it was refused.
    async fn release(&self, request: &KeyReleaseRequest) -> PipelineResult<Vec<u8>>;
}

/// Key server running in-process against a [`Ledger`].
pub struct LocalKeyServer {
    object_id: String,
    package_id: String,
    keypair: KeyServerKeyPair,
    ledger: Arc<dyn Ledger>,
    offline: AtomicBool,
    releases: AtomicUsize,
}

impl LocalKeyServer {
    pub fn new(object_id: impl Into<String>, package_id: impl Into<String>, ledger: Arc<dyn Ledger>) -> Self {
        Self::with_keypair(object_id, package_id, KeyServerKeyPair::generate(), ledger)
    }

    pub fn with_keypair(
        object_id: impl Into<String>,
        package_id: impl Into<String>,
        keypair: KeyServerKeyPair,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            package_id: package_id.into(),
            keypair,
            ledger,
            offline: AtomicBool::new(false),
            releases: AtomicUsize::new(0),
        }
    }

    /// Simulates the server being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of shares released so far.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn verify_certificate(&self, cert: &SessionCertificate) -> PipelineResult<()> {
        if cert.package_id != self.package_id {
            return Err(PipelineError::NotAuthorized(format!(
                "session is for package {}, not {}",
                cert.package_id, self.package_id
            )));
        }
        let message = personal_message(
            &cert.address,
            &cert.package_id,
            cert.creation_time_ms,
            cert.ttl_ms,
            &cert.session_public_key,
        );
        verify_personal_message(&cert.address, &message, &cert.wallet_signature)
            .map_err(|e| PipelineError::NotAuthorized(format!("invalid session certificate: {e}")))?;
        if cert.is_expired() {
            return Err(PipelineError::SessionExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl KeyServer for LocalKeyServer {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    fn public_key(&self) -> [u8; 32] {
        self.keypair.public_bytes()
    }

    async fn release(&self, request: &KeyReleaseRequest) -> PipelineResult<Vec<u8>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PipelineError::NetworkUnavailable(format!(
                "key server {} unreachable",
                self.object_id
            )));
        }

        let cert = &request.certificate;
        self.verify_certificate(cert)?;

        if request.approval.package_id != self.package_id {
            return Err(PipelineError::NotAuthorized(format!(
                "approval targets package {}",
                request.approval.package_id
            )));
        }
        if request.request_signature.public_key != cert.session_public_key {
            return Err(PipelineError::NotAuthorized(
                "request not signed by the certified session key".to_string(),
            ));
        }
        verify_signature(&request.approval.to_bytes(), &request.request_signature)
            .map_err(|e| PipelineError::NotAuthorized(format!("invalid request signature: {e}")))?;

        let opened = open(&request.share, &self.keypair.secret).map_err(|e| {
            PipelineError::Decode(format!("share for key server {}: {e}", self.object_id))
        })?;
        let share: SharePayload = serde_json::from_slice(&opened)
            .map_err(|e| PipelineError::Decode(format!("share payload: {e}")))?;
        if share.id != request.approval.policy_id {
            return Err(PipelineError::NotAuthorized(format!(
                "share is bound to policy {}, not {}",
                share.id, request.approval.policy_id
            )));
        }

        self.ledger
            .approve_access(
                &cert.address,
                &request.approval.policy_id,
                &request.approval.document_id,
            )
            .await?;

        let data = from_base64(&share.data)
            .map_err(|e| PipelineError::Decode(format!("share data: {e}")))?;
        self.releases.fetch_add(1, Ordering::SeqCst);
        debug!(
            "key server {} released policy {} to {}",
            self.object_id, request.approval.policy_id, cert.address
        );
        Ok(data)
    }
}

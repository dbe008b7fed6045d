//! Wallet-signed session keys with coalesced creation.
//!
//! A session is an ephemeral ed25519 key certified by one wallet signature.
//! Key servers accept requests signed by the session key until its TTL runs
//! out, so the user approves one wallet prompt per session instead of one per
//! document.
//!
//! [`SessionManager`] is the explicit context slot for the active identity:
//! switching identity swaps the slot, and concurrent callers share a single
//! in-flight creation.

use crate::error::{PipelineError, PipelineResult};
use crate::key_server::ApprovalTransaction;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use suisign_crypto::{to_hex, verify_personal_message, Address, SignatureBundle, SigningKeyPair};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Message the wallet signs to certify a session key.
pub fn personal_message(
    address: &Address,
    package_id: &str,
    creation_time_ms: i64,
    ttl_ms: i64,
    session_public_key: &[u8; 32],
) -> Vec<u8> {
    format!(
        "SuiSign session for {address}: access keys of package {package_id} \
         for {ttl_ms} ms from {creation_time_ms}, session key {}",
        to_hex(session_public_key)
    )
    .into_bytes()
}

// ── Wallet ──

/// Signs personal messages on behalf of one address (a wallet prompt).
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_personal_message(&self, message: &[u8]) -> PipelineResult<SignatureBundle>;
}

/// Wallet backed by an in-process keypair.
pub struct LocalWallet {
    keypair: SigningKeyPair,
}

impl LocalWallet {
    pub fn new(keypair: SigningKeyPair) -> Self {
        Self { keypair }
    }

    pub fn generate() -> Self {
        Self::new(SigningKeyPair::generate())
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn address(&self) -> Address {
        self.keypair.address()
    }

    async fn sign_personal_message(&self, message: &[u8]) -> PipelineResult<SignatureBundle> {
        Ok(self.keypair.sign(message))
    }
}

// ── Session key ──

/// Proof, presented to key servers, that a wallet delegated to a session key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCertificate {
    pub address: Address,
    pub package_id: String,
    pub creation_time_ms: i64,
    pub ttl_ms: i64,
    pub session_public_key: [u8; 32],
    pub wallet_signature: SignatureBundle,
}

impl SessionCertificate {
    pub fn expires_at_ms(&self) -> i64 {
        self.creation_time_ms.saturating_add(self.ttl_ms)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() >= self.expires_at_ms()
    }
}

/// Ephemeral signing key delegated by a wallet for a bounded time.
pub struct SessionKey {
    address: Address,
    package_id: String,
    created_at: DateTime<Utc>,
    ttl: Duration,
    session: SigningKeyPair,
    wallet_signature: Option<SignatureBundle>,
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("address", &self.address)
            .field("package_id", &self.package_id)
            .field("created_at", &self.created_at)
            .field("ttl", &self.ttl)
            .field("signed", &self.wallet_signature.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionKey {
    pub fn new(address: Address, package_id: &str, ttl: Duration) -> Self {
        Self {
            address,
            package_id: package_id.to_string(),
            // Millisecond precision so the certificate reproduces the signed message exactly.
            created_at: DateTime::from_timestamp_millis(Utc::now().timestamp_millis())
                .unwrap_or_else(Utc::now),
            ttl,
            session: SigningKeyPair::generate(),
            wallet_signature: None,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + self.ttl
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at()
    }

    /// Message the wallet must sign to certify this session.
    pub fn personal_message(&self) -> Vec<u8> {
        personal_message(
            &self.address,
            &self.package_id,
            self.created_at.timestamp_millis(),
            self.ttl.num_milliseconds(),
            &self.session.public_bytes(),
        )
    }

    /// Attaches the wallet's signature over [`SessionKey::personal_message`].
    pub fn set_personal_message_signature(&mut self, signature: SignatureBundle) -> PipelineResult<()> {
        verify_personal_message(&self.address, &self.personal_message(), &signature)
            .map_err(|e| PipelineError::NotAuthorized(format!("wallet signature rejected: {e}")))?;
        self.wallet_signature = Some(signature);
        Ok(())
    }

    pub fn certificate(&self) -> PipelineResult<SessionCertificate> {
        let wallet_signature = self.wallet_signature.clone().ok_or_else(|| {
            PipelineError::NotAuthorized("session key has no wallet signature".to_string())
        })?;
        Ok(SessionCertificate {
            address: self.address.clone(),
            package_id: self.package_id.clone(),
            creation_time_ms: self.created_at.timestamp_millis(),
            ttl_ms: self.ttl.num_milliseconds(),
            session_public_key: self.session.public_bytes(),
            wallet_signature,
        })
    }

    /// Signs an approval request with the session key.
    pub fn sign_request(&self, approval: &ApprovalTransaction) -> SignatureBundle {
        self.session.sign(&approval.to_bytes())
    }
}

// ── Manager ──

struct SessionSlot {
    identity: Option<Address>,
    cell: Arc<OnceCell<Arc<SessionKey>>>,
}

impl SessionSlot {
    fn empty(identity: Option<Address>) -> Self {
        Self {
            identity,
            cell: Arc::new(OnceCell::new()),
        }
    }
}

/// Holds the session for the active identity.
pub struct SessionManager {
    package_id: String,
    ttl: Duration,
    slot: Mutex<SessionSlot>,
}

impl SessionManager {
    pub fn new(package_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            package_id: package_id.into(),
            ttl,
            slot: Mutex::new(SessionSlot::empty(None)),
        }
    }

    /// The active identity, if any.
    pub async fn identity(&self) -> Option<Address> {
        self.slot.lock().await.identity.clone()
    }

    /// Makes `identity` active, discarding any session (or in-flight creation) of the previous one.
    pub async fn switch_identity(&self, identity: Option<Address>) {
        let mut slot = self.slot.lock().await;
        if slot.identity != identity {
            debug!("switching session identity to {identity:?}");
        }
        *slot = SessionSlot::empty(identity);
    }

    /// Clears the session if `identity` is the active one.
    pub async fn reset_session(&self, identity: &Address) {
        let mut slot = self.slot.lock().await;
        if slot.identity.as_ref() == Some(identity) {
            slot.cell = Arc::new(OnceCell::new());
        }
    }

    /// Drops `session` if it is still the active one (e.g. a key server reported it expired).
    pub async fn invalidate(&self, session: &Arc<SessionKey>) {
        let mut slot = self.slot.lock().await;
        if slot.cell.get().is_some_and(|s| Arc::ptr_eq(s, session)) {
            slot.cell = Arc::new(OnceCell::new());
        }
    }

    /// The current unexpired session, without creating one.
    pub async fn current_session(&self) -> Option<Arc<SessionKey>> {
        let slot = self.slot.lock().await;
        slot.cell.get().filter(|s| !s.is_expired()).cloned()
    }

    /// Returns a valid session for the active identity, prompting `wallet` at most once
    /// no matter how many callers are waiting.
    pub async fn ensure_session(&self, wallet: &dyn WalletSigner) -> PipelineResult<Arc<SessionKey>> {
        let (identity, cell) = {
            let mut slot = self.slot.lock().await;
            let identity = slot.identity.clone().ok_or(PipelineError::NoActiveIdentity)?;
            let wallet_address = wallet.address();
            if wallet_address != identity {
                return Err(PipelineError::IdentityMismatch {
                    expected: identity.to_string(),
                    actual: wallet_address.to_string(),
                });
            }
            if slot.cell.get().is_some_and(|s| s.is_expired()) {
                debug!("session for {identity} expired, discarding");
                slot.cell = Arc::new(OnceCell::new());
            }
            (identity, slot.cell.clone())
        };

        let session = cell
            .get_or_try_init(|| self.create_session(identity.clone(), wallet))
            .await?
            .clone();

        // The identity may have switched while the wallet prompt was open.
        let slot = self.slot.lock().await;
        if !Arc::ptr_eq(&slot.cell, &cell) && slot.identity.as_ref() != Some(&identity) {
            return Err(PipelineError::IdentityMismatch {
                expected: slot
                    .identity
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                actual: identity.to_string(),
            });
        }
        Ok(session)
    }

    async fn create_session(
        &self,
        identity: Address,
        wallet: &dyn WalletSigner,
    ) -> PipelineResult<Arc<SessionKey>> {
        let mut session = SessionKey::new(identity.clone(), &self.package_id, self.ttl);
        let signature = wallet
            .sign_personal_message(&session.personal_message())
            .await
            .map_err(|e| {
                warn!("wallet declined session for {identity}: {e}");
                e
            })?;
        session.set_personal_message_signature(signature)?;
        info!("created session for {identity}, expires at {}", session.expires_at());
        Ok(Arc::new(session))
    }
}

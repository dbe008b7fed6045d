//! Policy-bound secret wrapping through the key servers.
//!
//! Wrapping seals the serialized content secret to every configured key
//! server, bound to a policy id. Unwrapping asks servers in order until one
//! releases its share, which needs 1 of N servers to be reachable and to
//! approve the caller.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::key_server::{ApprovalTransaction, KeyReleaseRequest, KeyServer, SharePayload};
use crate::session::SessionKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use suisign_crypto::{from_base64, seal, to_base64, to_hex, Address, SealedEnvelope, SymmetricSecret};
use tracing::{debug, warn};

const ENCRYPTED_OBJECT_VERSION: u8 = 1;

/// One server's sealed copy of the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    pub server_id: String,
    pub envelope: SealedEnvelope,
}

/// A wrapped secret as stored on the ledger and in local records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedObject {
    pub version: u8,
    pub package_id: String,
    /// Policy id (hex) the payload is bound to.
    pub id: String,
    pub threshold: u8,
    pub shares: Vec<KeyShare>,
}

impl EncryptedObject {
    /// Base64 of the JSON encoding.
    pub fn to_base64(&self) -> PipelineResult<String> {
        Ok(to_base64(&serde_json::to_vec(self)?))
    }

    pub fn from_base64(encoded: &str) -> PipelineResult<Self> {
        if encoded.trim().is_empty() {
            return Err(PipelineError::Decode("wrapped secret is empty".to_string()));
        }
        let bytes = from_base64(encoded)
            .map_err(|e| PipelineError::Decode(format!("wrapped secret: {e}")))?;
        let object: Self = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::Decode(format!("wrapped secret: {e}")))?;
        if object.version != ENCRYPTED_OBJECT_VERSION {
            return Err(PipelineError::Decode(format!(
                "unsupported wrapped secret version {}",
                object.version
            )));
        }
        Ok(object)
    }
}

/// Output of [`SealClient::wrap_secret`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrappedSecret {
    pub policy_id: String,
    /// Base64 [`EncryptedObject`].
    pub encoded: String,
}

/// Normalizes a hex policy hint; anything else (or nothing) yields 32 random bytes as hex.
pub fn derive_policy_id(hint: Option<&str>) -> String {
    if let Some(hint) = hint {
        let trimmed = hint.trim();
        let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return raw.to_ascii_lowercase();
        }
        debug!("policy hint is not hex, using a random policy id");
    }
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    to_hex(&bytes)
}

/// Client for the configured key servers.
pub struct SealClient {
    package_id: String,
    threshold: u8,
    servers: Vec<Arc<dyn KeyServer>>,
}

impl SealClient {
    /// Builds a client over `servers`, ordered as in `config.key_server_ids`.
    pub fn new(config: &PipelineConfig, servers: Vec<Arc<dyn KeyServer>>) -> PipelineResult<Self> {
        config.validate()?;
        let mut ordered = Vec::with_capacity(config.key_server_ids.len());
        for id in &config.key_server_ids {
            let server = servers
                .iter()
                .find(|s| s.object_id() == id.as_str())
                .ok_or_else(|| PipelineError::Config(format!("key server {id} is not available")))?;
            ordered.push(server.clone());
        }
        Ok(Self {
            package_id: config.package_id.clone(),
            threshold: config.threshold,
            servers: ordered,
        })
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    /// Seals `secret` to every key server under a policy derived from `policy_hint`.
    ///
    /// `allowed` is enforced by the ledger's approval check, not here; it must
    /// still name at least one address.
    pub fn wrap_secret(
        &self,
        secret: &SymmetricSecret,
        policy_hint: Option<&str>,
        allowed: &[Address],
    ) -> PipelineResult<WrappedSecret> {
        if allowed.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "a wrapped secret needs at least one allowed address".to_string(),
            ));
        }
        let policy_id = derive_policy_id(policy_hint);
        let payload = SharePayload {
            id: policy_id.clone(),
            data: to_base64(&secret.to_payload()?),
        };
        let plaintext = serde_json::to_vec(&payload)?;

        let shares = self
            .servers
            .iter()
            .map(|server| -> PipelineResult<KeyShare> {
                Ok(KeyShare {
                    server_id: server.object_id().to_string(),
                    envelope: seal(&plaintext, &server.public_key())?,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        let object = EncryptedObject {
            version: ENCRYPTED_OBJECT_VERSION,
            package_id: self.package_id.clone(),
            id: policy_id.clone(),
            threshold: self.threshold,
            shares,
        };
        debug!(
            "wrapped secret under policy {policy_id} for {} addresses across {} key servers",
            allowed.len(),
            self.servers.len()
        );
        Ok(WrappedSecret {
            policy_id,
            encoded: object.to_base64()?,
        })
    }

    /// Recovers the secret wrapped in `encoded`, authorizing through `document_id`.
    pub async fn unwrap_secret(
        &self,
        encoded: &str,
        document_id: &str,
        session: &SessionKey,
    ) -> PipelineResult<SymmetricSecret> {
        if !document_id.starts_with("0x") {
            return Err(PipelineError::NotOnChain(document_id.to_string()));
        }
        let object = EncryptedObject::from_base64(encoded)?;
        if object.package_id != self.package_id {
            return Err(PipelineError::Decode(format!(
                "secret was wrapped for package {}",
                object.package_id
            )));
        }
        if session.is_expired() {
            return Err(PipelineError::SessionExpired);
        }

        let approval = ApprovalTransaction::new(&self.package_id, &object.id, document_id);
        let payload = self.request_release(&object, &approval, session).await?;

        SymmetricSecret::from_payload(&payload)
            .map_err(|e| PipelineError::MalformedSecret(e.to_string()))
    }

    async fn request_release(
        &self,
        object: &EncryptedObject,
        approval: &ApprovalTransaction,
        session: &SessionKey,
    ) -> PipelineResult<Vec<u8>> {
        let certificate = session.certificate()?;
        let request_signature = session.sign_request(approval);
        let mut first_error = None;
        let mut unreachable = None;

        for server in &self.servers {
            let Some(share) = object.shares.iter().find(|s| s.server_id == server.object_id()) else {
                continue;
            };
            let request = KeyReleaseRequest {
                approval: approval.clone(),
                certificate: certificate.clone(),
                request_signature: request_signature.clone(),
                share: share.envelope.clone(),
            };
            match server.release(&request).await {
                Ok(payload) => return Ok(payload),
                // Policy decisions are the same on every server; don't ask the rest.
                Err(e @ (PipelineError::NotAuthorized(_) | PipelineError::SessionExpired)) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!("key server {} failed, trying next: {e}", server.object_id());
                    if matches!(e, PipelineError::NetworkUnavailable(_)) {
                        unreachable.get_or_insert(e);
                    } else {
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        // With any server unreachable a retry may still succeed.
        Err(unreachable.or(first_error).unwrap_or_else(|| {
            PipelineError::Decode("no share matches a configured key server".to_string())
        }))
    }
}

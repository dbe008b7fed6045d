//! Per-server share envelopes.
//!
//! When a document secret is wrapped, every configured key server receives
//! its own copy of the share, readable only with that server's X25519 key.
//! The wrapping client seals under a throwaway key, so an envelope carries
//! nothing that links it back to the uploader.

use crate::error::{CryptoError, CryptoResult};
use crypto_box::aead::Aead;
use crypto_box::{Nonce, PublicKey, SalsaBox, SecretKey};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

const NONCE_SIZE: usize = 24;

/// Long-lived X25519 identity of a key server. Clients seal shares to `public`.
pub struct KeyServerKeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyServerKeyPair {
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::generate(&mut OsRng))
    }

    /// Restores a server identity from its persisted secret.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self::from_secret(SecretKey::from(bytes))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Key servers advertise this alongside their object id.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }
}

/// One key server's share, as carried inside an encrypted object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    pub ephemeral_public_key: [u8; 32],
    pub nonce: [u8; NONCE_SIZE],
    /// Includes the Poly1305 tag.
    pub ciphertext: Vec<u8>,
}

/// Seals a share for the key server whose public key is `server_key`.
pub fn seal(share: &[u8], server_key: &[u8; 32]) -> CryptoResult<SealedEnvelope> {
    let ephemeral = SecretKey::generate(&mut OsRng);
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = SalsaBox::new(&PublicKey::from(*server_key), &ephemeral)
        .encrypt(Nonce::from_slice(&nonce), share)
        .map_err(|e| CryptoError::Envelope(format!("sealing share: {e}")))?;

    Ok(SealedEnvelope {
        ephemeral_public_key: *ephemeral.public_key().as_bytes(),
        nonce,
        ciphertext,
    })
}

/// Opens a share on the key server it was sealed to.
///
/// A share meant for another server and a modified envelope are indistinguishable here.
pub fn open(envelope: &SealedEnvelope, server_secret: &SecretKey) -> CryptoResult<Vec<u8>> {
    SalsaBox::new(&PublicKey::from(envelope.ephemeral_public_key), server_secret)
        .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
        .map_err(|_| {
            CryptoError::Envelope("share not sealed to this server, or modified".to_string())
        })
}

//! AES-256-GCM content encryption and SHA-256 content digests.
//!
//! Every document gets a fresh [`SymmetricSecret`]: a 256-bit key and a
//! 96-bit IV drawn from the OS CSPRNG. The IV is carried alongside the key
//! inside the wrapped secret, so ciphertext is stored bare (ciphertext || tag).

use crate::codec::{from_base64, to_base64, to_hex};
use crate::error::{CryptoError, CryptoResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV in bytes.
pub const IV_SIZE: usize = 12;

/// Size of the GCM authentication tag appended to ciphertext.
pub const TAG_SIZE: usize = 16;

/// Per-document symmetric key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricSecret {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl fmt::Debug for SymmetricSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricSecret")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

/// Wire shape of a secret before it is handed to the key service.
#[derive(Serialize, Deserialize)]
struct SecretPayload {
    #[serde(rename = "keyB64")]
    key_b64: String,
    #[serde(rename = "ivB64")]
    iv_b64: String,
}

impl SymmetricSecret {
    pub fn from_parts(key: [u8; KEY_SIZE], iv: [u8; IV_SIZE]) -> Self {
        Self { key, iv }
    }

    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Serializes to the `{"keyB64": .., "ivB64": ..}` JSON payload.
    pub fn to_payload(&self) -> CryptoResult<Vec<u8>> {
        let payload = SecretPayload {
            key_b64: to_base64(&self.key),
            iv_b64: to_base64(&self.iv),
        };
        serde_json::to_vec(&payload).map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Parses a payload produced by [`SymmetricSecret::to_payload`].
    pub fn from_payload(bytes: &[u8]) -> CryptoResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|_| CryptoError::MalformedSecret("payload is not valid JSON".to_string()))?;
        let payload: SecretPayload = serde_json::from_value(value)
            .map_err(|_| CryptoError::MalformedSecret("missing keyB64/ivB64".to_string()))?;

        let key = decode_fixed::<KEY_SIZE>(&payload.key_b64, "key")?;
        let iv = decode_fixed::<IV_SIZE>(&payload.iv_b64, "iv")?;
        Ok(Self { key, iv })
    }
}

fn decode_fixed<const N: usize>(encoded: &str, field: &str) -> CryptoResult<[u8; N]> {
    let mut bytes = from_base64(encoded)
        .map_err(|e| CryptoError::MalformedSecret(format!("{field}: {e}")))?;
    if bytes.len() != N {
        let actual = bytes.len();
        bytes.zeroize();
        return Err(CryptoError::MalformedSecret(format!(
            "{field}: expected {N} bytes, got {actual}"
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(out)
}

/// Generates a fresh key and IV from the OS CSPRNG.
pub fn generate_secret() -> SymmetricSecret {
    let mut key = [0u8; KEY_SIZE];
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    rand::rngs::OsRng.fill_bytes(&mut iv);
    SymmetricSecret { key, iv }
}

/// Encrypts plaintext with AES-256-GCM. Output is ciphertext with the tag appended.
pub fn encrypt(plaintext: &[u8], secret: &SymmetricSecret) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&secret.key));
    cipher
        .encrypt(Nonce::from_slice(&secret.iv), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM encrypt failed: {e}")))
}

/// Decrypts ciphertext produced by [`encrypt`].
///
/// Any tag failure (wrong key, wrong IV, truncation or tampering) is
/// reported as [`CryptoError::Authentication`].
pub fn decrypt(ciphertext: &[u8], secret: &SymmetricSecret) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Authentication);
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&secret.key));
    cipher
        .decrypt(Nonce::from_slice(&secret.iv), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

/// Lowercase hex SHA-256 of plaintext content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps an already-computed hex digest, normalizing case.
    pub fn from_hex(hex: &str) -> Self {
        Self(hex.trim().to_ascii_lowercase())
    }

    /// Returns true if `bytes` hash to this digest.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        digest(bytes) == *self
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the SHA-256 content digest of `bytes`.
pub fn digest(bytes: &[u8]) -> ContentDigest {
    ContentDigest(to_hex(&Sha256::digest(bytes)))
}

//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in encoding, encryption and signing.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD tag mismatch: wrong key, wrong IV or tampered ciphertext.
    #[error("ciphertext failed authentication")]
    Authentication,

    #[error("malformed secret payload: {0}")]
    MalformedSecret(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("envelope error: {0}")]
    Envelope(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

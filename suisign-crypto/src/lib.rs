//! Cryptographic primitives for SuiSign.
//!
//! Provides document-level envelope encryption building blocks:
//! - AES-256-GCM content encryption with a fresh key and IV per document
//! - SHA-256 content digests for post-decryption integrity checks
//! - Chunked hex/base64 codecs for large ciphertexts
//! - X25519 sealed envelopes for key-server shares
//! - ed25519 wallet identities and signatures
//!
//! # Architecture
//!
//! Document bytes are never encrypted to a recipient directly. Instead:
//!
//! 1. **Content secret**: a random key + IV encrypts the document once.
//!    The ciphertext is stored publicly.
//!
//! 2. **Wrapped secret**: the content secret is serialized and sealed to
//!    the key servers, bound to an access policy. Only callers the policy
//!    approves can get it back.

pub mod cipher;
pub mod codec;
pub mod envelope;
mod error;
pub mod identity;

pub use cipher::{
    decrypt, digest, encrypt, generate_secret, ContentDigest, SymmetricSecret, IV_SIZE, KEY_SIZE,
    TAG_SIZE,
};
pub use codec::{from_base64, from_hex, to_base64, to_hex};
pub use envelope::{open, seal, KeyServerKeyPair, SealedEnvelope};
pub use error::{CryptoError, CryptoResult};
pub use identity::{
    verify_personal_message, verify_signature, Address, SignatureBundle, SigningKeyPair,
};

//! Wallet identities and ed25519 signatures.
//!
//! An address is `0x` followed by the hex SHA-256 of the signer's ed25519
//! public key. Addresses are always held in normalized full-width lowercase
//! form so they compare by value everywhere (allow-lists, signer sets, cache keys).

use crate::codec::to_hex;
use crate::error::{CryptoError, CryptoResult};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Normalized on-chain address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parses and normalizes an address: trims, lowercases, requires `0x` and 1-64 hex digits,
    /// then left-pads to the full 64 digits so `0x1` and `0x00…01` compare equal.
    pub fn parse(raw: &str) -> CryptoResult<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        let digits = normalized
            .strip_prefix("0x")
            .ok_or_else(|| CryptoError::InvalidAddress(format!("missing 0x prefix: {raw}")))?;
        if digits.is_empty() || digits.len() > 64 {
            return Err(CryptoError::InvalidAddress(format!(
                "expected 1-64 hex digits: {raw}"
            )));
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CryptoError::InvalidAddress(format!("non-hex digits: {raw}")));
        }
        Ok(Self(format!("0x{digits:0>64}")))
    }

    /// Derives the address controlled by an ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self(format!("0x{}", to_hex(&Sha256::digest(public_key))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Detached signature together with the public key that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBundle {
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
}

/// ed25519 keypair: a wallet, or an ephemeral session key.
///
/// `SigningKey` zeroizes itself on drop.
pub struct SigningKeyPair {
    signing: SigningKey,
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&bytes),
        }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Address controlled by this keypair.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> SignatureBundle {
        let signature: Signature = self.signing.sign(message);
        SignatureBundle {
            public_key: self.public_bytes(),
            signature: signature.to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Verifies `bundle` over `message` with the bundle's own public key.
pub fn verify_signature(message: &[u8], bundle: &SignatureBundle) -> CryptoResult<()> {
    let key = VerifyingKey::from_bytes(&bundle.public_key)
        .map_err(|e| CryptoError::Signature(format!("invalid public key: {e}")))?;
    let signature = Signature::from_slice(&bundle.signature)
        .map_err(|e| CryptoError::Signature(format!("invalid signature encoding: {e}")))?;
    key.verify(message, &signature)
        .map_err(|_| CryptoError::Signature("signature does not verify".to_string()))
}

/// Verifies a wallet's personal-message signature and that the signing key controls `address`.
pub fn verify_personal_message(
    address: &Address,
    message: &[u8],
    bundle: &SignatureBundle,
) -> CryptoResult<()> {
    let signer = Address::from_public_key(&bundle.public_key);
    if signer != *address {
        return Err(CryptoError::Signature(format!(
            "signing key belongs to {signer}, not {address}"
        )));
    }
    verify_signature(message, bundle)
}

//! Pipeline error types.

use suisign_crypto::CryptoError;
use suisign_storage::StorageError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while creating, reading or signing documents.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("session expired")]
    SessionExpired,

    #[error("malformed secret: {0}")]
    MalformedSecret(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// The ledger accepted the transaction but its effects don't identify
    /// exactly one created document.
    #[error("ambiguous creation result: {0}")]
    AmbiguousCreationResult(String),

    #[error("no active wallet identity")]
    NoActiveIdentity,

    #[error("wallet {actual} does not match active identity {expected}")]
    IdentityMismatch { expected: String, actual: String },

    #[error("document only exists locally: {0}")]
    NotOnChain(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("ledger rejected transaction: {0}")]
    Ledger(String),

    #[error("blob store error: {0}")]
    BlobStore(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Coarse failure category, used to pick a recovery action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Configuration,
    Authorization,
    Network,
    Cryptographic,
    DataIntegrity,
    Request,
}

impl PipelineError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Config(_) => FailureClass::Configuration,
            Self::NotAuthorized(_)
            | Self::SessionExpired
            | Self::NoActiveIdentity
            | Self::IdentityMismatch { .. } => FailureClass::Authorization,
            Self::NetworkUnavailable(_) | Self::Http(_) => FailureClass::Network,
            Self::Crypto(CryptoError::Authentication)
            | Self::Crypto(CryptoError::Encryption(_))
            | Self::Crypto(CryptoError::Envelope(_))
            | Self::Crypto(CryptoError::Signature(_))
            | Self::Crypto(CryptoError::InvalidKeyLength { .. }) => FailureClass::Cryptographic,
            Self::MalformedSecret(_)
            | Self::Decode(_)
            | Self::Crypto(_)
            | Self::Serialization(_)
            | Self::Storage(_) => FailureClass::DataIntegrity,
            Self::AmbiguousCreationResult(_)
            | Self::NotOnChain(_)
            | Self::InvalidRequest(_)
            | Self::Ledger(_)
            | Self::BlobStore(_)
            | Self::NotFound(_) => FailureClass::Request,
        }
    }

    /// True when retrying the same call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == FailureClass::Network
    }

    /// Short, action-oriented text suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Config(_) => "the app is misconfigured; contact the operator",
            Self::NetworkUnavailable(_) | Self::Http(_) => "storage unreachable, try again",
            Self::NotAuthorized(_) => "you are not a signer on this document",
            Self::SessionExpired => "your session expired; approve a new one in your wallet",
            Self::NoActiveIdentity | Self::IdentityMismatch { .. } => {
                "connect the wallet for this account first"
            }
            Self::Crypto(CryptoError::Authentication) => {
                "the document could not be authenticated and may have been tampered with"
            }
            Self::MalformedSecret(_) | Self::Decode(_) => "the document's key material is corrupted",
            Self::AmbiguousCreationResult(_) | Self::NotOnChain(_) => {
                "this document only exists locally and cannot be signed or shared"
            }
            Self::InvalidRequest(_) => "check the document details and try again",
            _ => "something went wrong; try again",
        }
    }
}

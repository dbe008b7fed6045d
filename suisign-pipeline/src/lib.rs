//! Document pipeline for SuiSign.
//!
//! Ties the encryption primitives and local projections to the three
//! external systems a document passes through:
//! - Walrus blob store for ciphertext
//! - Seal key servers for the wrapped content secret
//! - Sui ledger for ownership, signer lists and access approval
//!
//! Every external system sits behind a trait ([`BlobStore`], [`KeyServer`],
//! [`Ledger`]) with an HTTP or in-process implementation, so the pipeline
//! runs unchanged against a live network or entirely in memory.

pub mod blob_store;
pub mod config;
pub mod error;
pub mod key_server;
pub mod ledger;
pub mod pipeline;
pub mod reconciler;
pub mod seal;
pub mod session;
pub mod sui_rpc;
pub mod types;
pub mod walrus;

pub use blob_store::{BlobStore, MemoryBlobStore};
pub use config::PipelineConfig;
pub use error::{FailureClass, PipelineError, PipelineResult};
pub use key_server::{KeyServer, LocalKeyServer};
pub use ledger::{extract_document_id, DocumentSource, Ledger, MemoryLedger};
pub use pipeline::DocumentPipeline;
pub use reconciler::{create_reconciler, ReconcileReport, Reconciler, ReconcilerHandle};
pub use seal::SealClient;
pub use session::{LocalWallet, SessionKey, SessionManager, WalletSigner};
pub use sui_rpc::SuiRpcClient;
pub use types::*;
pub use walrus::WalrusClient;

//! Local state for SuiSign.
//!
//! Everything here is an advisory projection of ledger state, persisted
//! through an injected [`KvStore`]:
//!
//! - Per-participant document records (the optimistic tier)
//! - Blob metadata cached by blob id
//! - Signer handle registry used to resolve recipients

mod documents;
mod error;
mod handles;
mod kv;
mod types;

pub use documents::DocumentCache;
pub use error::{StorageError, StorageResult};
pub use handles::{HandleRecord, HandleRegistry};
pub use kv::{DuckKvStore, KvStore, MemoryKvStore};
pub use types::{ContentKind, DocumentRecord, DocumentStatus, StoredBlobMeta};

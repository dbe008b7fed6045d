//! Human-readable signer handles (`alice.sui`) mapped to addresses.

use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use suisign_crypto::Address;
use tracing::warn;

const HANDLES_KEY: &str = "handles";
const HANDLE_SUFFIX: &str = ".sui";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRecord {
    pub handle: String,
    pub address: Address,
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().to_lowercase()
}

#[derive(Clone)]
pub struct HandleRegistry {
    store: Arc<dyn KvStore>,
}

impl HandleRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// All known handles.
    pub fn list(&self) -> StorageResult<Vec<HandleRecord>> {
        let Some(raw) = self.store.get(HANDLES_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("ignoring unreadable handle registry: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Registers `handle` for `address`, replacing any record with the same handle or address.
    pub fn upsert(&self, handle: &str, address: &Address) -> StorageResult<()> {
        let handle = normalize_handle(handle);
        if handle.is_empty() {
            return Err(StorageError::InvalidRecord("empty handle".to_string()));
        }
        let mut records = self.list()?;
        records.retain(|r| r.handle != handle && r.address != *address);
        records.push(HandleRecord {
            handle,
            address: address.clone(),
        });
        self.store.set(HANDLES_KEY, &serde_json::to_string(&records)?)
    }

    /// Looks up a handle exactly as given (after normalization).
    pub fn lookup(&self, handle: &str) -> StorageResult<Option<Address>> {
        let handle = normalize_handle(handle);
        Ok(self
            .list()?
            .into_iter()
            .find(|r| r.handle == handle)
            .map(|r| r.address))
    }

    /// Handle registered for `address`, without the `.sui` suffix.
    pub fn handle_for_address(&self, address: &Address) -> StorageResult<Option<String>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|r| r.address == *address)
            .map(|r| {
                r.handle
                    .strip_suffix(HANDLE_SUFFIX)
                    .map(str::to_string)
                    .unwrap_or(r.handle)
            }))
    }

    /// Resolves a mix of raw addresses and handles into de-duplicated addresses, in input order.
    ///
    /// Handles are tried as `<name>.sui` first, then as given. Unknown handles
    /// are logged and skipped.
    pub fn resolve(&self, inputs: &[String]) -> StorageResult<Vec<Address>> {
        let records = self.list()?;
        let find = |h: &str| records.iter().find(|r| r.handle == h).map(|r| r.address.clone());

        let mut out: Vec<Address> = Vec::new();
        for raw in inputs {
            let input = normalize_handle(raw);
            if input.is_empty() {
                continue;
            }
            let resolved = if input.starts_with("0x") {
                match Address::parse(&input) {
                    Ok(address) => Some(address),
                    Err(e) => {
                        warn!("skipping invalid signer address {input}: {e}");
                        None
                    }
                }
            } else {
                let bare = input.strip_suffix(HANDLE_SUFFIX).unwrap_or(input.as_str());
                let suffixed = format!("{bare}{HANDLE_SUFFIX}");
                find(suffixed.as_str()).or_else(|| find(input.as_str()))
            };

            match resolved {
                Some(address) if !out.contains(&address) => out.push(address),
                Some(_) => {}
                None if !input.starts_with("0x") => warn!("no address registered for handle {input}"),
                None => {}
            }
        }
        Ok(out)
    }
}

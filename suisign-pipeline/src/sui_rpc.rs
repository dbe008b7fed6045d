//! Read-only Sui JSON-RPC client.
//!
//! Fetches document objects and transaction effects from a full node and
//! parses them into the strict typed schema in [`crate::types`].

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ledger::DocumentSource;
use crate::types::{ChainDocument, ChainSignature, TransactionResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use suisign_crypto::Address;
use tracing::{debug, warn};

/// JSON-RPC client for a Sui full node.
pub struct SuiRpcClient {
    client: Client,
    rpc_url: String,
    document_type: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ObjectResponse {
    data: Option<ObjectData>,
    error: Option<ObjectError>,
}

#[derive(Deserialize)]
struct ObjectError {
    code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectData {
    object_id: String,
    content: Option<ObjectContent>,
}

#[derive(Deserialize)]
#[serde(tag = "dataType", rename_all = "camelCase")]
enum ObjectContent {
    MoveObject {
        #[serde(rename = "type")]
        type_: String,
        fields: serde_json::Value,
    },
    Package {},
}

#[derive(Deserialize)]
struct DocumentFields {
    owner: String,
    #[serde(default)]
    signers: Vec<String>,
    #[serde(default)]
    signatures: Vec<RawSignature>,
    #[serde(default)]
    fully_signed: bool,
    #[serde(default)]
    walrus_blob_id: String,
    #[serde(default)]
    walrus_hash_hex: String,
    #[serde(default)]
    seal_secret_id: String,
    #[serde(default)]
    seal_policy_id: Option<String>,
}

/// Move structs inside vectors render either nested under `fields` or flat.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSignature {
    Nested { fields: SignatureFields },
    Flat(SignatureFields),
    Signer(String),
}

#[derive(Deserialize)]
struct SignatureFields {
    signer: String,
    #[serde(default, deserialize_with = "deserialize_u64_from_str_or_num")]
    timestamp_ms: u64,
}

/// Accepts either a JSON number or a string-encoded number (Sui renders u64 as strings).
fn deserialize_u64_from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct U64Visitor;
    impl<'de> de::Visitor<'de> for U64Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a u64 or string-encoded u64")
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> { Ok(v) }
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(de::Error::custom)
        }
        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse().map_err(de::Error::custom)
        }
    }
    deserializer.deserialize_any(U64Visitor)
}

impl RawSignature {
    fn into_chain_signature(self) -> Option<ChainSignature> {
        let (signer, timestamp_ms) = match self {
            Self::Nested { fields } | Self::Flat(fields) => (fields.signer, fields.timestamp_ms),
            Self::Signer(signer) => (signer, 0),
        };
        Address::parse(&signer)
            .ok()
            .map(|signer| ChainSignature { signer, timestamp_ms })
    }
}

impl DocumentFields {
    fn into_chain_document(self, id: String) -> PipelineResult<ChainDocument> {
        let owner = Address::parse(&self.owner)
            .map_err(|e| PipelineError::Decode(format!("document {id} owner: {e}")))?;
        let signers = self
            .signers
            .iter()
            .filter_map(|s| match Address::parse(s) {
                Ok(a) => Some(a),
                Err(e) => {
                    warn!("dropping invalid signer on document {id}: {e}");
                    None
                }
            })
            .collect();
        let signatures = self
            .signatures
            .into_iter()
            .filter_map(RawSignature::into_chain_signature)
            .collect();

        Ok(ChainDocument {
            id,
            owner,
            signers,
            signatures,
            walrus_blob_id: self.walrus_blob_id,
            walrus_hash_hex: self.walrus_hash_hex,
            seal_secret_id: self.seal_secret_id,
            seal_policy_id: self.seal_policy_id.filter(|p| !p.is_empty()),
            fully_signed: self.fully_signed,
        })
    }
}

impl SuiRpcClient {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        if config.sui_rpc_url.trim().is_empty() {
            return Err(PipelineError::Config("sui RPC URL is not configured".to_string()));
        }
        if config.package_id.trim().is_empty() {
            return Err(PipelineError::Config("package id is not set".to_string()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            rpc_url: config.sui_rpc_url.trim().to_string(),
            document_type: config.document_type(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> PipelineResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| PipelineError::NetworkUnavailable(format!("{method}: {e}")))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(PipelineError::NetworkUnavailable(format!(
                "{method}: full node returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::Ledger(format!("{method}: full node returned {status}")));
        }

        let body: RpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| PipelineError::Decode(format!("{method} response: {e}")))?;

        if let Some(err) = body.error {
            return Err(PipelineError::Ledger(format!(
                "{method} failed ({}): {}",
                err.code, err.message
            )));
        }
        body.result
            .ok_or_else(|| PipelineError::Decode(format!("{method} response has no result")))
    }

    // ── Transactions ──

    /// Fetches the object changes of an executed transaction.
    pub async fn get_transaction(&self, digest: &str) -> PipelineResult<TransactionResponse> {
        self.call(
            "sui_getTransactionBlock",
            serde_json::json!([digest, { "showObjectChanges": true }]),
        )
        .await
    }
}

#[async_trait]
impl DocumentSource for SuiRpcClient {
    async fn get_document(&self, document_id: &str) -> PipelineResult<Option<ChainDocument>> {
        if !document_id.starts_with("0x") {
            return Ok(None);
        }

        let resp: ObjectResponse = self
            .call(
                "sui_getObject",
                serde_json::json!([document_id, { "showContent": true, "showType": true }]),
            )
            .await?;

        if let Some(err) = resp.error {
            debug!("object {document_id} unavailable: {}", err.code);
            return Ok(None);
        }
        let Some(data) = resp.data else {
            return Ok(None);
        };

        match data.content {
            Some(ObjectContent::MoveObject { type_, fields }) if type_ == self.document_type => {
                let fields: DocumentFields = serde_json::from_value(fields).map_err(|e| {
                    PipelineError::Decode(format!("document {} fields: {e}", data.object_id))
                })?;
                fields.into_chain_document(data.object_id).map(Some)
            }
            _ => Err(PipelineError::Decode(format!(
                "object {} is not a {}",
                data.object_id, self.document_type
            ))),
        }
    }
}

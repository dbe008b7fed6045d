//! HTTP client for the Walrus publisher and aggregator.
//!
//! Uploads go to the publisher (`PUT /v1/blobs`), reads to the aggregator
//! (`GET /v1/blobs/{id}`). Unreachable hosts and 5xx responses surface as
//! [`PipelineError::NetworkUnavailable`] so callers can offer a retry.

use crate::blob_store::BlobStore;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{StoreOptions, StoredBlob};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Walrus blob store over HTTP.
pub struct WalrusClient {
    client: Client,
    publisher_url: String,
    aggregator_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreResponse {
    newly_created: Option<NewlyCreated>,
    already_certified: Option<AlreadyCertified>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewlyCreated {
    blob_object: BlobObject,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    id: Option<String>,
    blob_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlreadyCertified {
    blob_id: Option<String>,
}

impl StoreResponse {
    fn into_stored_blob(self) -> PipelineResult<StoredBlob> {
        let (blob_id, object_id) = match (self.newly_created, self.already_certified) {
            (Some(created), _) => (created.blob_object.blob_id, created.blob_object.id),
            (None, Some(certified)) => (certified.blob_id, None),
            (None, None) => (None, None),
        };
        let blob_id = blob_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PipelineError::Decode("walrus store response missing blobId".to_string()))?;
        Ok(StoredBlob { blob_id, object_id })
    }
}

/// Maps transport failures and 5xx onto `NetworkUnavailable`.
fn map_send_error(e: reqwest::Error) -> PipelineError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        PipelineError::NetworkUnavailable(e.to_string())
    } else {
        PipelineError::Http(e)
    }
}

fn map_status(status: StatusCode, context: &str) -> PipelineError {
    if status.is_server_error() {
        PipelineError::NetworkUnavailable(format!("{context}: walrus returned {status}"))
    } else if status == StatusCode::NOT_FOUND {
        PipelineError::NotFound(context.to_string())
    } else {
        PipelineError::BlobStore(format!("{context}: walrus returned {status}"))
    }
}

impl WalrusClient {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        let publisher_url = config.walrus_publisher_url.trim().trim_end_matches('/');
        let aggregator_url = config.walrus_aggregator_url.trim().trim_end_matches('/');
        if publisher_url.is_empty() {
            return Err(PipelineError::Config("walrus publisher URL is not configured".to_string()));
        }
        if aggregator_url.is_empty() {
            return Err(PipelineError::Config("walrus aggregator URL is not configured".to_string()));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            publisher_url: publisher_url.to_string(),
            aggregator_url: aggregator_url.to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for WalrusClient {
    async fn put(&self, bytes: Vec<u8>, options: StoreOptions) -> PipelineResult<StoredBlob> {
        let url = format!("{}/v1/blobs", self.publisher_url);
        let size = bytes.len();
        let mut query = vec![("epochs", options.epochs.to_string())];
        if options.permanent {
            query.push(("permanent", "true".to_string()));
        } else {
            query.push(("deletable", "true".to_string()));
        }

        let resp = self
            .client
            .put(&url)
            .query(&query)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(map_send_error)?;

        if !resp.status().is_success() {
            return Err(map_status(resp.status(), "store blob"));
        }

        let parsed: StoreResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Decode(format!("walrus store response: {e}")))?;
        let stored = parsed.into_stored_blob()?;

        debug!("stored walrus blob {} ({size} bytes)", stored.blob_id);
        Ok(stored)
    }

    async fn get(&self, blob_id: &str) -> PipelineResult<Vec<u8>> {
        let mut url = reqwest::Url::parse(&self.aggregator_url)
            .map_err(|e| PipelineError::Config(format!("invalid aggregator URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::Config("aggregator URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v1", "blobs", blob_id]);

        let resp = self.client.get(url).send().await.map_err(map_send_error)?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), &format!("blob {blob_id}")));
        }

        let bytes = resp.bytes().await.map_err(map_send_error)?;
        debug!("fetched walrus blob {blob_id} ({} bytes)", bytes.len());
        Ok(bytes.to_vec())
    }
}

//! Pipeline configuration.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the document pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Walrus publisher base URL (blob uploads).
    pub walrus_publisher_url: String,

    /// Walrus aggregator base URL (blob reads).
    pub walrus_aggregator_url: String,

    /// Sui full-node JSON-RPC URL.
    pub sui_rpc_url: String,

    /// Package id of the on-chain document module.
    pub package_id: String,

    /// Object ids of the key servers, in failover order.
    pub key_server_ids: Vec<String>,

    /// Key servers that must release a share before a secret unwraps.
    pub threshold: u8,

    /// Lifetime of a wallet-signed session, in minutes.
    pub session_ttl_min: i64,

    /// Storage epochs requested for each uploaded blob.
    pub blob_epochs: u32,

    /// How often the reconciler re-reads on-chain document state (seconds).
    pub reconcile_interval_secs: u64,

    /// Per-request HTTP timeout (seconds).
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            walrus_publisher_url: "https://publisher.walrus-testnet.walrus.space".to_string(),
            walrus_aggregator_url: "https://aggregator.walrus-testnet.walrus.space".to_string(),
            sui_rpc_url: "https://fullnode.testnet.sui.io:443".to_string(),
            package_id: String::new(),
            key_server_ids: Vec::new(),
            threshold: 1,
            session_ttl_min: 10,
            blob_epochs: 1,
            reconcile_interval_secs: 15,
            request_timeout_secs: 30,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> PipelineResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("{name} is not a valid number: {raw}")))
}

impl PipelineConfig {
    /// Builds a config from `SUISIGN_*` variables provided by `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PipelineResult<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("SUISIGN_WALRUS_PUBLISHER_URL") {
            config.walrus_publisher_url = v;
        }
        if let Some(v) = lookup("SUISIGN_WALRUS_AGGREGATOR_URL") {
            config.walrus_aggregator_url = v;
        }
        if let Some(v) = lookup("SUISIGN_SUI_RPC_URL") {
            config.sui_rpc_url = v;
        }
        if let Some(v) = lookup("SUISIGN_PACKAGE_ID") {
            config.package_id = v.trim().to_string();
        }
        if let Some(v) = lookup("SUISIGN_KEY_SERVER_IDS") {
            config.key_server_ids = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("SUISIGN_SESSION_TTL_MIN") {
            config.session_ttl_min = parse_var("SUISIGN_SESSION_TTL_MIN", &v)?;
        }
        if let Some(v) = lookup("SUISIGN_BLOB_EPOCHS") {
            config.blob_epochs = parse_var("SUISIGN_BLOB_EPOCHS", &v)?;
        }
        if let Some(v) = lookup("SUISIGN_RECONCILE_INTERVAL_SECS") {
            config.reconcile_interval_secs = parse_var("SUISIGN_RECONCILE_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("SUISIGN_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_var("SUISIGN_REQUEST_TIMEOUT_SECS", &v)?;
        }

        Ok(config)
    }

    /// Builds a config from the process environment.
    pub fn from_env() -> PipelineResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Checks that the pipeline can run with this config. Failures are fatal, not retryable.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.package_id.trim().is_empty() {
            return Err(PipelineError::Config("package id is not set".to_string()));
        }
        if self.key_server_ids.is_empty() {
            return Err(PipelineError::Config("no key servers configured".to_string()));
        }
        if self.threshold != 1 {
            return Err(PipelineError::Config(format!(
                "threshold must be 1, got {}",
                self.threshold
            )));
        }
        if self.session_ttl_min <= 0 {
            return Err(PipelineError::Config("session TTL must be positive".to_string()));
        }
        for (name, url) in [
            ("walrus publisher URL", &self.walrus_publisher_url),
            ("walrus aggregator URL", &self.walrus_aggregator_url),
            ("sui RPC URL", &self.sui_rpc_url),
        ] {
            if url.trim().is_empty() {
                return Err(PipelineError::Config(format!("{name} is not set")));
            }
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_min)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Fully-qualified Move type of the on-chain document object.
    pub fn document_type(&self) -> String {
        format!("{}::document::Document", self.package_id)
    }
}

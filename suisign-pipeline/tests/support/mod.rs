//! Shared in-memory network for pipeline tests.

#![allow(dead_code)]

use std::sync::Arc;
use suisign_crypto::Address;
use suisign_pipeline::{
    ComposeRequest, DocumentPayload, DocumentPipeline, KeyServer, LocalKeyServer, LocalWallet,
    MemoryBlobStore, MemoryLedger, PipelineConfig, SealClient, WalletSigner,
};
use suisign_storage::{DocumentCache, HandleRegistry, KvStore, MemoryKvStore};
use tracing_subscriber::EnvFilter;

pub const PACKAGE_ID: &str = "0x5e115e115e115e115e115e115e115e115e115e115e115e115e115e115e115e11";
pub const SERVER_A: &str = "0x00000000000000000000000000000000000000000000000000000000000000a1";
pub const SERVER_B: &str = "0x00000000000000000000000000000000000000000000000000000000000000b2";

/// Routes pipeline logs to the test writer; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("suisign_pipeline=debug,suisign_storage=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        package_id: PACKAGE_ID.into(),
        key_server_ids: vec![SERVER_A.into(), SERVER_B.into()],
        walrus_publisher_url: "http://publisher.invalid".into(),
        walrus_aggregator_url: "http://aggregator.invalid".into(),
        sui_rpc_url: "http://fullnode.invalid".into(),
        ..PipelineConfig::default()
    }
}

/// One device wired to an in-memory ledger, blob store and two key servers.
pub struct Harness {
    pub pipeline: DocumentPipeline,
    pub ledger: MemoryLedger,
    pub blobs: MemoryBlobStore,
    pub server_a: Arc<LocalKeyServer>,
    pub server_b: Arc<LocalKeyServer>,
    pub store: Arc<MemoryKvStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_key_servers(config, |server| -> Arc<dyn KeyServer> { server })
    }

    /// Lets a test put `wrap_a` in front of the first key server.
    pub fn with_key_servers(
        config: PipelineConfig,
        wrap_a: impl FnOnce(Arc<LocalKeyServer>) -> Arc<dyn KeyServer>,
    ) -> Self {
        init_tracing();
        let ledger = MemoryLedger::new(PACKAGE_ID);
        let blobs = MemoryBlobStore::new();
        let server_a = Arc::new(LocalKeyServer::new(SERVER_A, PACKAGE_ID, Arc::new(ledger.clone())));
        let server_b = Arc::new(LocalKeyServer::new(SERVER_B, PACKAGE_ID, Arc::new(ledger.clone())));
        let servers: Vec<Arc<dyn KeyServer>> = vec![wrap_a(server_a.clone()), server_b.clone()];
        let seal = SealClient::new(&config, servers).expect("seal client");

        let store = Arc::new(MemoryKvStore::new());
        let kv: Arc<dyn KvStore> = store.clone();
        let pipeline = DocumentPipeline::new(
            config,
            Arc::new(blobs.clone()),
            Arc::new(ledger.clone()),
            seal,
            DocumentCache::new(kv.clone()),
            HandleRegistry::new(kv),
        )
        .expect("pipeline");

        Self {
            pipeline,
            ledger,
            blobs,
            server_a,
            server_b,
            store,
        }
    }

    pub fn total_releases(&self) -> usize {
        self.server_a.release_count() + self.server_b.release_count()
    }

    /// Registers `handle.sui` for a fresh wallet.
    pub fn register(&self, handle: &str) -> LocalWallet {
        let wallet = LocalWallet::generate();
        self.pipeline
            .handles()
            .upsert(&format!("{handle}.sui"), &wallet.address())
            .expect("register handle");
        wallet
    }

    /// Makes `wallet` the active identity.
    pub async fn sign_in(&self, wallet: &LocalWallet) {
        self.pipeline.switch_identity(Some(wallet.address())).await;
    }
}

pub fn message_request(sender: &Address, recipients: &[&str], subject: &str, body: &str) -> ComposeRequest {
    ComposeRequest {
        payload: DocumentPayload::Message {
            subject: subject.into(),
            body: body.into(),
        },
        sender: sender.clone(),
        recipients: recipients.iter().map(|r| r.to_string()).collect(),
    }
}

pub fn file_request(sender: &Address, recipients: &[&str], file_name: &str, bytes: &[u8]) -> ComposeRequest {
    ComposeRequest {
        payload: DocumentPayload::File {
            file_name: file_name.into(),
            mime_type: "application/pdf".into(),
            bytes: bytes.to_vec(),
        },
        sender: sender.clone(),
        recipients: recipients.iter().map(|r| r.to_string()).collect(),
    }
}

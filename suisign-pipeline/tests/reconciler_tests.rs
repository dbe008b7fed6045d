mod support;

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use suisign_crypto::{Address, SigningKeyPair};
use suisign_pipeline::reconciler::{merge_chain_state, status_for};
use suisign_pipeline::{
    create_reconciler, ChainDocument, ChainSignature, DocumentSource, MemoryLedger, PipelineError,
    PipelineResult, ReconcileReport, WalletSigner,
};
use suisign_storage::{ContentKind, DocumentCache, DocumentRecord, DocumentStatus};
use support::{message_request, Harness};

fn addr() -> Address {
    SigningKeyPair::generate().address()
}

fn record(signers: Vec<Address>, signed: Vec<Address>, status: DocumentStatus) -> DocumentRecord {
    DocumentRecord {
        object_id: Some("0xd0c".into()),
        blob_id: "blob".into(),
        blob_object_id: None,
        content_digest: String::new(),
        wrapped_secret: String::new(),
        policy_id: "b10b".into(),
        subject: "s".into(),
        message_preview: "p".into(),
        created_at: Utc::now(),
        sender: addr(),
        signers,
        signed_addresses: signed,
        status,
        content: ContentKind::Message,
    }
}

fn chain(signers: Vec<Address>, signed: &[Address], fully_signed: bool) -> ChainDocument {
    ChainDocument {
        id: "0xd0c".into(),
        owner: addr(),
        signers,
        signatures: signed
            .iter()
            .map(|s| ChainSignature {
                signer: s.clone(),
                timestamp_ms: 1,
            })
            .collect(),
        walrus_blob_id: "blob".into(),
        walrus_hash_hex: String::new(),
        seal_secret_id: String::new(),
        seal_policy_id: None,
        fully_signed,
    }
}

// ── status_for ──

#[test]
fn status_from_counts() {
    assert_eq!(status_for(0, 2, false), DocumentStatus::Pending);
    assert_eq!(status_for(1, 2, false), DocumentStatus::Signed);
    assert_eq!(status_for(2, 2, false), DocumentStatus::Completed);
    assert_eq!(status_for(0, 2, true), DocumentStatus::Completed);
}

#[test]
fn no_required_signers_is_never_complete_by_count() {
    assert_eq!(status_for(0, 0, false), DocumentStatus::Pending);
}

// ── merge_chain_state ──

#[test]
fn merge_adds_chain_signatures() {
    let (a, b) = (addr(), addr());
    let local = record(vec![a.clone(), b.clone()], Vec::new(), DocumentStatus::Pending);
    let merged = merge_chain_state(&local, &chain(vec![a.clone(), b.clone()], &[a.clone()], false));

    assert_eq!(merged.signed_addresses, vec![a]);
    assert_eq!(merged.status, DocumentStatus::Signed);
}

#[test]
fn merge_keeps_optimistic_local_signatures() {
    let (a, b) = (addr(), addr());
    let local = record(vec![a.clone(), b.clone()], vec![b.clone()], DocumentStatus::Signed);
    let merged = merge_chain_state(&local, &chain(vec![a.clone(), b.clone()], &[a.clone()], false));

    assert_eq!(merged.signed_addresses, vec![b, a]);
    assert_eq!(merged.status, DocumentStatus::Completed);
}

#[test]
fn merge_never_downgrades_status() {
    let a = addr();
    let local = record(vec![a.clone()], vec![a.clone()], DocumentStatus::Completed);
    let merged = merge_chain_state(&local, &chain(vec![a.clone()], &[], false));
    assert_eq!(merged.status, DocumentStatus::Completed);
    assert_eq!(merged.signed_addresses, vec![a]);
}

#[test]
fn merge_takes_signers_from_chain_unless_empty() {
    let (a, b) = (addr(), addr());
    let local = record(vec![a.clone()], Vec::new(), DocumentStatus::Pending);

    let merged = merge_chain_state(&local, &chain(vec![a.clone(), b.clone()], &[], false));
    assert_eq!(merged.signers, vec![a.clone(), b]);

    let merged = merge_chain_state(&local, &chain(Vec::new(), &[], false));
    assert_eq!(merged.signers, vec![a]);
}

#[test]
fn merge_honours_fully_signed_flag() {
    let (a, b) = (addr(), addr());
    let local = record(vec![a.clone(), b.clone()], Vec::new(), DocumentStatus::Pending);
    let merged = merge_chain_state(&local, &chain(vec![a, b], &[], true));
    assert_eq!(merged.status, DocumentStatus::Completed);
}

#[test]
fn merge_is_idempotent() {
    let (a, b) = (addr(), addr());
    let local = record(vec![a.clone(), b.clone()], vec![b.clone()], DocumentStatus::Signed);
    let onchain = chain(vec![a.clone(), b.clone()], &[a, b], true);

    let once = merge_chain_state(&local, &onchain);
    let twice = merge_chain_state(&once, &onchain);
    assert_eq!(once, twice);
}

// ── poll_once ──

#[tokio::test]
async fn poll_applies_signatures_from_other_devices() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");

    let doc = h
        .pipeline
        .create_document(message_request(&alice.address(), &["bob"], "s", "b"))
        .await
        .unwrap();
    let id = doc.object_id.clone().unwrap();
    h.ledger.record_external_signature(&id, &bob.address()).await.unwrap();

    let (_handle, reconciler) =
        create_reconciler(Arc::new(h.ledger.clone()), h.pipeline.cache().clone(), Duration::from_secs(15));
    let report = reconciler.poll_once(&alice.address()).await.unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            checked: 1,
            updated: 1,
            failed: 0,
        }
    );

    let cached = h.pipeline.cache().find_doc(&alice.address(), &id).unwrap().unwrap();
    assert_eq!(cached.status, DocumentStatus::Completed);
    assert_eq!(cached.signed_addresses, vec![bob.address()]);

    // Nothing left to change.
    let again = reconciler.poll_once(&alice.address()).await.unwrap();
    assert_eq!(again.updated, 0);
}

#[tokio::test]
async fn poll_skips_local_only_records() {
    let h = Harness::new();
    let alice = h.register("alice");
    h.register("bob");
    h.ledger.set_omit_object_changes(true);
    h.pipeline
        .create_document(message_request(&alice.address(), &["bob"], "s", "b"))
        .await
        .unwrap();

    let (_handle, reconciler) =
        create_reconciler(Arc::new(h.ledger.clone()), h.pipeline.cache().clone(), Duration::from_secs(15));
    let report = reconciler.poll_once(&alice.address()).await.unwrap();
    assert_eq!(report.checked, 0);
}

#[tokio::test]
async fn poll_counts_fetch_failures_without_failing() {
    let h = Harness::new();
    let alice = h.register("alice");
    h.register("bob");
    let doc = h
        .pipeline
        .create_document(message_request(&alice.address(), &["bob"], "s", "b"))
        .await
        .unwrap();

    h.ledger.set_offline(true);
    let (_handle, reconciler) =
        create_reconciler(Arc::new(h.ledger.clone()), h.pipeline.cache().clone(), Duration::from_secs(15));
    let report = reconciler.poll_once(&alice.address()).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 0);

    let cached = h.pipeline.cache().find_doc(&alice.address(), doc.doc_key()).unwrap().unwrap();
    assert_eq!(cached, doc);
}

#[tokio::test]
async fn poll_keeps_last_created_record() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");
    let doc = h
        .pipeline
        .create_document(message_request(&alice.address(), &["bob"], "s", "b"))
        .await
        .unwrap();
    h.ledger
        .record_external_signature(doc.object_id.as_deref().unwrap(), &bob.address())
        .await
        .unwrap();

    let (_handle, reconciler) =
        create_reconciler(Arc::new(h.ledger.clone()), h.pipeline.cache().clone(), Duration::from_secs(15));
    reconciler.poll_once(&bob.address()).await.unwrap();

    // The reconciled projection changed, the last-created snapshot did not.
    let last = h.pipeline.cache().last_created().unwrap().unwrap();
    assert_eq!(last, doc);
}

/// Signs locally for `signer` while the chain read is in flight.
struct SignsDuringFetch {
    ledger: MemoryLedger,
    cache: DocumentCache,
    signer: Address,
}

#[async_trait]
impl DocumentSource for SignsDuringFetch {
    async fn get_document(&self, document_id: &str) -> PipelineResult<Option<ChainDocument>> {
        self.cache
            .update_doc(&self.signer, document_id, |d| {
                d.signed_addresses.push(self.signer.clone())
            })
            .unwrap();
        self.ledger.get_document(document_id).await
    }
}

#[tokio::test]
async fn poll_keeps_signature_written_during_fetch() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");
    let carol = h.register("carol");
    let doc = h
        .pipeline
        .create_document(message_request(&alice.address(), &["bob", "carol"], "s", "b"))
        .await
        .unwrap();
    let id = doc.object_id.clone().unwrap();
    h.ledger.record_external_signature(&id, &carol.address()).await.unwrap();

    let source = SignsDuringFetch {
        ledger: h.ledger.clone(),
        cache: h.pipeline.cache().clone(),
        signer: bob.address(),
    };
    let (_handle, reconciler) =
        create_reconciler(Arc::new(source), h.pipeline.cache().clone(), Duration::from_secs(15));
    let report = reconciler.poll_once(&bob.address()).await.unwrap();
    assert_eq!(report.updated, 1);

    let cached = h.pipeline.cache().find_doc(&bob.address(), &id).unwrap().unwrap();
    assert_eq!(cached.signed_addresses, vec![bob.address(), carol.address()]);
    assert_eq!(cached.status, DocumentStatus::Completed);
}

// ── Loop ──

#[tokio::test]
async fn poll_now_requires_identity() {
    let h = Harness::new();
    let (handle, mut reconciler) =
        create_reconciler(Arc::new(h.ledger.clone()), h.pipeline.cache().clone(), Duration::from_secs(15));
    let task = tokio::spawn(async move { reconciler.run().await });

    assert!(matches!(handle.poll_now().await, Err(PipelineError::NoActiveIdentity)));

    handle.stop().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn commands_drive_the_loop() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");
    let doc = h
        .pipeline
        .create_document(message_request(&alice.address(), &["bob"], "s", "b"))
        .await
        .unwrap();
    h.ledger
        .record_external_signature(doc.object_id.as_deref().unwrap(), &bob.address())
        .await
        .unwrap();

    let (handle, mut reconciler) =
        create_reconciler(Arc::new(h.ledger.clone()), h.pipeline.cache().clone(), Duration::from_secs(15));
    let task = tokio::spawn(async move { reconciler.run().await });

    handle.set_identity(Some(alice.address())).await.unwrap();
    let report = handle.poll_now().await.unwrap();
    assert_eq!(report.updated, 1);

    handle.stop().await.unwrap();
    task.await.unwrap();
    assert!(handle.poll_now().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn interval_tick_reconciles_active_identity() {
    let h = Harness::new();
    let alice = h.register("alice");
    let bob = h.register("bob");
    let doc = h
        .pipeline
        .create_document(message_request(&alice.address(), &["bob"], "s", "b"))
        .await
        .unwrap();
    let id = doc.object_id.clone().unwrap();

    let (handle, mut reconciler) =
        create_reconciler(Arc::new(h.ledger.clone()), h.pipeline.cache().clone(), Duration::from_secs(15));
    let task = tokio::spawn(async move { reconciler.run().await });
    handle.set_identity(Some(bob.address())).await.unwrap();

    h.ledger.record_external_signature(&id, &bob.address()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(16)).await;

    let cached = h.pipeline.cache().find_doc(&bob.address(), &id).unwrap().unwrap();
    assert_eq!(cached.status, DocumentStatus::Completed);

    handle.stop().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn dropping_every_handle_stops_the_loop() {
    let h = Harness::new();
    let (handle, mut reconciler) =
        create_reconciler(Arc::new(h.ledger.clone()), h.pipeline.cache().clone(), Duration::from_secs(15));
    let task = tokio::spawn(async move { reconciler.run().await });

    drop(handle);
    task.await.unwrap();
}

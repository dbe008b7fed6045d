//! Reconciles local document records with authoritative on-chain state.
//!
//! Local records are the optimistic tier; the ledger is authoritative. The
//! merge only ever grows the signed set and upgrades status, so a stale
//! fetch can never undo a signature the user already saw.
//!
//! Follows the same loop shape as the cloud sync engine: an interval tick
//! plus a command channel, with per-cycle failures logged and skipped.

use crate::error::{PipelineError, PipelineResult};
use crate::ledger::DocumentSource;
use crate::types::ChainDocument;
use std::sync::Arc;
use std::time::Duration;
use suisign_crypto::Address;
use suisign_storage::{DocumentCache, DocumentRecord, DocumentStatus};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Status implied by a signature count.
pub fn status_for(signed: usize, required: usize, fully_signed: bool) -> DocumentStatus {
    if fully_signed || (required > 0 && signed >= required) {
        DocumentStatus::Completed
    } else if signed > 0 {
        DocumentStatus::Signed
    } else {
        DocumentStatus::Pending
    }
}

/// Merges on-chain state into a local record. Pure and idempotent.
pub fn merge_chain_state(local: &DocumentRecord, chain: &ChainDocument) -> DocumentRecord {
    let mut merged = local.clone();

    for signature in &chain.signatures {
        if !merged.signed_addresses.contains(&signature.signer) {
            merged.signed_addresses.push(signature.signer.clone());
        }
    }
    if !chain.signers.is_empty() {
        merged.signers = chain.signers.clone();
    }

    let computed = status_for(
        merged.signed_addresses.len(),
        merged.signers.len(),
        chain.fully_signed,
    );
    merged.status = local.status.max(computed);
    merged
}

/// Counts from one reconcile pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
}

enum ReconcileCommand {
    SetIdentity(Option<Address>),
    PollNow(oneshot::Sender<PipelineResult<ReconcileReport>>),
    Stop,
}

/// Handle for sending commands to a running reconciler.
#[derive(Clone)]
pub struct ReconcilerHandle {
    command_tx: mpsc::Sender<ReconcileCommand>,
}

fn not_running() -> PipelineError {
    PipelineError::InvalidRequest("reconciler not running".to_string())
}

impl ReconcilerHandle {
    pub async fn set_identity(&self, identity: Option<Address>) -> PipelineResult<()> {
        self.command_tx
            .send(ReconcileCommand::SetIdentity(identity))
            .await
            .map_err(|_| not_running())
    }

    /// Runs a pass immediately and waits for its report.
    pub async fn poll_now(&self) -> PipelineResult<ReconcileReport> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(ReconcileCommand::PollNow(tx))
            .await
            .map_err(|_| not_running())?;
        rx.await.map_err(|_| not_running())?
    }

    pub async fn stop(&self) -> PipelineResult<()> {
        self.command_tx
            .send(ReconcileCommand::Stop)
            .await
            .map_err(|_| not_running())
    }
}

/// Periodically re-reads on-chain documents for the active identity.
pub struct Reconciler {
    source: Arc<dyn DocumentSource>,
    cache: DocumentCache,
    poll_interval: Duration,
    identity: Option<Address>,
    command_rx: mpsc::Receiver<ReconcileCommand>,
}

/// Creates a reconciler and its command handle.
pub fn create_reconciler(
    source: Arc<dyn DocumentSource>,
    cache: DocumentCache,
    poll_interval: Duration,
) -> (ReconcilerHandle, Reconciler) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let reconciler = Reconciler {
        source,
        cache,
        poll_interval,
        identity: None,
        command_rx,
    };
    (ReconcilerHandle { command_tx }, reconciler)
}

impl Reconciler {
    /// Runs the reconcile loop until stopped or every handle is dropped.
    pub async fn run(&mut self) {
        info!("reconciler started, polling every {:?}", self.poll_interval);

        let mut poll_interval = tokio::time::interval(self.poll_interval);
        // Skip first immediate tick
        poll_interval.tick().await;

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if let Some(owner) = self.identity.clone() {
                        if let Err(e) = self.poll_once(&owner).await {
                            warn!("reconcile pass failed: {e}");
                        }
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ReconcileCommand::SetIdentity(identity)) => {
                            debug!("reconciler identity set to {identity:?}");
                            self.identity = identity;
                        }
                        Some(ReconcileCommand::PollNow(reply)) => {
                            let result = match self.identity.clone() {
                                Some(owner) => self.poll_once(&owner).await,
                                None => Err(PipelineError::NoActiveIdentity),
                            };
                            let _ = reply.send(result);
                        }
                        Some(ReconcileCommand::Stop) => {
                            info!("reconciler stopping");
                            break;
                        }
                        None => {
                            info!("command channel closed, stopping reconciler");
                            break;
                        }
                    }
                }
            }
        }

        info!("reconciler stopped");
    }

    /// Reconciles every on-chain record of `owner` once.
    ///
    /// A failed fetch is logged and counted; it never fails the pass.
    pub async fn poll_once(&self, owner: &Address) -> PipelineResult<ReconcileReport> {
        let docs = self.cache.load_docs(owner)?;
        let mut report = ReconcileReport::default();

        for doc in docs {
            let Some(document_id) = doc.object_id.as_deref() else {
                continue;
            };
            report.checked += 1;

            let chain = match self.source.get_document(document_id).await {
                Ok(Some(chain)) => chain,
                Ok(None) => {
                    debug!("document {document_id} not found on chain, leaving local record");
                    continue;
                }
                Err(e) => {
                    warn!("failed to fetch document {document_id}: {e}");
                    report.failed += 1;
                    continue;
                }
            };

            // Merge against the record as it is now: an optimistic signature
            // may have landed while the chain read was in flight.
            let mut changed = false;
            self.cache.update_doc(owner, document_id, |current| {
                let merged = merge_chain_state(current, &chain);
                changed = merged != *current;
                if changed {
                    *current = merged;
                }
            })?;
            if changed {
                report.updated += 1;
            }
        }

        if report.updated > 0 || report.failed > 0 {
            info!(
                "reconciled {} documents for {owner}: {} updated, {} failed",
                report.checked, report.updated, report.failed
            );
        }
        Ok(report)
    }
}

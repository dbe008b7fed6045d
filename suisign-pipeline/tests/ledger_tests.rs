use suisign_crypto::{Address, SigningKeyPair};
use suisign_pipeline::{
    extract_document_id, CreateDocumentRequest, DocumentSource, Ledger, MemoryLedger,
    ObjectChange, PipelineError, TransactionResponse,
};

const PKG: &str = "0xfeed";

fn addr() -> Address {
    SigningKeyPair::generate().address()
}

fn create_request(signers: Vec<Address>) -> CreateDocumentRequest {
    CreateDocumentRequest {
        blob_id: "blob-1".into(),
        hash_hex: "00".repeat(32),
        seal_secret_id: "d3JhcHBlZA==".into(),
        policy_id: "b10b".into(),
        signers,
    }
}

fn created(object_id: &str, object_type: &str) -> ObjectChange {
    ObjectChange::Created {
        object_id: object_id.into(),
        object_type: object_type.into(),
        sender: None,
    }
}

// ── extract_document_id ──

#[test]
fn extract_picks_the_document_among_other_changes() {
    let tx = TransactionResponse {
        digest: "d".into(),
        object_changes: vec![
            ObjectChange::Mutated {
                object_id: "0xgas".into(),
                object_type: "0x2::coin::Coin<0x2::sui::SUI>".into(),
            },
            created("0xcap", &format!("{PKG}::document::AdminCap")),
            created("0xdoc", &format!("{PKG}::document::Document")),
        ],
    };
    assert_eq!(extract_document_id(&tx, PKG).unwrap(), "0xdoc");
}

#[test]
fn extract_ignores_documents_of_other_packages() {
    let tx = TransactionResponse {
        digest: "d".into(),
        object_changes: vec![created("0xdoc", "0xother::document::Document")],
    };
    assert!(matches!(
        extract_document_id(&tx, PKG),
        Err(PipelineError::AmbiguousCreationResult(_))
    ));
}

#[test]
fn extract_with_no_changes_is_ambiguous() {
    let tx = TransactionResponse {
        digest: "d".into(),
        object_changes: Vec::new(),
    };
    assert!(matches!(
        extract_document_id(&tx, PKG),
        Err(PipelineError::AmbiguousCreationResult(_))
    ));
}

#[test]
fn extract_with_two_documents_is_ambiguous() {
    let doc_type = format!("{PKG}::document::Document");
    let tx = TransactionResponse {
        digest: "d".into(),
        object_changes: vec![created("0x1", &doc_type), created("0x2", &doc_type)],
    };
    let err = extract_document_id(&tx, PKG).unwrap_err();
    assert!(err.to_string().contains("more than one"));
}

#[test]
fn transaction_response_tolerates_missing_object_changes() {
    let tx: TransactionResponse = serde_json::from_str(r#"{"digest":"abc"}"#).unwrap();
    assert!(tx.object_changes.is_empty());
}

// ── MemoryLedger rules ──

#[tokio::test]
async fn create_records_document_for_owner() {
    let ledger = MemoryLedger::new(PKG);
    let owner = addr();
    let signer = addr();

    let tx = ledger
        .create_document(&owner, &create_request(vec![signer.clone()]))
        .await
        .unwrap();
    let id = extract_document_id(&tx, PKG).unwrap();
    let doc = ledger.get_document(&id).await.unwrap().unwrap();

    assert_eq!(doc.owner, owner);
    assert_eq!(doc.signers, vec![signer]);
    assert!(doc.signatures.is_empty());
    assert_eq!(doc.seal_policy_id.as_deref(), Some("b10b"));
}

#[tokio::test]
async fn create_without_signers_is_rejected() {
    let ledger = MemoryLedger::new(PKG);
    let err = ledger
        .create_document(&addr(), &create_request(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Ledger(ref m) if m.contains("ENoSigners")));
}

#[tokio::test]
async fn policy_id_binds_a_single_document() {
    let ledger = MemoryLedger::new(PKG);
    ledger
        .create_document(&addr(), &create_request(vec![addr()]))
        .await
        .unwrap();

    let err = ledger
        .create_document(&addr(), &create_request(vec![addr()]))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Ledger(ref m) if m.contains("EPolicyInUse")));
}

#[tokio::test]
async fn omitted_object_changes_make_extraction_ambiguous() {
    let ledger = MemoryLedger::new(PKG);
    ledger.set_omit_object_changes(true);
    let tx = ledger
        .create_document(&addr(), &create_request(vec![addr()]))
        .await
        .unwrap();
    assert!(extract_document_id(&tx, PKG).is_err());
}

#[tokio::test]
async fn sign_by_non_signer_is_rejected() {
    let ledger = MemoryLedger::new(PKG);
    let owner = addr();
    let tx = ledger
        .create_document(&owner, &create_request(vec![addr()]))
        .await
        .unwrap();
    let id = extract_document_id(&tx, PKG).unwrap();

    let err = ledger.sign_document(&owner, &id).await.unwrap_err();
    assert!(err.to_string().contains("ENotSigner"));
}

#[tokio::test]
async fn double_sign_is_rejected() {
    let ledger = MemoryLedger::new(PKG);
    let signer = addr();
    let tx = ledger
        .create_document(&addr(), &create_request(vec![signer.clone()]))
        .await
        .unwrap();
    let id = extract_document_id(&tx, PKG).unwrap();

    ledger.sign_document(&signer, &id).await.unwrap();
    let err = ledger.sign_document(&signer, &id).await.unwrap_err();
    assert!(err.to_string().contains("EAlreadySigned"));
}

#[tokio::test]
async fn fully_signed_after_every_signer() {
    let ledger = MemoryLedger::new(PKG);
    let (a, b) = (addr(), addr());
    let tx = ledger
        .create_document(&addr(), &create_request(vec![a.clone(), b.clone()]))
        .await
        .unwrap();
    let id = extract_document_id(&tx, PKG).unwrap();

    ledger.sign_document(&a, &id).await.unwrap();
    assert!(!ledger.get_document(&id).await.unwrap().unwrap().fully_signed);

    ledger.sign_document(&b, &id).await.unwrap();
    let doc = ledger.get_document(&id).await.unwrap().unwrap();
    assert!(doc.fully_signed);
    assert_eq!(doc.signatures.len(), 2);
}

#[tokio::test]
async fn approve_access_for_participants_only() {
    let ledger = MemoryLedger::new(PKG);
    let (owner, signer, outsider) = (addr(), addr(), addr());
    let tx = ledger
        .create_document(&owner, &create_request(vec![signer.clone()]))
        .await
        .unwrap();
    let id = extract_document_id(&tx, PKG).unwrap();

    ledger.approve_access(&owner, "b10b", &id).await.unwrap();
    ledger.approve_access(&signer, "b10b", &id).await.unwrap();
    assert!(matches!(
        ledger.approve_access(&outsider, "b10b", &id).await,
        Err(PipelineError::NotAuthorized(_))
    ));
}

#[tokio::test]
async fn approve_access_checks_policy_binding() {
    let ledger = MemoryLedger::new(PKG);
    let signer = addr();
    let tx = ledger
        .create_document(&addr(), &create_request(vec![signer.clone()]))
        .await
        .unwrap();
    let id = extract_document_id(&tx, PKG).unwrap();

    assert!(matches!(
        ledger.approve_access(&signer, "0ther", &id).await,
        Err(PipelineError::NotAuthorized(_))
    ));
}

#[tokio::test]
async fn approve_access_for_unknown_document_is_denied() {
    let ledger = MemoryLedger::new(PKG);
    assert!(matches!(
        ledger.approve_access(&addr(), "b10b", "0xmissing").await,
        Err(PipelineError::NotAuthorized(_))
    ));
}

#[tokio::test]
async fn offline_ledger_is_retryable() {
    let ledger = MemoryLedger::new(PKG);
    ledger.set_offline(true);
    let err = ledger.get_document("0x1").await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn external_signature_is_visible() {
    let ledger = MemoryLedger::new(PKG);
    let signer = addr();
    let tx = ledger
        .create_document(&addr(), &create_request(vec![signer.clone()]))
        .await
        .unwrap();
    let id = extract_document_id(&tx, PKG).unwrap();

    ledger.record_external_signature(&id, &signer).await.unwrap();
    let doc = ledger.get_document(&id).await.unwrap().unwrap();
    assert!(doc.has_signed(&signer));
    assert!(doc.fully_signed);
}

use pretty_assertions::assert_eq;
use suisign_crypto::{
    verify_personal_message, verify_signature, Address, CryptoError, SigningKeyPair,
};

// ── Address ──

#[test]
fn parse_normalizes_case_and_whitespace() {
    let a = Address::parse("  0xABCdef  ").unwrap();
    assert_eq!(a.as_str(), format!("0x{}abcdef", "0".repeat(58)));
}

#[test]
fn short_form_equals_full_width() {
    let short = Address::parse("0x1").unwrap();
    let full = Address::parse(&format!("0x{}1", "0".repeat(63))).unwrap();
    assert_eq!(short, full);
    assert_eq!(short.as_str().len(), 66);
}

#[test]
fn parse_rejects_missing_prefix() {
    assert!(matches!(Address::parse("abcdef"), Err(CryptoError::InvalidAddress(_))));
}

#[test]
fn parse_rejects_non_hex_and_bad_length() {
    assert!(Address::parse("0x").is_err());
    assert!(Address::parse("0xnothex").is_err());
    assert!(Address::parse(&format!("0x{}", "a".repeat(65))).is_err());
}

#[test]
fn equal_after_normalization() {
    assert_eq!(Address::parse("0xAB").unwrap(), Address::parse("0xab").unwrap());
}

#[test]
fn serde_as_plain_string_and_validates() {
    let a = Address::parse("0xab").unwrap();
    assert_eq!(serde_json::to_string(&a).unwrap(), format!("\"0x{}ab\"", "0".repeat(62)));
    let back: Address = serde_json::from_str("\"0xAB\"").unwrap();
    assert_eq!(back, a);
    assert!(serde_json::from_str::<Address>("\"alice\"").is_err());
}

#[test]
fn address_from_public_key_is_full_width() {
    let kp = SigningKeyPair::generate();
    let address = kp.address();
    assert_eq!(address.as_str().len(), 66);
    assert_eq!(Address::from_public_key(&kp.public_bytes()), address);
}

// ── Signatures ──

#[test]
fn sign_and_verify() {
    let kp = SigningKeyPair::generate();
    let sig = kp.sign(b"message");
    verify_signature(b"message", &sig).unwrap();
}

#[test]
fn verify_rejects_other_message() {
    let kp = SigningKeyPair::generate();
    let sig = kp.sign(b"message");
    assert!(matches!(
        verify_signature(b"other", &sig),
        Err(CryptoError::Signature(_))
    ));
}

#[test]
fn personal_message_must_come_from_address_owner() {
    let alice = SigningKeyPair::generate();
    let bob = SigningKeyPair::generate();
    let sig = bob.sign(b"session");

    verify_personal_message(&bob.address(), b"session", &sig).unwrap();
    let err = verify_personal_message(&alice.address(), b"session", &sig).unwrap_err();
    assert!(matches!(err, CryptoError::Signature(_)));
}

#[test]
fn keypair_restores_from_secret_bytes() {
    let kp = SigningKeyPair::from_secret_bytes([3u8; 32]);
    let again = SigningKeyPair::from_secret_bytes([3u8; 32]);
    assert_eq!(kp.address(), again.address());
}

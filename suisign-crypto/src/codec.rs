//! Byte/text codecs for ciphertext, digests and secret payloads.
//!
//! Large inputs are processed in bounded chunks so multi-megabyte documents
//! never need a single monolithic intermediate string.

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD, Engine};

/// Chunk size for streaming encodes (32 KiB).
pub const CHUNK_SIZE: usize = 0x8000;

// Base64 works on 3-byte groups in and 4-char groups out; chunks must align
// to those so the pieces concatenate into the single-shot encoding.
const BASE64_IN_CHUNK: usize = CHUNK_SIZE - CHUNK_SIZE % 3;
const BASE64_OUT_CHUNK: usize = CHUNK_SIZE;

/// Lowercase hex encoding.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for chunk in bytes.chunks(CHUNK_SIZE) {
        out.push_str(&hex::encode(chunk));
    }
    out
}

/// Decodes hex, accepting an optional `0x` prefix and either case.
pub fn from_hex(input: &str) -> CryptoResult<Vec<u8>> {
    let trimmed = input.trim();
    let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(raw).map_err(|e| CryptoError::Decode(format!("invalid hex: {e}")))
}

/// Standard-alphabet, padded base64.
pub fn to_base64(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(BASE64_IN_CHUNK) {
        STANDARD.encode_string(chunk, &mut out);
    }
    out
}

/// Decodes standard-alphabet, padded base64.
pub fn from_base64(input: &str) -> CryptoResult<Vec<u8>> {
    let input = input.trim();
    if input.len() % 4 != 0 {
        return Err(CryptoError::Decode(format!(
            "base64 length {} is not a multiple of 4",
            input.len()
        )));
    }
    if let Some(pos) = input.find('=') {
        if pos + 2 < input.len() || input[pos..].bytes().any(|b| b != b'=') {
            return Err(CryptoError::Decode(
                "base64 padding before end of input".to_string(),
            ));
        }
    }

    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    for chunk in input.as_bytes().chunks(BASE64_OUT_CHUNK) {
        STANDARD
            .decode_vec(chunk, &mut out)
            .map_err(|e| CryptoError::Decode(format!("invalid base64: {e}")))?;
    }
    Ok(out)
}

//! Tripcoin cryptographic primitives.
//!
//! Three concerns live here, and nothing else:
//!
//! 1. **Hashing** — SHA-256 over raw bytes, rendered as lowercase hex where
//!    the wire format calls for it.
//! 2. **Identity** — a validator address is `hex(SHA-256(publicKey))`; the
//!    [`Address`] newtype enforces the 64-hex-char shape and carries the
//!    ordering that leader selection depends on.
//! 3. **Signing** — opaque `sign`/`verify` over bytes with ed25519 keys.
//!    Callers never see curve internals; signatures cross the wire as hex
//!    strings (the empty string denotes "not yet signed").
//!
//! Everything above this crate treats these as black boxes: consensus code
//! compares addresses and verifies signatures, it does not do math on keys.

pub mod address;
pub mod keys;

use sha2::{Digest, Sha256};

pub use address::Address;
pub use keys::{Keypair, PublicKey, Signature};

/// Errors from parsing or verifying cryptographic material.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("malformed ed25519 key material")]
    MalformedKey,
    #[error("malformed signature encoding")]
    MalformedSignature,
    #[error("address must be {expected} lowercase hex chars, got {got:?}")]
    MalformedAddress { expected: usize, got: String },
}

/// Convenience result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Compute the SHA-256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest of the concatenation of several byte slices.
///
/// Equivalent to hashing the slices appended in order, without an
/// intermediate allocation.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// SHA-256 rendered as 64 lowercase hex characters.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

//! Validator and account addresses.
//!
//! An address is the lowercase hex rendering of `SHA-256(publicKey)` — 64
//! characters. Addresses order lexicographically; that ordering is part of
//! the consensus contract (leader selection indexes the address-sorted
//! validator sequence), so [`Address`] derives `Ord` on the underlying
//! string and nothing may re-sort by any other key.

use {
    crate::{CryptoError, PublicKey, Result},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Hex characters in a rendered address.
pub const ADDRESS_HEX_LEN: usize = 64;

/// Reserved validator identity of the genesis block.
const SYSTEM: &str = "system";

/// A 32-byte account/validator identity, rendered as lowercase hex.
///
/// The one exception to the 64-hex-char shape is the reserved literal
/// `"system"`, which only ever appears as the validator of the genesis
/// block.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Derive the address of a public key: `hex(SHA-256(pubkey_bytes))`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(crate::sha256_hex(public_key.as_bytes()))
    }

    /// Parse an address from its wire rendering.
    ///
    /// Accepts exactly 64 lowercase hex characters, or the reserved
    /// `"system"` literal.
    pub fn parse(s: &str) -> Result<Self> {
        if s == SYSTEM {
            return Ok(Self(SYSTEM.to_string()));
        }
        let well_formed = s.len() == ADDRESS_HEX_LEN
            && s.chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        if !well_formed {
            return Err(CryptoError::MalformedAddress {
                expected: ADDRESS_HEX_LEN,
                got: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }

    /// The reserved genesis validator identity.
    pub fn system() -> Self {
        Self(SYSTEM.to_string())
    }

    /// Whether this is the reserved genesis identity.
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM
    }

    /// The hex rendering (or `"system"`).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full addresses are noisy in logs; show a short prefix like the
        // conventional 8-char commit abbreviation.
        if f.alternate() || self.0.len() <= 8 {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{}…", &self.0[..8])
        }
    }
}

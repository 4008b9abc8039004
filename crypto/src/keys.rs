//! Ed25519 keypairs, public keys, and signatures.
//!
//! Wire representation is hex everywhere: 64 chars for a public key,
//! 128 for a signature. The empty string is the canonical "unsigned"
//! placeholder used when hashing a block or computing a message's signing
//! bytes, so [`Signature`] never models it — unsigned material simply
//! carries `""` in its string slot.

use {
    crate::{Address, CryptoError, Result},
    ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey},
    rand::rngs::OsRng,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// A validator signing identity.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct a keypair from a 32-byte seed rendered as hex.
    ///
    /// This is how operators provision a stable identity via the
    /// environment.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex)
            .map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                got: bytes.len(),
            })?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// The public half of this identity.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key())
    }

    /// The address derived from the public half.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }

    /// Sign arbitrary bytes.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret material.
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish()
    }
}

/// An ed25519 public key, hex-encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse a public key from its 64-char hex rendering.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                got: bytes.len(),
            })?;
        VerifyingKey::from_bytes(&arr)
            .map(Self)
            .map_err(|_| CryptoError::MalformedKey)
    }

    /// Hex rendering of the key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Verify `signature` over `message`.
    ///
    /// Returns `false` for any failure — a bad signature is not an error
    /// condition at this layer, it is an answer.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.0.verify(message, &signature.0).is_ok()
    }

    /// Verify a hex-encoded signature over `message`.
    ///
    /// Malformed hex (including the empty "unsigned" placeholder) verifies
    /// as `false`.
    pub fn verify_hex(&self, message: &[u8], signature_hex: &str) -> bool {
        match Signature::from_hex(signature_hex) {
            Ok(sig) => self.verify(message, &sig),
            Err(_) => false,
        }
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A detached ed25519 signature, hex-encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    /// Parse a signature from its 128-char hex rendering.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let arr: [u8; 64] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::MalformedSignature)?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&arr)))
    }

    /// Hex rendering of the signature bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }
}

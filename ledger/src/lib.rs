//! Tripcoin ledger records and block authentication.
//!
//! Blocks and transactions are plain serde records; hashing and forging are
//! free functions parameterized by the record — there is no class hierarchy
//! and no virtual dispatch. The [`authenticate`] module is the stateless
//! verifier the consensus replica consults during PRE-PREPARE handling and
//! again at finalization.
//!
//! # Hash / signature convention
//!
//! A block's hash is computed over a preimage whose signature slot is the
//! empty string; the validator signature is then computed over that hash,
//! and the hash is **not** recomputed after signing. Verifiers therefore
//! always recompute the hash with the signature blanked.

pub mod authenticate;
pub mod block;
pub mod transaction;

pub use authenticate::{verify_block, RejectReason, ValidatorKeys, Verdict};
pub use block::{compute_hash, forge, genesis, now_timestamp, Block, BlockType, GENESIS_PARENT_HASH};
pub use transaction::Transaction;

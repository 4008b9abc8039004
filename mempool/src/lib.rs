//! The Tripcoin mempool: a bounded, fee-prioritized pool of admitted but
//! unmined transactions.
//!
//! Admission recomputes the fee from gas, checks shape / duplication /
//! signer balance, and — when the pool is full — sheds the cheapest tenth
//! (by fee density) before retrying. `pick` hands the leader the
//! highest-density entries with a deterministic hash tie-break, and a
//! scheduled sweep evicts entries that outlived the age cap.
//!
//! One lock guards the pool: `pick` takes it shared, every mutation takes
//! it exclusively. Nothing here suspends — balance reads come from an
//! in-memory view.

pub mod config;
pub mod pool;

pub use config::MempoolConfig;
pub use pool::{BalanceView, Mempool};

use tripcoin_crypto::Address;

/// Why a submission was refused. Surfaced to the submitter with a reason;
/// never an error-level log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("malformed transaction: {0}")]
    Malformed(String),
    #[error("transaction {0} already pending")]
    Duplicate(String),
    #[error("balance of {signer:#} too low: need {required}, have {available}")]
    InsufficientBalance {
        signer: Address,
        required: u64,
        available: u64,
    },
    #[error("pool saturated and shedding freed no capacity")]
    Saturated,
}

/// Convenience result type for admission.
pub type Result<T> = std::result::Result<T, AdmissionError>;

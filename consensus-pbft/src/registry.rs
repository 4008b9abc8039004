//! The validator registry snapshot.
//!
//! [`ValidatorSet`] is the authoritative, address-ordered view of the
//! active validators at a given view. The ordering is consensus-critical:
//! leader selection indexes this sequence modulo its length, so every peer
//! must sort by address ascending and nothing else.

use {
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
    tripcoin_crypto::{Address, PublicKey},
};

/// Participation state of a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidatorStatus {
    Active,
    Standby,
    /// Reserved for slashing. The core reads this status but never
    /// transitions a validator into it.
    Penalized,
}

/// One validator's registry record, as persisted under `validators`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorInfo {
    pub address: Address,
    pub public_key: PublicKey,
    pub stake: u64,
    pub reputation: u64,
    /// Unix milliseconds of the last message seen from this validator.
    pub last_active: u64,
    pub status: ValidatorStatus,
}

impl ValidatorInfo {
    /// Whether the address matches the key it claims to belong to.
    /// Records violating this are refused at load time.
    pub fn address_matches_key(&self) -> bool {
        self.address == Address::from_public_key(&self.public_key)
    }
}

/// Address-ordered snapshot of the active validator set.
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    /// ACTIVE validators sorted by address ascending.
    validators: Vec<ValidatorInfo>,
    /// Address → index into `validators`.
    index: HashMap<Address, usize>,
    /// The view this snapshot was taken at.
    view: u64,
    /// Messages tagged beyond `view + view_horizon` are refused until a
    /// refresh catches the snapshot up.
    view_horizon: u64,
}

impl ValidatorSet {
    /// Build a snapshot from registry records.
    ///
    /// Non-ACTIVE records are excluded from the sequence (they cannot vote
    /// or lead); ordering is by address ascending.
    pub fn new(records: Vec<ValidatorInfo>, view: u64, view_horizon: u64) -> Self {
        let mut validators: Vec<ValidatorInfo> = records
            .into_iter()
            .filter(|v| v.status == ValidatorStatus::Active)
            .collect();
        validators.sort_by(|a, b| a.address.cmp(&b.address));
        validators.dedup_by(|a, b| a.address == b.address);

        let index = validators
            .iter()
            .enumerate()
            .map(|(i, v)| (v.address.clone(), i))
            .collect();

        Self {
            validators,
            index,
            view,
            view_horizon,
        }
    }

    /// Number of active validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// The view this snapshot was taken at.
    pub fn view(&self) -> u64 {
        self.view
    }

    /// Quorum size: `⌊2N/3⌋ + 1`. Applied identically to PREPARE, COMMIT,
    /// and VIEW-CHANGE counting.
    pub fn quorum(&self) -> usize {
        2 * self.validators.len() / 3 + 1
    }

    /// Whether a message tagged with `view` is within this snapshot's
    /// horizon.
    pub fn accepts_view(&self, view: u64) -> bool {
        view <= self.view.saturating_add(self.view_horizon)
    }

    pub fn is_active(&self, address: &Address) -> bool {
        self.index.contains_key(address)
    }

    pub fn get(&self, address: &Address) -> Option<&ValidatorInfo> {
        self.index.get(address).map(|&i| &self.validators[i])
    }

    pub fn public_key_of(&self, address: &Address) -> Option<PublicKey> {
        self.get(address).map(|v| v.public_key)
    }

    /// ACTIVE if the local address is in the set, STANDBY otherwise.
    pub fn self_status(&self, local: &Address) -> ValidatorStatus {
        if self.is_active(local) {
            ValidatorStatus::Active
        } else {
            ValidatorStatus::Standby
        }
    }

    /// Record liveness for a validator.
    pub fn touch(&mut self, address: &Address, now_ms: u64) {
        if let Some(&i) = self.index.get(address) {
            self.validators[i].last_active = now_ms;
        }
    }

    /// Iterate validators in canonical (address-ascending) order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidatorInfo> {
        self.validators.iter()
    }

    /// All addresses in canonical order.
    pub fn addresses(&self) -> Vec<Address> {
        self.validators.iter().map(|v| v.address.clone()).collect()
    }

    pub(crate) fn at(&self, index: usize) -> Option<&ValidatorInfo> {
        self.validators.get(index)
    }
}

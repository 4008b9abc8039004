//! Conflicting-vote detection.
//!
//! A correct validator sends at most one PREPARE and one COMMIT per
//! `(height, view)`. Two votes from the same validator at the same slot
//! for different block hashes are recorded as evidence for a future
//! slashing pipeline; the core only collects and reports.

use {
    crate::types::{ConsensusMessage, MessageKind},
    std::collections::HashMap,
    tripcoin_crypto::Address,
};

/// The flavor of conflicting vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    ConflictingPrepare,
    ConflictingCommit,
}

/// Proof that a validator voted for two different blocks at one slot.
#[derive(Debug, Clone)]
pub struct ConflictEvidence {
    pub validator: Address,
    pub height: u64,
    pub view: u64,
    pub kind: EvidenceKind,
    /// First vote seen: (block hash, signature).
    pub vote_a: (String, String),
    /// Conflicting vote: (block hash, signature).
    pub vote_b: (String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VoteSlot {
    height: u64,
    view: u64,
    validator: Address,
    kind: MessageKind,
}

/// Collects first-seen votes and detects conflicts.
#[derive(Default)]
pub struct EvidenceCollector {
    votes: HashMap<VoteSlot, (String, String)>,
    evidence: Vec<ConflictEvidence>,
}

impl EvidenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a PREPARE/COMMIT vote; returns evidence when it conflicts
    /// with an earlier vote from the same validator at the same slot.
    /// Other message kinds pass through untouched.
    pub fn check_and_record(&mut self, message: &ConsensusMessage) -> Option<ConflictEvidence> {
        let (phase, kind) = match message {
            ConsensusMessage::Prepare(m) => (m, EvidenceKind::ConflictingPrepare),
            ConsensusMessage::Commit(m) => (m, EvidenceKind::ConflictingCommit),
            _ => return None,
        };

        let slot = VoteSlot {
            height: phase.block_height,
            view: phase.view,
            validator: phase.validator.clone(),
            kind: message.kind(),
        };
        let vote = (phase.block_hash.clone(), phase.signature.clone());

        match self.votes.get(&slot) {
            Some(existing) if existing.0 != vote.0 => {
                let evidence = ConflictEvidence {
                    validator: phase.validator.clone(),
                    height: phase.block_height,
                    view: phase.view,
                    kind,
                    vote_a: existing.clone(),
                    vote_b: vote,
                };
                self.evidence.push(evidence.clone());
                Some(evidence)
            }
            Some(_) => None, // same vote again; not a conflict
            None => {
                self.votes.insert(slot, vote);
                None
            }
        }
    }

    /// All evidence collected so far.
    pub fn evidence(&self) -> &[ConflictEvidence] {
        &self.evidence
    }

    /// Drop vote bookkeeping below `min_height`. Evidence is kept.
    pub fn prune(&mut self, min_height: u64) {
        self.votes.retain(|slot, _| slot.height >= min_height);
    }
}

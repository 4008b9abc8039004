//! Fuzz the PBFT replica with random message sequences.
//!
//! Goals:
//! - Find panics or invalid state transitions.
//! - Verify that no two different hashes finalize at the same height.
//! - Verify vote tables never exceed the validator count.
//! - Verify the view number never decreases.

#![no_main]

use {
    arbitrary::{Arbitrary, Unstructured},
    libfuzzer_sys::fuzz_target,
    std::{collections::HashMap, sync::Arc},
    tripcoin_consensus_pbft::{
        BlockKey, PbftConfig, PhaseMessage, Replica, ValidatorInfo, ValidatorSet,
        ValidatorStatus, ViewChangeMessage,
    },
    tripcoin_crypto::Keypair,
    tripcoin_ledger::{RejectReason, Verdict},
};

/// A fuzzable action the replica can receive.
#[derive(Debug)]
enum FuzzAction {
    /// Deliver a pre-prepare with an authenticator verdict.
    PrePrepare {
        signer_idx: usize,
        hash_idx: u8,
        verdict_idx: u8,
    },
    /// Deliver a prepare vote.
    Prepare { signer_idx: usize, hash_idx: u8 },
    /// Deliver a commit vote.
    Commit { signer_idx: usize, hash_idx: u8 },
    /// Deliver a view-change vote.
    ViewChange { signer_idx: usize, target: u64 },
    /// Fire the view-change assembly timer.
    TimerFire,
    /// Start the view-change path (leader silence).
    LeaderSilent,
}

impl<'a> Arbitrary<'a> for FuzzAction {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let variant = u.int_in_range(0..=5)?;
        match variant {
            0 => Ok(FuzzAction::PrePrepare {
                signer_idx: u.int_in_range(0..=7)?,
                hash_idx: u.int_in_range(0..=3)?,
                verdict_idx: u.int_in_range(0..=2)?,
            }),
            1 => Ok(FuzzAction::Prepare {
                signer_idx: u.int_in_range(0..=7)?,
                hash_idx: u.int_in_range(0..=3)?,
            }),
            2 => Ok(FuzzAction::Commit {
                signer_idx: u.int_in_range(0..=7)?,
                hash_idx: u.int_in_range(0..=3)?,
            }),
            3 => Ok(FuzzAction::ViewChange {
                signer_idx: u.int_in_range(0..=7)?,
                target: u.int_in_range(1..=16)?,
            }),
            4 => Ok(FuzzAction::TimerFire),
            5 => Ok(FuzzAction::LeaderSilent),
            _ => unreachable!(),
        }
    }
}

const HASHES: [&str; 4] = ["aaaa", "bbbb", "cccc", "dddd"];

fn phase(signer: &Keypair, height: u64, hash: &str, view: u64) -> PhaseMessage {
    PhaseMessage {
        block_height: height,
        block_hash: hash.to_string(),
        validator: signer.address(),
        view,
        signature: String::new(),
    }
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);

    let num_validators: usize = match u.int_in_range(4..=8) {
        Ok(n) => n,
        Err(_) => return,
    };

    // Deterministic identities so the corpus stays stable.
    let keypairs: Vec<Arc<Keypair>> = (0..num_validators)
        .map(|i| {
            let seed = format!("{:02x}", i as u8 + 1).repeat(32);
            Arc::new(Keypair::from_seed_hex(&seed).expect("seed"))
        })
        .collect();
    let mut sorted = keypairs.clone();
    sorted.sort_by_key(|kp| kp.address());

    let records: Vec<ValidatorInfo> = sorted
        .iter()
        .map(|kp| ValidatorInfo {
            address: kp.address(),
            public_key: kp.public_key(),
            stake: 100,
            reputation: 0,
            last_active: 0,
            status: ValidatorStatus::Active,
        })
        .collect();
    let set = ValidatorSet::new(records, 0, 100);

    let mut replica = Replica::new(PbftConfig::default(), sorted[0].clone(), set);

    // Invariant tracking.
    let mut finalized_at: HashMap<u64, String> = HashMap::new();
    let mut last_view = replica.current_view();

    let num_actions: usize = u.int_in_range(1..=200).unwrap_or(50);
    for _ in 0..num_actions {
        let action: FuzzAction = match u.arbitrary() {
            Ok(action) => action,
            Err(_) => break,
        };

        let height = replica.last_executed() + 1;
        let view = replica.current_view();

        let output = match action {
            FuzzAction::PrePrepare {
                signer_idx,
                hash_idx,
                verdict_idx,
            } => {
                let signer = &sorted[signer_idx % num_validators];
                let verdict = match verdict_idx {
                    0 => Verdict::Accepted,
                    1 => Verdict::UnknownParent,
                    _ => Verdict::Rejected(RejectReason::HashMismatch),
                };
                let hash = HASHES[hash_idx as usize % HASHES.len()];
                replica.handle_pre_prepare(phase(signer, height, hash, view), verdict)
            }
            FuzzAction::Prepare { signer_idx, hash_idx } => {
                let signer = &sorted[signer_idx % num_validators];
                let hash = HASHES[hash_idx as usize % HASHES.len()];
                replica.handle_prepare(phase(signer, height, hash, view))
            }
            FuzzAction::Commit { signer_idx, hash_idx } => {
                let signer = &sorted[signer_idx % num_validators];
                let hash = HASHES[hash_idx as usize % HASHES.len()];
                replica.handle_commit(phase(signer, height, hash, view))
            }
            FuzzAction::ViewChange { signer_idx, target } => {
                let signer = &sorted[signer_idx % num_validators];
                replica.handle_view_change(ViewChangeMessage {
                    block_height: 0,
                    block_hash: String::new(),
                    validator: signer.address(),
                    view,
                    signature: String::new(),
                    new_view: target,
                    last_prepared_seq_num: 0,
                    view_change_proof: Vec::new(),
                })
            }
            FuzzAction::TimerFire => {
                let _ = replica.view_change_timer_fired();
                Default::default()
            }
            FuzzAction::LeaderSilent => replica.start_view_change(),
        };

        // 1. Safety: one hash per finalized height.
        if let Some(key) = output.finalize {
            if let Some(existing) = finalized_at.get(&key.height) {
                assert_eq!(
                    existing, &key.hash,
                    "SAFETY VIOLATION: two hashes finalized at height {}",
                    key.height
                );
            } else {
                finalized_at.insert(key.height, key.hash.clone());
            }
            replica.complete_finalize(&key);
        }

        // 2. Bounded tables.
        for hash in HASHES {
            let key = BlockKey::new(height, hash);
            assert!(replica.prepare_count(&key) <= num_validators);
            assert!(replica.commit_count(&key) <= num_validators);
        }

        // 3. Monotonic views.
        assert!(
            replica.current_view() >= last_view,
            "view went backwards: {} -> {}",
            last_view,
            replica.current_view()
        );
        last_view = replica.current_view();
    }
});

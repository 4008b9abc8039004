//! Property-based tests for PBFT safety invariants.
//!
//! Properties tested:
//! 1. Agreement: all replicas that finalize a height finalize the same
//!    hash, under any delivery order and any amount of duplication.
//! 2. Bounded tables: vote tables never exceed N entries and never count
//!    a validator twice.
//! 3. A single equivocating leader cannot split finality at a height.
//! 4. View numbers are monotonic non-decreasing per replica.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        std::{collections::VecDeque, sync::Arc},
        tripcoin_consensus_pbft::{
            sign_message, BlockKey, ConsensusMessage, MessageKind, PbftConfig, PhaseMessage,
            Replica, ValidatorInfo, ValidatorSet, ValidatorStatus, ViewChangeMessage,
        },
        tripcoin_crypto::Keypair,
        tripcoin_ledger::Verdict,
    };

    // ── Helpers ─────────────────────────────────────────────────────────

    struct Cluster {
        keypairs: Vec<Arc<Keypair>>,
        set: ValidatorSet,
    }

    impl Cluster {
        /// Keypairs are index-aligned with the address-sorted sequence, so
        /// keypairs[v] leads view v.
        fn new(n: usize) -> Self {
            let mut keypairs: Vec<Arc<Keypair>> =
                (0..n).map(|_| Arc::new(Keypair::generate())).collect();
            keypairs.sort_by_key(|kp| kp.address());
            let records: Vec<ValidatorInfo> = keypairs
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
            Self { keypairs, set }
        }

        fn replica(&self, index: usize) -> Replica {
            Replica::new(
                PbftConfig::default(),
                self.keypairs[index].clone(),
                self.set.clone(),
            )
        }

        fn signed_phase(
            &self,
            kind: MessageKind,
            signer: usize,
            height: u64,
            hash: &str,
            view: u64,
        ) -> ConsensusMessage {
            let phase = PhaseMessage {
                block_height: height,
                block_hash: hash.to_string(),
                validator: self.keypairs[signer].address(),
                view,
                signature: String::new(),
            };
            let mut message = match kind {
                MessageKind::PrePrepare => ConsensusMessage::PrePrepare(phase),
                MessageKind::Prepare => ConsensusMessage::Prepare(phase),
                MessageKind::Commit => ConsensusMessage::Commit(phase),
                _ => panic!("phase kinds only"),
            };
            sign_message(&mut message, &self.keypairs[signer]);
            message
        }
    }

    /// Admit + dispatch one message on a replica; honest blocks always
    /// authenticate. Returns the handler output's broadcast set and any
    /// finalized key.
    fn step(
        replica: &mut Replica,
        message: &ConsensusMessage,
        clock: u64,
    ) -> (Vec<ConsensusMessage>, Option<BlockKey>) {
        if replica.admit(message, clock).is_err() {
            return (Vec::new(), None);
        }
        let output = match message.clone() {
            ConsensusMessage::PrePrepare(m) => replica.handle_pre_prepare(m, Verdict::Accepted),
            ConsensusMessage::Prepare(m) => replica.handle_prepare(m),
            ConsensusMessage::Commit(m) => replica.handle_commit(m),
            ConsensusMessage::ViewChange(m) => replica.handle_view_change(m),
            ConsensusMessage::NewView(m) => replica.handle_new_view(m),
        };
        (output.broadcast, output.finalize)
    }

    /// Run one honest height-1 round across `n` replicas with the given
    /// delivery schedule; returns the hash each replica finalized.
    fn run_honest_round(n: usize, schedule: &[usize], duplicate: bool) -> Vec<Option<String>> {
        let cluster = Cluster::new(n);
        let mut replicas: Vec<Replica> = (0..n).map(|i| cluster.replica(i)).collect();
        let mut finalized: Vec<Option<String>> = vec![None; n];

        let pre_prepare = cluster.signed_phase(MessageKind::PrePrepare, 0, 1, "h1", 0);
        let mut queue: VecDeque<(usize, ConsensusMessage)> = VecDeque::new();
        for target in 0..n {
            queue.push_back((target, pre_prepare.clone()));
            if duplicate {
                queue.push_back((target, pre_prepare.clone()));
            }
        }

        let mut tick: u64 = 0;
        while let Some(position) = (!queue.is_empty()).then(|| {
            schedule.get(tick as usize).copied().unwrap_or(0) % queue.len()
        }) {
            let (target, message) = queue.remove(position).expect("position in range");
            tick += 1;
            if tick > 100_000 {
                panic!("simulation did not quiesce");
            }

            let (broadcast, finalize) = step(&mut replicas[target], &message, tick);
            for emitted in broadcast {
                for peer in 0..n {
                    queue.push_back((peer, emitted.clone()));
                    if duplicate {
                        queue.push_back((peer, emitted.clone()));
                    }
                }
            }
            if let Some(key) = finalize {
                if finalized[target].is_none() {
                    finalized[target] = Some(key.hash.clone());
                    replicas[target].complete_finalize(&key);
                }
            }

            // Bounded tables at every step.
            let key = BlockKey::new(1, "h1");
            assert!(replicas[target].prepare_count(&key) <= n);
            assert!(replicas[target].commit_count(&key) <= n);
        }

        finalized
    }

    // ── Properties ──────────────────────────────────────────────────────

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Any delivery order finalizes the proposed block on every
        /// replica, and everyone agrees on the hash.
        #[test]
        fn prop_honest_round_reaches_agreement(
            schedule in prop::collection::vec(0usize..1_000, 64..256),
            duplicate in any::<bool>(),
        ) {
            let finalized = run_honest_round(4, &schedule, duplicate);
            for outcome in &finalized {
                prop_assert_eq!(outcome.as_deref(), Some("h1"));
            }
        }

        /// Same property at other cluster sizes.
        #[test]
        fn prop_agreement_across_cluster_sizes(
            n in 4usize..8,
            schedule in prop::collection::vec(0usize..1_000, 64..256),
        ) {
            let finalized = run_honest_round(n, &schedule, false);
            for outcome in &finalized {
                prop_assert_eq!(outcome.as_deref(), Some("h1"));
            }
        }

        /// Views never go backwards, whatever view-change traffic arrives.
        #[test]
        fn prop_views_are_monotonic(
            targets in prop::collection::vec((0usize..4, 1u64..6), 1..40),
            fire_after in prop::collection::vec(any::<bool>(), 1..40),
        ) {
            let cluster = Cluster::new(4);
            let mut replica = cluster.replica(0);
            let mut last_view = replica.current_view();

            for (i, (signer, target)) in targets.iter().enumerate() {
                let mut message = ConsensusMessage::ViewChange(ViewChangeMessage {
                    block_height: 0,
                    block_hash: String::new(),
                    validator: cluster.keypairs[*signer].address(),
                    view: 0,
                    signature: String::new(),
                    new_view: *target,
                    last_prepared_seq_num: 0,
                    view_change_proof: Vec::new(),
                });
                sign_message(&mut message, &cluster.keypairs[*signer]);

                if let ConsensusMessage::ViewChange(vc) = message {
                    replica.handle_view_change(vc);
                }
                if fire_after.get(i).copied().unwrap_or(false) {
                    let _ = replica.view_change_timer_fired();
                }

                prop_assert!(replica.current_view() >= last_view);
                last_view = replica.current_view();
            }
        }
    }

    // ── Byzantine equivocation (deterministic) ──────────────────────────

    /// A Byzantine leader proposes two blocks at height 1 to different
    /// replicas. At most one hash may finalize anywhere.
    #[test]
    fn test_equivocating_leader_cannot_split_finality() {
        let cluster = Cluster::new(4);
        // Replicas 1..3 are honest; index 0 (the view-0 leader) is the
        // attacker and runs no engine.
        let mut replicas: Vec<Replica> = (1..4).map(|i| cluster.replica(i)).collect();
        let mut finalized: Vec<Option<String>> = vec![None; 3];

        let pp_a = cluster.signed_phase(MessageKind::PrePrepare, 0, 1, "aaaa", 0);
        let pp_b = cluster.signed_phase(MessageKind::PrePrepare, 0, 1, "bbbb", 0);

        let mut queue: VecDeque<(usize, ConsensusMessage)> = VecDeque::new();
        // Split delivery: replicas 1 and 2 see block A, replica 3 sees B.
        queue.push_back((0, pp_a.clone()));
        queue.push_back((1, pp_a));
        queue.push_back((2, pp_b));
        // The attacker votes for both blocks everywhere.
        for hash in ["aaaa", "bbbb"] {
            for kind in [MessageKind::Prepare, MessageKind::Commit] {
                let vote = cluster.signed_phase(kind, 0, 1, hash, 0);
                for target in 0..3 {
                    queue.push_back((target, vote.clone()));
                }
            }
        }

        let mut tick = 0u64;
        while let Some((target, message)) = queue.pop_front() {
            tick += 1;
            assert!(tick < 100_000, "simulation did not quiesce");
            let (broadcast, finalize) = step(&mut replicas[target], &message, tick);
            for emitted in broadcast {
                for peer in 0..3 {
                    queue.push_back((peer, emitted.clone()));
                }
            }
            if let Some(key) = finalize {
                if finalized[target].is_none() {
                    finalized[target] = Some(key.hash.clone());
                    replicas[target].complete_finalize(&key);
                }
            }
        }

        let distinct: std::collections::HashSet<&String> =
            finalized.iter().flatten().collect();
        assert!(
            distinct.len() <= 1,
            "two different hashes finalized at height 1: {distinct:?}"
        );
    }
}

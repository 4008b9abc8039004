//! Shared helpers for the validator-core benchmarks.

use {
    std::sync::Arc,
    tripcoin_consensus_pbft::{
        sign_message, ConsensusMessage, MessageKind, PbftConfig, PhaseMessage, Replica,
        ValidatorInfo, ValidatorSet, ValidatorStatus,
    },
    tripcoin_crypto::{Address, Keypair},
    tripcoin_ledger::Transaction,
};

/// `n` validators, keypairs index-aligned with the address-sorted set.
pub fn make_cluster(n: usize) -> (Vec<Arc<Keypair>>, ValidatorSet) {
    let mut keypairs: Vec<Arc<Keypair>> =
        (0..n).map(|_| Arc::new(Keypair::generate())).collect();
    keypairs.sort_by_key(|kp| kp.address());
    let records: Vec<ValidatorInfo> = keypairs
        .iter()
        .map(|kp| ValidatorInfo {
            address: kp.address(),
            public_key: kp.public_key(),
            stake: 1_000_000,
            reputation: 0,
            last_active: 0,
            status: ValidatorStatus::Active,
        })
        .collect();
    let set = ValidatorSet::new(records, 0, 100);
    (keypairs, set)
}

pub fn make_replica(keypair: Arc<Keypair>, set: ValidatorSet) -> Replica {
    Replica::new(PbftConfig::default(), keypair, set)
}

/// A signed block-phase message from `signer`.
pub fn signed_phase(
    kind: MessageKind,
    signer: &Keypair,
    height: u64,
    hash: &str,
    view: u64,
) -> ConsensusMessage {
    let phase = PhaseMessage {
        block_height: height,
        block_hash: hash.to_string(),
        validator: signer.address(),
        view,
        signature: String::new(),
    };
    let mut message = match kind {
        MessageKind::PrePrepare => ConsensusMessage::PrePrepare(phase),
        MessageKind::Prepare => ConsensusMessage::Prepare(phase),
        MessageKind::Commit => ConsensusMessage::Commit(phase),
        _ => panic!("phase kinds only"),
    };
    sign_message(&mut message, signer);
    message
}

/// A well-formed transaction with the given fee density inputs.
pub fn make_tx(seq: u32, gas_limit: u64, size: u64) -> Transaction {
    Transaction {
        hash: format!("{seq:08x}").repeat(8),
        from: Address::parse(&"aa".repeat(32)).expect("address"),
        to: Address::parse(&"bb".repeat(32)).expect("address"),
        amount: 1,
        gas_limit,
        size,
        fee: 0,
    }
}

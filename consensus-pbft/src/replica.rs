//! The PBFT replica state machine.
//!
//! The replica is deterministic and does no I/O. Message admission
//! (signature, view, leader, duplicate rules) happens at ingress before a
//! message is enqueued; the phase handlers run post-queue and perform only
//! state-table updates and quorum-crossing side effects, so at-least-once
//! delivery from the stream is harmless. Each handler returns a
//! [`ReplicaOutput`] telling the node layer what to broadcast, finalize,
//! buffer, or replay.
//!
//! Once-guards (`sent_prepare`, `sent_commit`) make vote emission
//! exactly-once per `(view, height)` no matter how many times the
//! triggering message is redelivered.

use {
    crate::{
        config::PbftConfig,
        evidence::EvidenceCollector,
        registry::ValidatorSet,
        schedule,
        types::{
            sign_message, verify_message, BlockKey, ConsensusMessage, MessageKind,
            NewViewMessage, PhaseMessage, ViewChangeMessage,
        },
    },
    log::{debug, info, warn},
    std::{
        collections::{BTreeMap, HashMap, HashSet},
        sync::Arc,
    },
    tripcoin_crypto::{Address, Keypair},
    tripcoin_ledger::Verdict,
};

/// Why an incoming message was silently dropped at admission.
///
/// Each reason has a counter in the node's metrics; none of them are
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The claimed sender is not in the active registry snapshot.
    UnknownValidator,
    /// Signature did not verify against the sender's registered key.
    BadSignature,
    /// Block-phase message tagged with a view below the current one.
    StaleView,
    /// Block-phase message for an already-finalized height.
    StaleHeight,
    /// Message view exceeds the registry snapshot's horizon.
    ViewBeyondHorizon,
    /// PRE-PREPARE from someone other than the current leader.
    NotLeader,
    /// First-writer-wins: this sender already occupies the table slot.
    Duplicate,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            DropReason::UnknownValidator => "unknown_validator",
            DropReason::BadSignature => "bad_signature",
            DropReason::StaleView => "stale_view",
            DropReason::StaleHeight => "stale_height",
            DropReason::ViewBeyondHorizon => "view_beyond_horizon",
            DropReason::NotLeader => "not_leader",
            DropReason::Duplicate => "duplicate",
        };
        write!(f, "{tag}")
    }
}

/// What an admitted message tells the caller beyond "accepted".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    /// Whether the sender is the current leader — the caller resets the
    /// leader-silence timer iff so.
    pub from_current_leader: bool,
}

/// Side effects requested by a handler.
#[derive(Debug, Default)]
pub struct ReplicaOutput {
    /// Messages to broadcast to peers and enqueue locally.
    pub broadcast: Vec<ConsensusMessage>,
    /// A block whose PREPARE and COMMIT quorums are both met.
    pub finalize: Option<BlockKey>,
    /// A PRE-PREPARE whose block has no locally-known parent; the caller
    /// buffers it and retries after a parent-gap recovery.
    pub parent_gap: Option<BlockKey>,
    /// The view installed by a completed transition or NEW_VIEW.
    pub adopted_view: Option<u64>,
    /// PRE-PREPAREs from a NEW_VIEW, to re-run through the ordinary
    /// PRE-PREPARE path.
    pub replay: Vec<ConsensusMessage>,
}

impl ReplicaOutput {
    fn empty() -> Self {
        Self::default()
    }
}

/// Result of the view-change assembly timer firing.
#[derive(Debug)]
pub enum ViewChangeTick {
    /// No view change is in flight.
    Idle,
    /// Quorum reached: the transition completed.
    Completed { view: u64, is_primary: bool },
    /// Quorum not reached: escalated to the next view; broadcast the new
    /// VIEW_CHANGE and restart the assembly timer.
    Escalated { target: u64, output: ReplicaOutput },
}

/// The per-replica PBFT state machine.
pub struct Replica {
    config: PbftConfig,
    keypair: Arc<Keypair>,
    local: Address,
    registry: ValidatorSet,

    current_view: u64,
    is_primary: bool,
    is_view_changing: bool,
    /// The view a running view change is assembling votes for.
    pending_view: Option<u64>,
    last_executed: u64,

    /// Blocks with an open consensus round.
    processing: HashSet<BlockKey>,
    pre_prepare: HashMap<BlockKey, BTreeMap<Address, ConsensusMessage>>,
    prepare: HashMap<BlockKey, BTreeMap<Address, ConsensusMessage>>,
    commit: HashMap<BlockKey, BTreeMap<Address, ConsensusMessage>>,
    view_change: HashMap<u64, BTreeMap<Address, ConsensusMessage>>,

    /// `(view, height)` pairs this replica has already voted PREPARE for.
    /// Keyed by height, not block: one PREPARE per slot per view is what
    /// keeps an equivocating leader from assembling two quorums.
    sent_prepare: HashSet<(u64, u64)>,
    /// `(view, height)` pairs this replica has already voted COMMIT for.
    sent_commit: HashSet<(u64, u64)>,

    evidence: EvidenceCollector,
}

impl Replica {
    pub fn new(config: PbftConfig, keypair: Arc<Keypair>, registry: ValidatorSet) -> Self {
        let local = keypair.address();
        let is_primary = schedule::is_leader(&registry, &local, 0);
        Self {
            config,
            keypair,
            local,
            registry,
            current_view: 0,
            is_primary,
            is_view_changing: false,
            pending_view: None,
            last_executed: 0,
            processing: HashSet::new(),
            pre_prepare: HashMap::new(),
            prepare: HashMap::new(),
            commit: HashMap::new(),
            view_change: HashMap::new(),
            sent_prepare: HashSet::new(),
            sent_commit: HashSet::new(),
            evidence: EvidenceCollector::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn local_address(&self) -> &Address {
        &self.local
    }

    pub fn current_view(&self) -> u64 {
        self.current_view
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn is_view_changing(&self) -> bool {
        self.is_view_changing
    }

    pub fn last_executed(&self) -> u64 {
        self.last_executed
    }

    pub fn registry(&self) -> &ValidatorSet {
        &self.registry
    }

    pub fn quorum(&self) -> usize {
        self.registry.quorum()
    }

    pub fn config(&self) -> &PbftConfig {
        &self.config
    }

    pub fn evidence(&self) -> &EvidenceCollector {
        &self.evidence
    }

    pub fn prepare_count(&self, key: &BlockKey) -> usize {
        self.prepare.get(key).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn commit_count(&self, key: &BlockKey) -> usize {
        self.commit.get(key).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn view_change_count(&self, view: u64) -> usize {
        self.view_change.get(&view).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_processing(&self, key: &BlockKey) -> bool {
        self.processing.contains(key)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Seed the execution watermark from the persisted chain height.
    pub fn bootstrap(&mut self, chain_height: u64) {
        self.last_executed = chain_height;
    }

    /// Install a fresh registry snapshot and recompute the local role.
    pub fn update_registry(&mut self, registry: ValidatorSet) {
        self.registry = registry;
        self.refresh_role();
    }

    fn refresh_role(&mut self) {
        self.is_primary = schedule::is_leader(&self.registry, &self.local, self.current_view);
    }

    // ── Admission (ingress path) ────────────────────────────────────────

    /// Screen an incoming message before it is enqueued.
    ///
    /// Order: view horizon, registry membership, signature, stale view,
    /// stale height, leader-only PRE-PREPARE, first-writer-wins duplicate.
    /// Conflicting votes are recorded as evidence but still admitted —
    /// quorum intersection keeps them harmless, and the proof is worth
    /// keeping.
    pub fn admit(
        &mut self,
        message: &ConsensusMessage,
        now_ms: u64,
    ) -> Result<Admitted, DropReason> {
        if !self.registry.accepts_view(message.view()) {
            return Err(DropReason::ViewBeyondHorizon);
        }

        let sender = message.validator().clone();
        let public_key = self
            .registry
            .public_key_of(&sender)
            .ok_or(DropReason::UnknownValidator)?;
        if !verify_message(message, &public_key) {
            return Err(DropReason::BadSignature);
        }

        let kind = message.kind();
        let view_exempt = matches!(kind, MessageKind::ViewChange | MessageKind::NewView);
        if message.view() < self.current_view && !view_exempt {
            return Err(DropReason::StaleView);
        }

        match message {
            ConsensusMessage::PrePrepare(m) => {
                if m.block_height <= self.last_executed {
                    return Err(DropReason::StaleHeight);
                }
                let leader = schedule::leader_of(&self.registry, self.current_view);
                if leader != Some(&m.validator) {
                    return Err(DropReason::NotLeader);
                }
                if self.slot_taken(&self.pre_prepare, &m.key(), &sender) {
                    return Err(DropReason::Duplicate);
                }
            }
            ConsensusMessage::Prepare(m) => {
                if m.block_height <= self.last_executed {
                    return Err(DropReason::StaleHeight);
                }
                if self.slot_taken(&self.prepare, &m.key(), &sender) {
                    return Err(DropReason::Duplicate);
                }
            }
            ConsensusMessage::Commit(m) => {
                if m.block_height <= self.last_executed {
                    return Err(DropReason::StaleHeight);
                }
                if self.slot_taken(&self.commit, &m.key(), &sender) {
                    return Err(DropReason::Duplicate);
                }
            }
            ConsensusMessage::ViewChange(m) => {
                let taken = self
                    .view_change
                    .get(&m.new_view)
                    .is_some_and(|slot| slot.contains_key(&sender));
                if taken {
                    return Err(DropReason::Duplicate);
                }
            }
            // NEW_VIEW has no table slot; the handler is idempotent.
            ConsensusMessage::NewView(_) => {}
        }

        if let Some(evidence) = self.evidence.check_and_record(message) {
            warn!(
                "conflicting {} from {:#} at height {} view {}",
                message.kind(),
                evidence.validator,
                evidence.height,
                evidence.view
            );
        }

        self.registry.touch(&sender, now_ms);
        let from_current_leader =
            schedule::leader_of(&self.registry, self.current_view) == Some(&sender);
        Ok(Admitted {
            from_current_leader,
        })
    }

    fn slot_taken(
        &self,
        table: &HashMap<BlockKey, BTreeMap<Address, ConsensusMessage>>,
        key: &BlockKey,
        sender: &Address,
    ) -> bool {
        table.get(key).is_some_and(|slot| slot.contains_key(sender))
    }

    // ── Leader proposal path ────────────────────────────────────────────

    /// Build the signed PRE-PREPARE for a freshly assembled candidate
    /// block and open its round. Only meaningful on the primary.
    pub fn build_pre_prepare(&mut self, height: u64, block_hash: &str) -> ConsensusMessage {
        let key = BlockKey::new(height, block_hash);
        self.processing.insert(key);
        let mut message = ConsensusMessage::PrePrepare(PhaseMessage {
            block_height: height,
            block_hash: block_hash.to_string(),
            validator: self.local.clone(),
            view: self.current_view,
            signature: String::new(),
        });
        sign_message(&mut message, &self.keypair);
        message
    }

    // ── Phase handlers (post-queue path) ────────────────────────────────

    /// Apply a queued PRE-PREPARE together with the block authenticator's
    /// verdict for the referenced block.
    pub fn handle_pre_prepare(&mut self, message: PhaseMessage, verdict: Verdict) -> ReplicaOutput {
        let key = message.key();
        if message.block_height <= self.last_executed {
            return ReplicaOutput::empty();
        }

        self.pre_prepare
            .entry(key.clone())
            .or_default()
            .entry(message.validator.clone())
            .or_insert_with(|| ConsensusMessage::PrePrepare(message.clone()));

        match verdict {
            Verdict::Rejected(reason) => {
                debug!("pre-prepare for {key} rejected: {reason}");
                self.processing.remove(&key);
                ReplicaOutput::empty()
            }
            Verdict::UnknownParent => {
                info!("pre-prepare for {key} has no known parent; buffering");
                self.processing.remove(&key);
                ReplicaOutput {
                    parent_gap: Some(key),
                    ..ReplicaOutput::empty()
                }
            }
            Verdict::Accepted => {
                self.processing.insert(key.clone());
                let mut output = ReplicaOutput::empty();
                if self.sent_prepare.insert((self.current_view, key.height)) {
                    debug!("accepted pre-prepare for {key}; voting prepare");
                    output
                        .broadcast
                        .push(self.build_phase_vote(MessageKind::Prepare, &key));
                }
                output
            }
        }
    }

    /// Apply a queued PREPARE. Crossing the prepare quorum broadcasts this
    /// replica's COMMIT exactly once per `(view, height)`.
    pub fn handle_prepare(&mut self, message: PhaseMessage) -> ReplicaOutput {
        let key = message.key();
        if message.block_height <= self.last_executed {
            return ReplicaOutput::empty();
        }

        self.prepare
            .entry(key.clone())
            .or_default()
            .entry(message.validator.clone())
            .or_insert_with(|| ConsensusMessage::Prepare(message.clone()));

        let mut output = ReplicaOutput::empty();
        if self.prepare_count(&key) >= self.quorum()
            && self.sent_commit.insert((self.current_view, key.height))
        {
            debug!("prepare quorum for {key}; voting commit");
            output
                .broadcast
                .push(self.build_phase_vote(MessageKind::Commit, &key));
        }
        output
    }

    /// Apply a queued COMMIT. The block finalizes when the COMMIT quorum is
    /// met and the PREPARE quorum has been observed.
    pub fn handle_commit(&mut self, message: PhaseMessage) -> ReplicaOutput {
        let key = message.key();
        if message.block_height <= self.last_executed {
            return ReplicaOutput::empty();
        }

        self.commit
            .entry(key.clone())
            .or_default()
            .entry(message.validator.clone())
            .or_insert_with(|| ConsensusMessage::Commit(message.clone()));

        let mut output = ReplicaOutput::empty();
        if self.commit_count(&key) >= self.quorum() && self.prepare_count(&key) >= self.quorum() {
            info!(
                "commit quorum for {key} ({}/{} commits)",
                self.commit_count(&key),
                self.registry.len()
            );
            output.finalize = Some(key);
        }
        output
    }

    /// Tear down a finalized block's round state and advance the
    /// watermark. Called by the node layer after the store write succeeds;
    /// calling it again for the same key is a no-op.
    pub fn complete_finalize(&mut self, key: &BlockKey) {
        self.processing.remove(key);
        self.pre_prepare.remove(key);
        self.prepare.remove(key);
        self.commit.remove(key);
        self.sent_prepare.retain(|(_, height)| *height != key.height);
        self.sent_commit.retain(|(_, height)| *height != key.height);
        if key.height > self.last_executed {
            self.last_executed = key.height;
        }
        self.evidence.prune(self.last_executed.saturating_sub(100));
    }

    // ── View change ─────────────────────────────────────────────────────

    /// Enter the view-change path (leader silence detected). No-op when a
    /// change is already in flight.
    pub fn start_view_change(&mut self) -> ReplicaOutput {
        if self.is_view_changing {
            return ReplicaOutput::empty();
        }
        let target = self.current_view + 1;
        info!(
            "leader of view {} is silent; moving for view {target}",
            self.current_view
        );
        self.is_view_changing = true;
        self.emit_view_change_vote(target)
    }

    /// Apply a queued VIEW_CHANGE. Seeing a vote for a higher view than
    /// anything currently being assembled joins that election.
    pub fn handle_view_change(&mut self, message: ViewChangeMessage) -> ReplicaOutput {
        let target = message.new_view;
        if target <= self.current_view {
            return ReplicaOutput::empty();
        }

        self.view_change
            .entry(target)
            .or_default()
            .entry(message.validator.clone())
            .or_insert_with(|| ConsensusMessage::ViewChange(message.clone()));

        let assembling = self.pending_view.unwrap_or(self.current_view);
        let already_voted = self
            .view_change
            .get(&target)
            .is_some_and(|slot| slot.contains_key(&self.local));
        if target > assembling && !already_voted {
            info!("joining view change toward view {target}");
            self.is_view_changing = true;
            return self.emit_view_change_vote(target);
        }
        ReplicaOutput::empty()
    }

    /// The assembly timer fired: complete the transition on quorum, or
    /// escalate to the next view.
    pub fn view_change_timer_fired(&mut self) -> ViewChangeTick {
        if !self.is_view_changing {
            return ViewChangeTick::Idle;
        }
        let target = match self.pending_view {
            Some(target) => target,
            None => return ViewChangeTick::Idle,
        };

        if self.view_change_count(target) >= self.quorum() {
            // Keep the assembly table: if we became primary it is the
            // NEW_VIEW proof set.
            self.install_view(target, true);
            info!(
                "view change complete: now at view {target} (primary: {})",
                self.is_primary
            );
            return ViewChangeTick::Completed {
                view: target,
                is_primary: self.is_primary,
            };
        }

        let next = target + 1;
        warn!(
            "view {target} assembled only {}/{} votes; escalating to {next}",
            self.view_change_count(target),
            self.quorum()
        );
        let output = self.emit_view_change_vote(next);
        ViewChangeTick::Escalated {
            target: next,
            output,
        }
    }

    /// Build the NEW_VIEW proof and the re-proposals for every pending
    /// block. Called on the replica that became primary.
    pub fn build_new_view(&mut self, pending: &[BlockKey]) -> ReplicaOutput {
        let proof: Vec<ConsensusMessage> = self
            .view_change
            .get(&self.current_view)
            .map(|slot| slot.values().cloned().collect())
            .unwrap_or_default();

        let mut reproposals = Vec::with_capacity(pending.len());
        for key in pending {
            reproposals.push(self.build_pre_prepare(key.height, &key.hash));
        }

        let mut new_view = ConsensusMessage::NewView(NewViewMessage {
            block_height: self.last_executed,
            block_hash: String::new(),
            validator: self.local.clone(),
            view: self.current_view,
            signature: String::new(),
            view_change_messages: proof,
            preprepare_messages: reproposals.clone(),
        });
        sign_message(&mut new_view, &self.keypair);

        // The transition is proven; the assembly table has served its
        // purpose.
        self.view_change.remove(&self.current_view);

        let mut broadcast = vec![new_view];
        broadcast.extend(reproposals);
        ReplicaOutput {
            broadcast,
            ..ReplicaOutput::empty()
        }
    }

    /// Apply a queued NEW_VIEW on a non-primary.
    pub fn handle_new_view(&mut self, message: NewViewMessage) -> ReplicaOutput {
        if message.view < self.current_view {
            return ReplicaOutput::empty();
        }
        if schedule::leader_of(&self.registry, message.view) != Some(&message.validator) {
            warn!(
                "NEW_VIEW for view {} from non-leader {:#}; dropping",
                message.view, message.validator
            );
            return ReplicaOutput::empty();
        }
        if !self.new_view_proof_is_valid(&message) {
            warn!(
                "NEW_VIEW for view {} lacks a valid quorum of view changes; dropping",
                message.view
            );
            return ReplicaOutput::empty();
        }

        self.install_view(message.view, false);
        info!(
            "adopted view {} from NEW_VIEW ({} re-proposals to replay)",
            message.view,
            message.preprepare_messages.len()
        );
        ReplicaOutput {
            adopted_view: Some(message.view),
            replay: message.preprepare_messages,
            ..ReplicaOutput::empty()
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Record and return this replica's signed VIEW_CHANGE vote for
    /// `target`.
    fn emit_view_change_vote(&mut self, target: u64) -> ReplicaOutput {
        self.pending_view = Some(target);
        let mut message = ConsensusMessage::ViewChange(ViewChangeMessage {
            block_height: self.last_executed,
            block_hash: String::new(),
            validator: self.local.clone(),
            view: self.current_view,
            signature: String::new(),
            new_view: target,
            last_prepared_seq_num: self.last_executed,
            view_change_proof: Vec::new(),
        });
        sign_message(&mut message, &self.keypair);

        self.view_change
            .entry(target)
            .or_default()
            .insert(self.local.clone(), message.clone());

        ReplicaOutput {
            broadcast: vec![message],
            ..ReplicaOutput::empty()
        }
    }

    /// Move to `view` and recompute role and bookkeeping.
    ///
    /// `keep_assembly` preserves the view's own vote table so a freshly
    /// elected primary can serialize it into NEW_VIEW; [`build_new_view`]
    /// disposes of it afterwards.
    ///
    /// [`build_new_view`]: Replica::build_new_view
    fn install_view(&mut self, view: u64, keep_assembly: bool) {
        if view > self.current_view {
            self.current_view = view;
        }
        self.is_view_changing = false;
        self.pending_view = None;
        self.refresh_role();
        // Tables for lower targets are settled or superseded.
        self.view_change
            .retain(|target, _| *target > view || (keep_assembly && *target == view));
    }

    /// Quorum of distinct, validly-signed VIEW_CHANGEs targeting the
    /// message's view.
    fn new_view_proof_is_valid(&self, message: &NewViewMessage) -> bool {
        let mut voters: HashSet<&Address> = HashSet::new();
        for proof in &message.view_change_messages {
            let vc = match proof {
                ConsensusMessage::ViewChange(vc) => vc,
                _ => continue,
            };
            if vc.new_view != message.view {
                continue;
            }
            let public_key = match self.registry.public_key_of(&vc.validator) {
                Some(pk) => pk,
                None => continue,
            };
            if verify_message(proof, &public_key) {
                voters.insert(&vc.validator);
            }
        }
        voters.len() >= self.quorum()
    }

    fn build_phase_vote(&self, kind: MessageKind, key: &BlockKey) -> ConsensusMessage {
        let phase = PhaseMessage {
            block_height: key.height,
            block_hash: key.hash.clone(),
            validator: self.local.clone(),
            view: self.current_view,
            signature: String::new(),
        };
        let mut message = match kind {
            MessageKind::Prepare => ConsensusMessage::Prepare(phase),
            MessageKind::Commit => ConsensusMessage::Commit(phase),
            _ => unreachable!("only prepare/commit votes are built here"),
        };
        sign_message(&mut message, &self.keypair);
        message
    }
}

//! Wire types for the PBFT protocol.
//!
//! Messages are tagged JSON records with per-variant fields; parsing is
//! explicit and rejects unknown fields. A message's signature covers its
//! own serialization with the `signature` field blanked to `""`.

use {
    serde::{Deserialize, Serialize},
    std::fmt,
    tripcoin_crypto::{Address, Keypair, PublicKey},
};

/// The phase or control discriminant of a consensus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    PrePrepare,
    Prepare,
    Commit,
    ViewChange,
    NewView,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            MessageKind::PrePrepare => "PRE_PREPARE",
            MessageKind::Prepare => "PREPARE",
            MessageKind::Commit => "COMMIT",
            MessageKind::ViewChange => "VIEW_CHANGE",
            MessageKind::NewView => "NEW_VIEW",
        };
        write!(f, "{tag}")
    }
}

/// Identity of a block inside the round tables: `height:hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub height: u64,
    pub hash: String,
}

impl BlockKey {
    pub fn new(height: u64, hash: impl Into<String>) -> Self {
        Self {
            height,
            hash: hash.into(),
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.height, self.hash)
    }
}

/// Shared shape of the three block-phase messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PhaseMessage {
    pub block_height: u64,
    pub block_hash: String,
    pub validator: Address,
    pub view: u64,
    pub signature: String,
}

impl PhaseMessage {
    pub fn key(&self) -> BlockKey {
        BlockKey::new(self.block_height, self.block_hash.clone())
    }
}

/// A replica's vote to abandon the current leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ViewChangeMessage {
    pub block_height: u64,
    pub block_hash: String,
    pub validator: Address,
    /// The view being abandoned.
    pub view: u64,
    pub signature: String,
    /// The view this replica wants to move to.
    pub new_view: u64,
    /// Highest block height this replica has executed.
    pub last_prepared_seq_num: u64,
    /// Supporting messages; empty on first emission, populated in NEW_VIEW.
    pub view_change_proof: Vec<ConsensusMessage>,
}

/// The incoming leader's proof that a view transition is legitimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewViewMessage {
    pub block_height: u64,
    pub block_hash: String,
    pub validator: Address,
    /// The view being installed.
    pub view: u64,
    pub signature: String,
    /// A quorum of VIEW_CHANGE messages targeting `view`.
    pub view_change_messages: Vec<ConsensusMessage>,
    /// PRE-PREPAREs for unfinalized blocks, replayed by receivers.
    pub preprepare_messages: Vec<ConsensusMessage>,
}

/// A consensus message as shipped on the wire and stored in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConsensusMessage {
    #[serde(rename = "PRE_PREPARE")]
    PrePrepare(PhaseMessage),
    #[serde(rename = "PREPARE")]
    Prepare(PhaseMessage),
    #[serde(rename = "COMMIT")]
    Commit(PhaseMessage),
    #[serde(rename = "VIEW_CHANGE")]
    ViewChange(ViewChangeMessage),
    #[serde(rename = "NEW_VIEW")]
    NewView(NewViewMessage),
}

impl ConsensusMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ConsensusMessage::PrePrepare(_) => MessageKind::PrePrepare,
            ConsensusMessage::Prepare(_) => MessageKind::Prepare,
            ConsensusMessage::Commit(_) => MessageKind::Commit,
            ConsensusMessage::ViewChange(_) => MessageKind::ViewChange,
            ConsensusMessage::NewView(_) => MessageKind::NewView,
        }
    }

    /// The sending validator.
    pub fn validator(&self) -> &Address {
        match self {
            ConsensusMessage::PrePrepare(m)
            | ConsensusMessage::Prepare(m)
            | ConsensusMessage::Commit(m) => &m.validator,
            ConsensusMessage::ViewChange(m) => &m.validator,
            ConsensusMessage::NewView(m) => &m.validator,
        }
    }

    /// The view this message is tagged with.
    pub fn view(&self) -> u64 {
        match self {
            ConsensusMessage::PrePrepare(m)
            | ConsensusMessage::Prepare(m)
            | ConsensusMessage::Commit(m) => m.view,
            ConsensusMessage::ViewChange(m) => m.view,
            ConsensusMessage::NewView(m) => m.view,
        }
    }

    /// The block height this message refers to.
    pub fn block_height(&self) -> u64 {
        match self {
            ConsensusMessage::PrePrepare(m)
            | ConsensusMessage::Prepare(m)
            | ConsensusMessage::Commit(m) => m.block_height,
            ConsensusMessage::ViewChange(m) => m.block_height,
            ConsensusMessage::NewView(m) => m.block_height,
        }
    }

    pub fn signature(&self) -> &str {
        match self {
            ConsensusMessage::PrePrepare(m)
            | ConsensusMessage::Prepare(m)
            | ConsensusMessage::Commit(m) => &m.signature,
            ConsensusMessage::ViewChange(m) => &m.signature,
            ConsensusMessage::NewView(m) => &m.signature,
        }
    }

    fn set_signature(&mut self, signature: String) {
        match self {
            ConsensusMessage::PrePrepare(m)
            | ConsensusMessage::Prepare(m)
            | ConsensusMessage::Commit(m) => m.signature = signature,
            ConsensusMessage::ViewChange(m) => m.signature = signature,
            ConsensusMessage::NewView(m) => m.signature = signature,
        }
    }

    /// The bytes a signature covers: this message serialized with its own
    /// `signature` field blanked. Nested proof messages keep their
    /// signatures — they are payload, not envelope.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut blanked = self.clone();
        blanked.set_signature(String::new());
        serde_json::to_vec(&blanked).expect("consensus messages serialize to JSON")
    }
}

/// Sign `message` in place with `keypair`.
pub fn sign_message(message: &mut ConsensusMessage, keypair: &Keypair) {
    let signature = keypair.sign(&message.signing_bytes()).to_hex();
    message.set_signature(signature);
}

/// Verify a message's signature against the claimed sender's key.
pub fn verify_message(message: &ConsensusMessage, public_key: &PublicKey) -> bool {
    public_key.verify_hex(&message.signing_bytes(), message.signature())
}

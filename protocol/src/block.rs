//! # Blocks, Headers, and Shielded Transactions
//!
//! A block is the unit of insertion into the chain. Each block carries an
//! ordered list of shielded transactions and a link to its parent, forming
//! a tree that may temporarily fork.
//!
//! ## Header Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  BlockHeader                                         │
//! │  ├── hash: [u8; 32]          (BLAKE3 of header)      │
//! │  ├── previous_hash: [u8; 32] (zeros for genesis)     │
//! │  ├── sequence: u64           (genesis = 1)           │
//! │  ├── timestamp: u64                                  │
//! │  ├── randomness: u64         (miner nonce)           │
//! │  ├── work: u64               (per-block work units)  │
//! │  ├── tx_root: [u8; 32]       (Merkle root)           │
//! │  │   — acceptance-time bookkeeping, not hashed —     │
//! │  ├── graph_id: u64                                   │
//! │  ├── note_size / nullifier_size: u64                 │
//! │  └── weight: u128                                    │
//! ├──────────────────────────────────────────────────────┤
//! │  transactions: Vec<Transaction>                      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Hash Computation
//!
//! The block hash covers `sequence || previous_hash || timestamp ||
//! randomness || work || tx_root`. The bookkeeping fields (`graph_id`,
//! accumulator sizes, cumulative `weight`) are assigned locally when the
//! block is accepted — they are facts about *this node's* view of the
//! tree, not consensus data, so they are excluded from the hash.
//!
//! ## Shielded Transactions
//!
//! VEIL transactions don't name accounts. A transaction reveals only its
//! freshly minted note commitments (outputs) and the nullifiers of the
//! notes it spends. Proof and signature validation happen upstream in the
//! validator collaborator; this module trusts both lists as given.

use serde::{Deserialize, Serialize};

use crate::config::{
    GENESIS_COINBASE_MESSAGE, GENESIS_SEQUENCE, GENESIS_TIMESTAMP_MS, GRAPH_ID_UNASSIGNED,
};
use crate::graph::GraphId;
use crate::hash::{blake3_hash, merkle_pair, BlockHash, ZERO_HASH};

/// A 32-byte commitment to a shielded note, appended to the note tree.
pub type NoteCommitment = [u8; 32];

/// A 32-byte nullifier revealed when a note is spent. Each nullifier may
/// appear on the chain at most once.
pub type Nullifier = [u8; 32];

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A shielded transaction: minted note commitments plus spent nullifiers.
///
/// The core never sees amounts or addresses — only the accumulator
/// updates a transaction implies. Structural and proof validity are the
/// validator collaborator's job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Note commitments minted by this transaction, in output order.
    pub notes: Vec<NoteCommitment>,
    /// Nullifiers of the notes this transaction spends.
    pub spends: Vec<Nullifier>,
    /// Transaction fee, in the base unit.
    pub fee: u64,
}

impl Transaction {
    /// Build a transaction from its parts.
    pub fn new(notes: Vec<NoteCommitment>, spends: Vec<Nullifier>, fee: u64) -> Self {
        Self { notes, spends, fee }
    }

    /// Build a miners-fee transaction: a single output note, no spends.
    pub fn miners_fee(note: NoteCommitment, fee: u64) -> Self {
        Self {
            notes: vec![note],
            spends: Vec::new(),
            fee,
        }
    }

    /// BLAKE3 hash over the transaction's canonical byte encoding.
    pub fn hash(&self) -> [u8; 32] {
        let mut preimage =
            Vec::with_capacity(24 + 32 * (self.notes.len() + self.spends.len()));
        preimage.extend_from_slice(&self.fee.to_le_bytes());
        preimage.extend_from_slice(&(self.notes.len() as u64).to_le_bytes());
        for note in &self.notes {
            preimage.extend_from_slice(note);
        }
        preimage.extend_from_slice(&(self.spends.len() as u64).to_le_bytes());
        for spend in &self.spends {
            preimage.extend_from_slice(spend);
        }
        blake3_hash(&preimage)
    }
}

// ---------------------------------------------------------------------------
// BlockHeader
// ---------------------------------------------------------------------------

/// Block metadata and chain linkage. Immutable once stored.
///
/// The first seven fields arrive with the block; the bookkeeping tail is
/// filled in by the chain orchestrator at the moment the block is
/// accepted onto a segment, and never changes afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// BLAKE3 hash of this header's consensus fields.
    pub hash: BlockHash,
    /// Hash of the parent header. All zeros for genesis.
    pub previous_hash: BlockHash,
    /// Monotonic height. Genesis is 1.
    pub sequence: u64,
    /// Unix timestamp (milliseconds) when this block was produced.
    pub timestamp: u64,
    /// Miner nonce. Uniquifies otherwise-identical candidate blocks.
    pub randomness: u64,
    /// Per-block work units, supplied by the validator collaborator from
    /// the difficulty target. Zero is fine — weight strategies clamp.
    pub work: u64,
    /// Merkle root over the transaction hashes.
    pub tx_root: BlockHash,

    /// Id of the segment (graph) this header belongs to.
    /// `GRAPH_ID_UNASSIGNED` on candidate headers.
    pub graph_id: GraphId,
    /// Note-commitment tree size after this block, along its ancestry.
    pub note_size: u64,
    /// Nullifier-set size after this block, along its ancestry.
    pub nullifier_size: u64,
    /// Cumulative chain weight ending at this block. Strictly increasing
    /// with sequence; competing tips compare on this.
    pub weight: u128,
}

impl BlockHeader {
    /// True for the unique header with no parent.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash == ZERO_HASH
    }

    /// Recompute the hash from the consensus fields.
    pub fn compute_hash(&self) -> BlockHash {
        compute_header_hash(
            self.sequence,
            &self.previous_hash,
            self.timestamp,
            self.randomness,
            self.work,
            &self.tx_root,
        )
    }

    /// Return the block hash as a hex string.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A full block: header plus ordered transaction list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block metadata and chain linkage.
    pub header: BlockHeader,
    /// Ordered list of shielded transactions.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Construct the genesis block.
    ///
    /// Sequence 1, zeroed parent hash, and a single miners-fee transaction
    /// whose note commitment is the hash of the coinbase message. A fresh
    /// chain therefore starts with note-tree size 1 and an empty
    /// nullifier set.
    pub fn genesis() -> Self {
        let coinbase = Transaction::miners_fee(blake3_hash(GENESIS_COINBASE_MESSAGE), 0);
        Self::assemble(
            ZERO_HASH,
            GENESIS_SEQUENCE,
            GENESIS_TIMESTAMP_MS,
            0,
            0,
            vec![coinbase],
        )
    }

    /// Assemble an unvalidated candidate block on top of a parent header.
    ///
    /// Computes the tx root and block hash; the bookkeeping fields stay
    /// unassigned until `add_block` accepts the block.
    pub fn new_after(
        parent: &BlockHeader,
        transactions: Vec<Transaction>,
        timestamp: u64,
        randomness: u64,
        work: u64,
    ) -> Self {
        Self::assemble(
            parent.hash,
            parent.sequence + 1,
            timestamp,
            randomness,
            work,
            transactions,
        )
    }

    fn assemble(
        previous_hash: BlockHash,
        sequence: u64,
        timestamp: u64,
        randomness: u64,
        work: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let tx_root = compute_tx_root(&transactions);
        let hash = compute_header_hash(
            sequence,
            &previous_hash,
            timestamp,
            randomness,
            work,
            &tx_root,
        );
        Self {
            header: BlockHeader {
                hash,
                previous_hash,
                sequence,
                timestamp,
                randomness,
                work,
                tx_root,
                graph_id: GRAPH_ID_UNASSIGNED,
                note_size: 0,
                nullifier_size: 0,
                weight: 0,
            },
            transactions,
        }
    }

    /// Total note commitments minted by this block's transactions.
    pub fn note_count(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.notes.len() as u64).sum()
    }

    /// Total nullifiers revealed by this block's transactions.
    pub fn nullifier_count(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.spends.len() as u64).sum()
    }

    /// Return the block hash as a hex string.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.header.hash)
    }

    /// Verify structural integrity: the stored hash matches the recomputed
    /// hash, the tx root matches the transaction list, and genesis blocks
    /// have a zeroed parent.
    pub fn verify(&self) -> Result<(), String> {
        let expected_hash = self.header.compute_hash();
        if self.header.hash != expected_hash {
            return Err(format!(
                "block {} hash mismatch: stored={}, computed={}",
                self.header.sequence,
                hex::encode(self.header.hash),
                hex::encode(expected_hash),
            ));
        }

        let expected_root = compute_tx_root(&self.transactions);
        if self.header.tx_root != expected_root {
            return Err(format!(
                "block {} tx_root mismatch: stored={}, computed={}",
                self.header.sequence,
                hex::encode(self.header.tx_root),
                hex::encode(expected_root),
            ));
        }

        if self.header.sequence == GENESIS_SEQUENCE && self.header.previous_hash != ZERO_HASH {
            return Err("genesis block must have zeroed previous_hash".to_string());
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hash Computation
// ---------------------------------------------------------------------------

/// Compute the BLAKE3 hash of a header from its consensus fields.
fn compute_header_hash(
    sequence: u64,
    previous_hash: &BlockHash,
    timestamp: u64,
    randomness: u64,
    work: u64,
    tx_root: &BlockHash,
) -> BlockHash {
    let mut preimage = Vec::with_capacity(96);
    preimage.extend_from_slice(&sequence.to_le_bytes());
    preimage.extend_from_slice(previous_hash);
    preimage.extend_from_slice(&timestamp.to_le_bytes());
    preimage.extend_from_slice(&randomness.to_le_bytes());
    preimage.extend_from_slice(&work.to_le_bytes());
    preimage.extend_from_slice(tx_root);
    blake3_hash(&preimage)
}

/// Compute a binary Merkle root over the transaction hashes.
///
/// Internal nodes are `BLAKE3(left || right)`; an odd node at any level is
/// paired with itself. An empty list produces a root of all zeros.
pub fn compute_tx_root(transactions: &[Transaction]) -> BlockHash {
    if transactions.is_empty() {
        return ZERO_HASH;
    }

    let mut hashes: Vec<[u8; 32]> = transactions.iter().map(Transaction::hash).collect();

    while hashes.len() > 1 {
        let mut next_level = Vec::with_capacity((hashes.len() + 1) / 2);
        for chunk in hashes.chunks(2) {
            let right = if chunk.len() == 2 { &chunk[1] } else { &chunk[0] };
            next_level.push(merkle_pair(&chunk[0], right));
        }
        hashes = next_level;
    }

    hashes[0]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

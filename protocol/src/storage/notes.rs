//! # Note-Commitment Tree
//!
//! An append-only, indexable Merkle accumulator over every note commitment
//! ever minted on the chain. Leaves are appended in transaction order as
//! blocks are accepted; nothing is ever removed or reordered, so a leaf's
//! index is a permanent name for the note.
//!
//! The tree is binary with `BLAKE3(left || right)` internal nodes; an odd
//! node at any level pairs with itself (same convention as a block's tx
//! root). Roots and witnesses are computed on demand from the stored
//! leaves — the accumulator's job at this layer is correctness, not proof
//! throughput.
//!
//! Appends do not go through this type: they ride inside the atomic block
//! commit (`ChainDb::commit_block`), so the tree can never drift from the
//! set of committed transactions.

use std::sync::Arc;

use crate::block::NoteCommitment;
use crate::hash::{merkle_pair, BlockHash, ZERO_HASH};
use crate::storage::db::{ChainDb, DbError, DbResult};

// ---------------------------------------------------------------------------
// NoteTree
// ---------------------------------------------------------------------------

/// Read interface over the note-commitment accumulator.
#[derive(Debug, Clone)]
pub struct NoteTree {
    db: Arc<ChainDb>,
}

impl NoteTree {
    pub fn new(db: Arc<ChainDb>) -> Self {
        Self { db }
    }

    /// Number of leaves in the tree.
    pub fn size(&self) -> DbResult<u64> {
        self.db.note_tree_size()
    }

    /// Fetch the leaf at `index`. `None` past the end.
    pub fn get_leaf(&self, index: u64) -> DbResult<Option<NoteCommitment>> {
        self.db.note_leaf(index)
    }

    /// Merkle root over all current leaves. All zeros for an empty tree.
    pub fn root(&self) -> DbResult<BlockHash> {
        let mut level = self.leaves()?;
        if level.is_empty() {
            return Ok(ZERO_HASH);
        }

        while level.len() > 1 {
            level = fold_level(&level);
        }
        Ok(level[0])
    }

    /// Authentication path for the leaf at `index` against the current
    /// root. `None` if the index is past the end.
    pub fn witness(&self, index: u64) -> DbResult<Option<MerkleWitness>> {
        let leaves = self.leaves()?;
        if index >= leaves.len() as u64 {
            return Ok(None);
        }

        let leaf = leaves[index as usize];
        let mut path = Vec::new();
        let mut level = leaves;
        let mut position = index as usize;

        while level.len() > 1 {
            let sibling = position ^ 1;
            let sibling_hash = if sibling < level.len() {
                level[sibling]
            } else {
                // Odd node at the edge pairs with itself.
                level[position]
            };
            path.push(WitnessNode {
                sibling: sibling_hash,
                leaf_is_left: position % 2 == 0,
            });
            level = fold_level(&level);
            position /= 2;
        }

        Ok(Some(MerkleWitness {
            leaf,
            index,
            path,
            root: level[0],
        }))
    }

    fn leaves(&self) -> DbResult<Vec<NoteCommitment>> {
        let size = self.size()?;
        let mut leaves = Vec::with_capacity(size as usize);
        for index in 0..size {
            // An index gap below the recorded size means the counter and
            // the leaf tree disagree. Fail rather than compute a root
            // over a silently shortened tree.
            let leaf = self.db.note_leaf(index)?.ok_or_else(|| {
                DbError::Corruption(format!(
                    "note leaf {index} missing below tree size {size}"
                ))
            })?;
            leaves.push(leaf);
        }
        Ok(leaves)
    }
}

fn fold_level(level: &[[u8; 32]]) -> Vec<[u8; 32]> {
    let mut next = Vec::with_capacity((level.len() + 1) / 2);
    for chunk in level.chunks(2) {
        let right = if chunk.len() == 2 { &chunk[1] } else { &chunk[0] };
        next.push(merkle_pair(&chunk[0], right));
    }
    next
}

// ---------------------------------------------------------------------------
// MerkleWitness
// ---------------------------------------------------------------------------

/// One step of an authentication path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessNode {
    /// Hash paired with the running hash at this level.
    pub sibling: [u8; 32],
    /// True if the running hash is the left operand at this level.
    pub leaf_is_left: bool,
}

/// A leaf, its position, and the path proving membership under `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleWitness {
    pub leaf: NoteCommitment,
    pub index: u64,
    pub path: Vec<WitnessNode>,
    pub root: BlockHash,
}

impl MerkleWitness {
    /// Recompute the root from the leaf and path and compare.
    pub fn verify(&self) -> bool {
        let mut running = self.leaf;
        for node in &self.path {
            running = if node.leaf_is_left {
                merkle_pair(&running, &node.sibling)
            } else {
                merkle_pair(&node.sibling, &running)
            };
        }
        running == self.root
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

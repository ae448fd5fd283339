//! # Blockchain Orchestrator
//!
//! `Blockchain` is the one object that ties the core together: it owns the
//! storage engine, the graph manager, and the two accumulators, and it is
//! the only mutator of any of them. Everything a block insertion touches —
//! header, graph rows, note leaves, nullifiers, counters — is staged into
//! a single [`BlockCommit`] and landed atomically, so observers see the
//! chain either before or after a block, never mid-insertion.
//!
//! ## Insertion Pipeline
//!
//! ```text
//! add_block(block)
//!   ├── already stored?            → is_added = false, no side effects
//!   ├── parent header lookup       → UnknownParent
//!   ├── sequence == parent + 1?    → InvalidSequence
//!   ├── stage notes + nullifiers   → DoubleSpend (whole block rejected)
//!   ├── GraphManager::assign       (inherit run, or fork a new graph)
//!   ├── GraphManager::update_heaviest
//!   └── ChainDb::commit_block     (one transaction, all five trees)
//! ```
//!
//! ## Concurrency
//!
//! Single logical writer: `add_block` holds the write half of an `RwLock`
//! for its whole read-compute-commit cycle. Heaviest-tip propagation reads
//! and conditionally rewrites shared graph rows; two interleaved insertions
//! would corrupt it. Reads take the read half per lookup and never block
//! each other.
//!
//! There are no ambient singletons. Each `Blockchain` owns its own store,
//! so tests spin up as many independent chains as they like.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::block::{Block, BlockHeader, Transaction};
use crate::error::{ChainError, ChainResult};
use crate::graph::{Graph, GraphId, GraphManager};
use crate::hash::BlockHash;
use crate::storage::db::{BlockCommit, ChainDb};
use crate::storage::notes::NoteTree;
use crate::storage::nullifiers::NullifierSet;
use crate::traversal::{self, BlockIterator, ForkInfo};
use crate::weight::{LongestChain, WeightStrategy};

/// Outcome of [`Blockchain::add_block`]. `is_added` is false when the
/// block was already known — not an error, just a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddBlockResult {
    pub is_added: bool,
}

// ---------------------------------------------------------------------------
// Blockchain
// ---------------------------------------------------------------------------

/// The chain core: block tree, fork choice, and accumulators.
pub struct Blockchain {
    db: Arc<ChainDb>,
    graphs: GraphManager,
    notes: NoteTree,
    nullifiers: NullifierSet,
    weight: Box<dyn WeightStrategy>,
    /// Writer exclusion; see the module docs.
    lock: RwLock<()>,
}

impl Blockchain {
    /// Open (or create) a chain at the given path with the default
    /// longest-chain weight strategy. Seeds genesis if the store is empty.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> ChainResult<Self> {
        Self::with_strategy(ChainDb::open(path)?, Box::new(LongestChain))
    }

    /// Open a throwaway in-memory chain. Test and tooling entry point.
    pub fn open_temporary() -> ChainResult<Self> {
        Self::with_strategy(ChainDb::open_temporary()?, Box::new(LongestChain))
    }

    /// Build a chain over an already-open store with an explicit weight
    /// strategy. Seeds genesis if the store is empty.
    pub fn with_strategy(db: ChainDb, weight: Box<dyn WeightStrategy>) -> ChainResult<Self> {
        let db = Arc::new(db);
        let chain = Self {
            graphs: GraphManager::new(Arc::clone(&db)),
            notes: NoteTree::new(Arc::clone(&db)),
            nullifiers: NullifierSet::new(Arc::clone(&db)),
            weight,
            lock: RwLock::new(()),
            db,
        };
        chain.seed_genesis_if_empty()?;
        Ok(chain)
    }

    // -- Write path ---------------------------------------------------------

    /// Incorporate a validated block into the tree.
    ///
    /// Idempotent: a block whose hash is already stored returns
    /// `is_added = false` with no side effects. The parent must already be
    /// accepted; buffering out-of-order arrivals is the caller's job.
    ///
    /// All effects — header write, accumulator appends, graph updates —
    /// land in one atomic unit, or not at all.
    pub fn add_block(&self, block: &Block) -> ChainResult<AddBlockResult> {
        let _guard = self.lock.write();

        if self.db.contains_header(&block.header.hash)? {
            debug!(hash = %block.hash_hex(), "duplicate block ignored");
            return Ok(AddBlockResult { is_added: false });
        }

        let parent = self
            .db
            .block_header(&block.header.previous_hash)?
            .ok_or(ChainError::UnknownParent(block.header.previous_hash))?;

        let expected = parent.sequence + 1;
        if block.header.sequence != expected {
            return Err(ChainError::InvalidSequence {
                expected,
                got: block.header.sequence,
            });
        }

        let mut commit = self.stage_block(block, Some(&parent))?;
        self.graphs.assign(&mut commit, &parent)?;
        self.graphs.update_heaviest(&mut commit)?;
        self.db.commit_block(&commit)?;

        info!(
            sequence = block.header.sequence,
            hash = %block.hash_hex(),
            graph = commit.header.graph_id,
            weight = commit.header.weight,
            "block accepted"
        );
        Ok(AddBlockResult { is_added: true })
    }

    /// Seed an empty store with the genesis block and its graph row.
    fn seed_genesis_if_empty(&self) -> ChainResult<()> {
        let _guard = self.lock.write();

        if self.db.genesis_hash()?.is_some() {
            return Ok(());
        }

        let genesis = Block::genesis();
        let mut commit = self.stage_block(&genesis, None)?;
        self.graphs.create_root(&mut commit)?;
        commit.genesis_hash = Some(genesis.header.hash);
        self.db.commit_block(&commit)?;

        info!(hash = %genesis.hash_hex(), "chain seeded with genesis block");
        Ok(())
    }

    /// Build the staged commit for a block: finalized header bookkeeping
    /// plus accumulator appends, in transaction order.
    ///
    /// Rejects with [`ChainError::DoubleSpend`] if any nullifier is
    /// already in the set or appears twice within the block. Nothing is
    /// persisted on rejection — the commit is simply dropped.
    fn stage_block(&self, block: &Block, parent: Option<&BlockHeader>) -> ChainResult<BlockCommit> {
        let mut notes = Vec::new();
        let mut nullifiers = Vec::new();
        let mut seen = HashSet::new();

        for tx in &block.transactions {
            notes.extend_from_slice(&tx.notes);
            for nullifier in &tx.spends {
                if !seen.insert(*nullifier) || self.db.contains_nullifier(nullifier)? {
                    warn!(
                        hash = %block.hash_hex(),
                        nullifier = %hex::encode(nullifier),
                        "block rejected: double spend"
                    );
                    return Err(ChainError::DoubleSpend(*nullifier));
                }
                nullifiers.push(*nullifier);
            }
        }

        let mut header = block.header.clone();
        let (parent_notes, parent_nullifiers, parent_weight) = match parent {
            Some(p) => (p.note_size, p.nullifier_size, p.weight),
            None => (0, 0, 0),
        };
        header.note_size = parent_notes + notes.len() as u64;
        header.nullifier_size = parent_nullifiers + nullifiers.len() as u64;
        header.weight = self.weight.cumulative_weight(parent_weight, &header);

        let mut commit = BlockCommit::new(header);
        commit.note_size_after = self.db.note_tree_size()? + notes.len() as u64;
        commit.nullifier_size_after = self.db.nullifier_set_size()? + nullifiers.len() as u64;
        commit.notes = notes;
        commit.nullifiers = nullifiers;
        Ok(commit)
    }

    // -- Lookups ------------------------------------------------------------

    /// The genesis header, or `None` before seeding (practically: never,
    /// since construction seeds).
    pub fn genesis_header(&self) -> ChainResult<Option<BlockHeader>> {
        let _guard = self.lock.read();
        match self.db.genesis_hash()? {
            Some(hash) => Ok(self.db.block_header(&hash)?),
            None => Ok(None),
        }
    }

    /// Header by block hash. `None` if unknown.
    pub fn block_header(&self, hash: &BlockHash) -> ChainResult<Option<BlockHeader>> {
        let _guard = self.lock.read();
        Ok(self.db.block_header(hash)?)
    }

    /// Graph row by id. `None` if unknown.
    pub fn graph(&self, id: GraphId) -> ChainResult<Option<Graph>> {
        let _guard = self.lock.read();
        Ok(self.db.graph(id)?)
    }

    /// Header of the heaviest known tip: what the genesis graph's
    /// `heaviest_hash` points at. `None` on an unseeded store.
    pub fn head(&self) -> ChainResult<Option<BlockHeader>> {
        let genesis = match self.genesis_header()? {
            Some(genesis) => genesis,
            None => return Ok(None),
        };
        let graph = self.read_graph(genesis.graph_id)?;
        Ok(Some(self.read_header(&graph.heaviest_hash)?))
    }

    /// The note-commitment accumulator.
    pub fn notes(&self) -> &NoteTree {
        &self.notes
    }

    /// The spent-nullifier set.
    pub fn nullifiers(&self) -> &NullifierSet {
        &self.nullifiers
    }

    // -- Block construction -------------------------------------------------

    /// Assemble an unvalidated candidate block on the current heaviest
    /// head: the miners-fee transaction first, then the given
    /// transactions. Proof fields (`randomness`, `work`) are left for the
    /// miner; validity is the validator collaborator's concern.
    pub fn new_block(
        &self,
        transactions: Vec<Transaction>,
        miners_fee: Transaction,
    ) -> ChainResult<Block> {
        let head = self.head()?.ok_or(ChainError::EmptyChain)?;

        let mut all = Vec::with_capacity(transactions.len() + 1);
        all.push(miners_fee);
        all.extend(transactions);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(Block::new_after(&head, all, timestamp, 0, 0))
    }

    // -- Traversal ----------------------------------------------------------

    /// Lazy ascending walk from genesis to the current heaviest tip,
    /// inclusive. Yields nothing on an unseeded store.
    pub fn iterate_to_head(&self) -> BlockIterator<'_> {
        traversal::iterate_to_head(self)
    }

    /// Lazy walk between two stored headers, inclusive of both endpoints.
    /// Ascending if `from.sequence <= to.sequence`, else descending.
    /// See the traversal module for the failure modes.
    pub fn iterate_to_block(&self, from: &BlockHeader, to: &BlockHeader) -> BlockIterator<'_> {
        traversal::iterate_to_block(self, from, to)
    }

    /// Lowest common ancestor of two stored headers.
    pub fn find_fork(&self, left: &BlockHeader, right: &BlockHeader) -> ChainResult<ForkInfo> {
        traversal::find_fork(self, left, right)
    }

    // -- Internal locked reads (traversal engine) ---------------------------

    /// Header by hash; absence is an integrity error here, because the
    /// hash came from a stored row.
    pub(crate) fn read_header(&self, hash: &BlockHash) -> ChainResult<BlockHeader> {
        let _guard = self.lock.read();
        self.db
            .block_header(hash)?
            .ok_or(ChainError::MissingHeader(*hash))
    }

    /// Graph row by id; absence is an integrity error here.
    pub(crate) fn read_graph(&self, id: GraphId) -> ChainResult<Graph> {
        let _guard = self.lock.read();
        self.db.graph(id)?.ok_or(ChainError::MissingGraph(id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

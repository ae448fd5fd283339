//! # ChainDb — Persistent Storage Engine
//!
//! The persistence layer for the VEIL chain core, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees" (analogous to column families in
//! RocksDB). Each tree is an independent B+ tree with its own keyspace:
//!
//! | Tree         | Key                  | Value                       |
//! |--------------|----------------------|-----------------------------|
//! | `headers`    | `hash` (32B)         | `bincode(BlockHeader)`      |
//! | `graphs`     | `graph_id` (8B BE)   | `bincode(Graph)`            |
//! | `notes`      | `leaf index` (8B BE) | note commitment (32B)       |
//! | `nullifiers` | `nullifier` (32B)    | spending block hash (32B)   |
//! | `metadata`   | key (UTF-8)          | value (bytes)               |
//!
//! Note-leaf indices and graph ids are stored as big-endian u64 so sled's
//! lexicographic ordering matches numeric ordering.
//!
//! ## Atomicity
//!
//! Accepting a block touches all five trees: the new header, one or more
//! updated graph rows, appended note leaves, inserted nullifiers, and the
//! metadata counters. [`ChainDb::commit_block`] applies the whole batch in
//! a single serializable transaction across the trees — either every write
//! lands or none does. A nullifier that is already present aborts the
//! transaction from inside it, so a double-spend can never leave partial
//! state behind even if the caller's own pre-check raced.

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};

use crate::block::{BlockHeader, NoteCommitment, Nullifier};
use crate::error::{ChainError, ChainResult};
use crate::graph::{Graph, GraphId};
use crate::hash::BlockHash;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage corruption: {0}")]
    Corruption(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Hash of the genesis block. Present iff the chain has been seeded.
const META_GENESIS_HASH: &[u8] = b"genesis_hash";

/// Number of leaves in the note-commitment tree.
const META_NOTE_TREE_SIZE: &[u8] = b"note_tree_size";

/// Number of nullifiers in the nullifier set.
const META_NULLIFIER_SET_SIZE: &[u8] = b"nullifier_set_size";

/// Next unallocated graph id. Graph ids start at 1; 0 is reserved.
const META_NEXT_GRAPH_ID: &[u8] = b"next_graph_id";

// ---------------------------------------------------------------------------
// BlockCommit
// ---------------------------------------------------------------------------

/// The staged write set for one accepted block.
///
/// `add_block` builds this up — finalized header, touched graph rows,
/// accumulator appends, counter updates — and hands it to
/// [`ChainDb::commit_block`] as one atomic unit. Nothing reaches disk
/// while the commit is being assembled, so any rejection along the way
/// simply drops the struct.
#[derive(Debug, Clone)]
pub struct BlockCommit {
    /// The header being inserted, with bookkeeping fields filled in.
    pub header: BlockHeader,
    /// Graph rows created or modified by this insertion (upserted by id).
    pub graphs: Vec<Graph>,
    /// Note commitments to append, in transaction order.
    pub notes: Vec<NoteCommitment>,
    /// Nullifiers to insert; the spender recorded is `header.hash`.
    pub nullifiers: Vec<Nullifier>,
    /// Note-tree size after this block's appends.
    pub note_size_after: u64,
    /// Nullifier-set size after this block's inserts.
    pub nullifier_size_after: u64,
    /// New value of the graph-id counter, if this insertion allocated one.
    pub next_graph_id: Option<GraphId>,
    /// Set when seeding an empty chain.
    pub genesis_hash: Option<BlockHash>,
}

impl BlockCommit {
    /// Start a commit for the given header.
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            graphs: Vec::new(),
            notes: Vec::new(),
            nullifiers: Vec::new(),
            note_size_after: 0,
            nullifier_size_after: 0,
            next_graph_id: None,
            genesis_hash: None,
        }
    }

    /// Upsert a graph row into the staged set.
    pub fn stage_graph(&mut self, graph: Graph) {
        if let Some(existing) = self.graphs.iter_mut().find(|g| g.id == graph.id) {
            *existing = graph;
        } else {
            self.graphs.push(graph);
        }
    }

    /// Look up a staged graph row by id.
    pub fn staged_graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.iter().find(|g| g.id == id)
    }
}

// ---------------------------------------------------------------------------
// ChainDb
// ---------------------------------------------------------------------------

/// Persistent storage engine for the VEIL chain core.
///
/// Wraps a sled `Db` and exposes typed accessors for headers, graphs, the
/// note-commitment tree, the nullifier set, and chain metadata. All
/// serialization uses bincode.
///
/// # Thread Safety
///
/// sled trees support lock-free concurrent reads and serialized writes;
/// `ChainDb` can be shared via `Arc<ChainDb>`. The chain's single-writer
/// discipline lives one level up, in the orchestrator's lock.
#[derive(Debug, Clone)]
pub struct ChainDb {
    /// The underlying sled database handle.
    db: Db,
    /// Headers indexed by block hash.
    headers: Tree,
    /// Graph rows indexed by id (big-endian u64 keys).
    graphs: Tree,
    /// Note-commitment leaves indexed by position (big-endian u64 keys).
    notes: Tree,
    /// Spent nullifiers, each mapping to the hash of the spending block.
    nullifiers: Tree,
    /// Counters and well-known hashes (genesis, sizes, next graph id).
    metadata: Tree,
}

impl ChainDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is cleaned up on drop.
    ///
    /// Ideal for tests — no filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    /// Internal constructor: opens named trees from an existing sled `Db`.
    fn from_db(db: Db) -> DbResult<Self> {
        let headers = db.open_tree("headers")?;
        let graphs = db.open_tree("graphs")?;
        let notes = db.open_tree("notes")?;
        let nullifiers = db.open_tree("nullifiers")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            headers,
            graphs,
            notes,
            nullifiers,
            metadata,
        })
    }

    // -- Header operations --------------------------------------------------

    /// Fetch a header by block hash. `None` if absent.
    pub fn block_header(&self, hash: &BlockHash) -> DbResult<Option<BlockHeader>> {
        match self.headers.get(hash)? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// True if a header with this hash is stored.
    pub fn contains_header(&self, hash: &BlockHash) -> DbResult<bool> {
        Ok(self.headers.contains_key(hash)?)
    }

    // -- Graph operations ---------------------------------------------------

    /// Fetch a graph row by id. `None` if absent.
    pub fn graph(&self, id: GraphId) -> DbResult<Option<Graph>> {
        match self.graphs.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Next unallocated graph id. 1 on a fresh database.
    pub fn next_graph_id(&self) -> DbResult<GraphId> {
        Ok(self.read_meta_u64(META_NEXT_GRAPH_ID)?.unwrap_or(1))
    }

    // -- Accumulator reads --------------------------------------------------

    /// Number of leaves in the note-commitment tree.
    pub fn note_tree_size(&self) -> DbResult<u64> {
        Ok(self.read_meta_u64(META_NOTE_TREE_SIZE)?.unwrap_or(0))
    }

    /// Fetch a note commitment by leaf index. `None` past the end.
    pub fn note_leaf(&self, index: u64) -> DbResult<Option<NoteCommitment>> {
        match self.notes.get(index.to_be_bytes())? {
            Some(bytes) => Ok(Some(to_array(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of nullifiers in the set.
    pub fn nullifier_set_size(&self) -> DbResult<u64> {
        Ok(self.read_meta_u64(META_NULLIFIER_SET_SIZE)?.unwrap_or(0))
    }

    /// True if the nullifier has been spent.
    pub fn contains_nullifier(&self, nullifier: &Nullifier) -> DbResult<bool> {
        Ok(self.nullifiers.contains_key(nullifier)?)
    }

    /// Hash of the block that spent this nullifier, if any.
    pub fn nullifier_spender(&self, nullifier: &Nullifier) -> DbResult<Option<BlockHash>> {
        match self.nullifiers.get(nullifier)? {
            Some(bytes) => Ok(Some(to_array(&bytes)?)),
            None => Ok(None),
        }
    }

    // -- Metadata -----------------------------------------------------------

    /// Hash of the genesis block. `None` until the chain is seeded.
    pub fn genesis_hash(&self) -> DbResult<Option<BlockHash>> {
        match self.metadata.get(META_GENESIS_HASH)? {
            Some(bytes) => Ok(Some(to_array(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_meta_u64(&self, key: &[u8]) -> DbResult<Option<u64>> {
        match self.metadata.get(key)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    DbError::Serialization(format!(
                        "metadata key {} is not a u64",
                        String::from_utf8_lossy(key)
                    ))
                })?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    // -- Atomic block commit ------------------------------------------------

    /// Apply one block's staged write set atomically across all trees.
    ///
    /// Re-checks every inserted nullifier from inside the transaction and
    /// aborts with [`ChainError::DoubleSpend`] if one is already present.
    /// On abort or storage failure nothing is persisted.
    pub fn commit_block(&self, commit: &BlockCommit) -> ChainResult<()> {
        // Serialize outside the transaction closure; it may run more than
        // once under contention.
        let header_key = commit.header.hash;
        let header_bytes = serialize(&commit.header)?;

        let graph_rows: Vec<([u8; 8], Vec<u8>)> = commit
            .graphs
            .iter()
            .map(|g| Ok((g.id.to_be_bytes(), serialize(g)?)))
            .collect::<DbResult<_>>()?;

        let note_start = commit.note_size_after - commit.notes.len() as u64;
        let note_rows: Vec<([u8; 8], NoteCommitment)> = commit
            .notes
            .iter()
            .enumerate()
            .map(|(i, note)| ((note_start + i as u64).to_be_bytes(), *note))
            .collect();

        let spender = commit.header.hash;
        let note_size_bytes = commit.note_size_after.to_be_bytes().to_vec();
        let nullifier_size_bytes = commit.nullifier_size_after.to_be_bytes().to_vec();
        let next_graph_id_bytes = commit.next_graph_id.map(|id| id.to_be_bytes().to_vec());

        let result = (
            &self.headers,
            &self.graphs,
            &self.notes,
            &self.nullifiers,
            &self.metadata,
        )
            .transaction(|(headers, graphs, notes, nullifiers, metadata)| {
                headers.insert(&header_key[..], header_bytes.clone())?;

                for (key, bytes) in &graph_rows {
                    graphs.insert(&key[..], bytes.clone())?;
                }

                for (key, note) in &note_rows {
                    notes.insert(&key[..], &note[..])?;
                }

                for nullifier in &commit.nullifiers {
                    if nullifiers.get(&nullifier[..])?.is_some() {
                        return Err(ConflictableTransactionError::Abort(
                            ChainError::DoubleSpend(*nullifier),
                        ));
                    }
                    nullifiers.insert(&nullifier[..], &spender[..])?;
                }

                metadata.insert(META_NOTE_TREE_SIZE, note_size_bytes.clone())?;
                metadata.insert(META_NULLIFIER_SET_SIZE, nullifier_size_bytes.clone())?;

                if let Some(next_id) = &next_graph_id_bytes {
                    metadata.insert(META_NEXT_GRAPH_ID, next_id.clone())?;
                }
                if let Some(genesis) = commit.genesis_hash {
                    metadata.insert(META_GENESIS_HASH, &genesis[..])?;
                }

                Ok(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(ChainError::Db(DbError::Sled(err))),
        }
    }

    /// Flush dirty buffers to disk. Tests and shutdown paths only; sled
    /// flushes on its own cadence during normal operation.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

fn serialize<T: serde::Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn to_array(bytes: &[u8]) -> DbResult<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| DbError::Serialization("expected a 32-byte value".to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::hash::blake3_hash;

    fn commit_for(block: &Block) -> BlockCommit {
        let mut commit = BlockCommit::new(block.header.clone());
        commit.notes = block.transactions.iter().flat_map(|tx| tx.notes.clone()).collect();
        commit.nullifiers = block
            .transactions
            .iter()
            .flat_map(|tx| tx.spends.clone())
            .collect();
        commit.note_size_after = commit.notes.len() as u64;
        commit.nullifier_size_after = commit.nullifiers.len() as u64;
        commit
    }

    #[test]
    fn header_round_trip() {
        let db = ChainDb::open_temporary().expect("temp db");
        let genesis = Block::genesis();

        assert!(db.block_header(&genesis.header.hash).unwrap().is_none());
        db.commit_block(&commit_for(&genesis)).unwrap();

        let stored = db.block_header(&genesis.header.hash).unwrap().unwrap();
        assert_eq!(stored, genesis.header);
        assert!(db.contains_header(&genesis.header.hash).unwrap());
    }

    #[test]
    fn graph_round_trip_and_counter() {
        let db = ChainDb::open_temporary().expect("temp db");
        assert_eq!(db.next_graph_id().unwrap(), 1);

        let genesis = Block::genesis();
        let mut commit = commit_for(&genesis);
        commit.stage_graph(Graph::root(1, genesis.header.hash));
        commit.next_graph_id = Some(2);
        db.commit_block(&commit).unwrap();

        let graph = db.graph(1).unwrap().unwrap();
        assert_eq!(graph.tail_hash, genesis.header.hash);
        assert_eq!(graph.merge_id, None);
        assert_eq!(db.next_graph_id().unwrap(), 2);
        assert!(db.graph(7).unwrap().is_none());
    }

    #[test]
    fn commit_appends_notes_and_nullifiers() {
        let db = ChainDb::open_temporary().expect("temp db");
        let genesis = Block::genesis();
        db.commit_block(&commit_for(&genesis)).unwrap();

        assert_eq!(db.note_tree_size().unwrap(), 1);
        assert_eq!(db.nullifier_set_size().unwrap(), 0);
        assert_eq!(
            db.note_leaf(0).unwrap().unwrap(),
            genesis.transactions[0].notes[0]
        );
        assert!(db.note_leaf(1).unwrap().is_none());
    }

    #[test]
    fn double_spend_aborts_whole_commit() {
        let db = ChainDb::open_temporary().expect("temp db");
        let genesis = Block::genesis();
        db.commit_block(&commit_for(&genesis)).unwrap();

        let nf = blake3_hash(b"spent-note");
        let block = Block::new_after(
            &genesis.header,
            vec![crate::block::Transaction::new(vec![], vec![nf], 0)],
            1,
            1,
            0,
        );
        let mut commit = commit_for(&block);
        // sizes continue from the seeded chain
        commit.note_size_after = db.note_tree_size().unwrap();
        commit.nullifier_size_after = db.nullifier_set_size().unwrap() + 1;
        db.commit_block(&commit).unwrap();

        // A second block spending the same nullifier must leave no trace.
        let conflicting = Block::new_after(
            &block.header,
            vec![crate::block::Transaction::new(
                vec![blake3_hash(b"fresh-note")],
                vec![nf],
                0,
            )],
            2,
            2,
            0,
        );
        let mut commit = commit_for(&conflicting);
        commit.note_size_after = db.note_tree_size().unwrap() + 1;
        commit.nullifier_size_after = db.nullifier_set_size().unwrap() + 1;

        let err = db.commit_block(&commit).unwrap_err();
        assert!(matches!(err, ChainError::DoubleSpend(n) if n == nf));
        assert!(db.block_header(&conflicting.header.hash).unwrap().is_none());
        assert_eq!(db.note_tree_size().unwrap(), 1);
        assert_eq!(
            db.nullifier_spender(&nf).unwrap().unwrap(),
            block.header.hash
        );
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let genesis = Block::genesis();

        {
            let db = ChainDb::open(dir.path()).expect("open");
            let mut commit = commit_for(&genesis);
            commit.genesis_hash = Some(genesis.header.hash);
            db.commit_block(&commit).unwrap();
            db.flush().unwrap();
        }

        let db = ChainDb::open(dir.path()).expect("reopen");
        assert_eq!(db.genesis_hash().unwrap(), Some(genesis.header.hash));
        assert!(db.block_header(&genesis.header.hash).unwrap().is_some());
    }
}

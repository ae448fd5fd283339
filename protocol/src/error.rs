//! # Error Taxonomy
//!
//! One enum for the whole chain core. The split that matters:
//!
//! - **Insertion rejections** (`UnknownParent`, `InvalidSequence`,
//!   `DoubleSpend`) — the block is refused, nothing is persisted, and the
//!   caller decides what to do (buffer, drop, ban the peer).
//! - **Traversal failures** (`NoPath`, `DivergingForks`) — the requested
//!   endpoints are not on one ancestor line. `NoPath` is detected before
//!   any header is produced; `DivergingForks` can surface mid-sequence,
//!   after some verified headers have already been yielded.
//! - **Integrity violations** (`MissingHeader`, `MissingGraph`) — a stored
//!   row references a row that does not exist. Never expected in healthy
//!   operation.
//!
//! Two conditions are deliberately *not* errors: re-adding a known block
//! (`add_block` reports `is_added = false`) and lookup misses (`None`).
//! Callers routinely probe for existence; making that a throw would turn
//! every probe into error-handling boilerplate.

use thiserror::Error;

use crate::block::Nullifier;
use crate::graph::GraphId;
use crate::hash::BlockHash;
use crate::storage::db::DbError;

/// Convenience alias used across the crate.
pub type ChainResult<T> = Result<T, ChainError>;

/// Everything that can go wrong while inserting into or walking the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The block's `previous_hash` is not in the store. Out-of-order
    /// delivery is the networking layer's problem to buffer; the core
    /// only accepts blocks whose parent is already accepted.
    #[error("unknown parent block {}", hex::encode(.0))]
    UnknownParent(BlockHash),

    /// The block's sequence is not `parent.sequence + 1`.
    #[error("invalid block sequence: expected {expected}, got {got}")]
    InvalidSequence { expected: u64, got: u64 },

    /// A nullifier in the block is already present in the nullifier set
    /// (or appears twice within the block). The whole insertion is
    /// rejected atomically.
    #[error("nullifier already spent: {}", hex::encode(.0))]
    DoubleSpend(Nullifier),

    /// Operation requires a seeded chain, but no genesis block is stored.
    #[error("chain is empty: no genesis block")]
    EmptyChain,

    /// Traversal endpoints have no graph-level relation at all.
    #[error("start path does not match from block, are they on a fork?")]
    NoPath,

    /// The graph-level check was optimistic, but the verified parent-link
    /// walk proved the endpoints lie on diverging forks.
    #[error("failed to iterate between blocks on diverging forks")]
    DivergingForks,

    /// A stored row references a header that is not in the store.
    #[error("missing block header {}", hex::encode(.0))]
    MissingHeader(BlockHash),

    /// A header or graph references a graph row that is not in the store.
    #[error("missing graph {0}")]
    MissingGraph(GraphId),

    /// Storage engine failure.
    #[error(transparent)]
    Db(#[from] DbError),
}

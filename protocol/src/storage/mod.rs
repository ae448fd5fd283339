//! # Storage Module
//!
//! Persistent state for the VEIL chain core. Everything the chain knows —
//! headers, graph rows, note commitments, spent nullifiers — lives in one
//! sled database managed here.
//!
//! ## Architecture
//!
//! ```text
//! db.rs         — ChainDb: sled trees, typed accessors, atomic block commit
//! notes.rs      — NoteTree: append-only indexable Merkle accumulator
//! nullifiers.rs — NullifierSet: membership set of spent nullifiers
//! ```
//!
//! ## Data Flow
//!
//! Writes converge: `add_block` stages a `BlockCommit` (header + graph
//! rows + accumulator appends + counters) and `ChainDb::commit_block`
//! lands it in one transaction. Reads fan out: the accumulators and the
//! traversal engine each query their own trees independently.
//!
//! Storage holds no policy. What a valid insertion *is* — parent known,
//! sequence contiguous, no double spends — is decided by the chain
//! orchestrator; this layer guarantees only that an accepted block's
//! writes land together or not at all.

pub mod db;
pub mod notes;
pub mod nullifiers;

pub use db::{BlockCommit, ChainDb, DbError, DbResult};
pub use notes::{MerkleWitness, NoteTree, WitnessNode};
pub use nullifiers::NullifierSet;

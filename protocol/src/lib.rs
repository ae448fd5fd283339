// Copyright (c) 2026 VEIL Contributors. MIT License.
// See LICENSE for details.

//! # VEIL Protocol — Chain Core
//!
//! The consensus-side core of VEIL: a fork-tolerant block store for a
//! privacy chain. Blocks carry shielded notes and nullifiers; the chain
//! keeps *every* valid fork, tracks the heaviest tip without walking the
//! whole tree, and lets callers traverse between any two related blocks.
//!
//! VEIL takes a pragmatic stance: BLAKE3 for hashing (fast and boring in
//! the good way), sled for storage (embedded, transactional, no daemon to
//! babysit), and bincode on the wire to disk (compact and unambiguous).
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! chain core:
//!
//! - **block** — Headers, transactions, and block assembly.
//! - **chain** — The orchestrator: validate, insert, pick the head.
//! - **graph** — Segment bookkeeping that makes fork choice O(forks),
//!   not O(blocks).
//! - **traversal** — Lazy iterators between blocks, fork finding.
//! - **weight** — Pluggable fork-choice weight strategies.
//! - **storage** — sled-backed persistence: headers, graphs, the note
//!   tree, the nullifier set. One atomic commit per block.
//! - **hash** — BLAKE3 helpers shared by everything above.
//! - **config** — Protocol constants.
//!
//! ## Design Philosophy
//!
//! 1. Forks are data, not errors. Store them all; let weight decide.
//! 2. A block is in or it is out — no half-committed state, ever.
//! 3. Traversal is lazy. Producing a header may fail; yielded ones don't.
//! 4. If it touches the accumulators, it has tests. Plural.

pub mod block;
pub mod chain;
pub mod config;
pub mod error;
pub mod graph;
pub mod hash;
pub mod storage;
pub mod traversal;
pub mod weight;

pub use block::{Block, BlockHeader, NoteCommitment, Nullifier, Transaction};
pub use chain::{AddBlockResult, Blockchain};
pub use error::{ChainError, ChainResult};
pub use graph::{Graph, GraphId};
pub use hash::BlockHash;
pub use traversal::{BlockIterator, ForkInfo};
pub use weight::{HeaviestWork, LongestChain, WeightStrategy};

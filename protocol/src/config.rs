//! # Protocol Constants
//!
//! Every magic number in VEIL lives here. These values are part of the
//! chain's identity: changing any of them after a network launches splits
//! that network in two.

/// Sequence number of the genesis block. VEIL counts blocks from 1, so a
/// header with `sequence == 1` and a zeroed `previous_hash` is genesis.
pub const GENESIS_SEQUENCE: u64 = 1;

/// Coinbase message embedded in the genesis block's single miners-fee note.
/// The chain's birth certificate: a fixed, tamper-evident record of when
/// and why the network was created.
pub const GENESIS_COINBASE_MESSAGE: &[u8] =
    b"VEIL/2026: a private matter is something one doesn't want the whole world to know";

/// Timestamp (milliseconds) of the genesis block. Epoch zero.
pub const GENESIS_TIMESTAMP_MS: u64 = 0;

/// Reserved graph id meaning "not yet assigned". Candidate headers carry
/// this until `add_block` accepts them onto a segment; real graph ids are
/// allocated from a persisted counter starting at 1.
pub const GRAPH_ID_UNASSIGNED: u64 = 0;

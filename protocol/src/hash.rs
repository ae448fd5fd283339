//! # Hashing Primitives
//!
//! BLAKE3 everywhere. Block hashes, transaction hashes, note commitments,
//! and every internal node of the note-commitment accumulator all use the
//! same 32-byte BLAKE3 digest, so the whole crate moves a single fixed-size
//! array around instead of juggling digest types.

/// A 32-byte BLAKE3 digest identifying a block.
pub type BlockHash = [u8; 32];

/// The all-zero hash. Used as the `previous_hash` of the genesis block and
/// as the root of an empty Merkle tree.
pub const ZERO_HASH: BlockHash = [0u8; 32];

/// Compute the BLAKE3 hash of the input data.
///
/// Returns a fixed-size 32-byte digest. The `blake3` crate picks up SIMD
/// acceleration on every platform we care about, so this is never the
/// bottleneck.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash an internal Merkle node: `BLAKE3(left || right)`.
pub fn merkle_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left);
    combined[32..].copy_from_slice(right);
    blake3_hash(&combined)
}

/// Render a hash as lowercase hex for logs and error messages.
pub fn hash_hex(hash: &BlockHash) -> String {
    hex::encode(hash)
}

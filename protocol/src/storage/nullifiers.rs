//! # Nullifier Set
//!
//! The set of every nullifier revealed by a committed transaction. A
//! nullifier entering this set is what marks a note as spent; a second
//! appearance of the same nullifier is a double-spend and rejects the
//! whole block carrying it.
//!
//! Inserts ride inside the atomic block commit (`ChainDb::commit_block`),
//! which re-checks membership from within the transaction. This type is
//! the read interface: membership, size, and which block spent a given
//! nullifier.

use std::sync::Arc;

use crate::block::Nullifier;
use crate::hash::BlockHash;
use crate::storage::db::{ChainDb, DbResult};

/// Read interface over the spent-nullifier set.
#[derive(Debug, Clone)]
pub struct NullifierSet {
    db: Arc<ChainDb>,
}

impl NullifierSet {
    pub fn new(db: Arc<ChainDb>) -> Self {
        Self { db }
    }

    /// Number of nullifiers in the set.
    pub fn size(&self) -> DbResult<u64> {
        self.db.nullifier_set_size()
    }

    /// True if the nullifier has been spent.
    pub fn contains(&self, nullifier: &Nullifier) -> DbResult<bool> {
        self.db.contains_nullifier(nullifier)
    }

    /// Hash of the block that spent this nullifier, if any.
    pub fn spender(&self, nullifier: &Nullifier) -> DbResult<Option<BlockHash>> {
        self.db.nullifier_spender(nullifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, Transaction};
    use crate::hash::blake3_hash;
    use crate::storage::db::BlockCommit;

    #[test]
    fn membership_and_spender() {
        let db = Arc::new(ChainDb::open_temporary().unwrap());
        let set = NullifierSet::new(Arc::clone(&db));

        let nf = blake3_hash(b"spent");
        assert_eq!(set.size().unwrap(), 0);
        assert!(!set.contains(&nf).unwrap());
        assert_eq!(set.spender(&nf).unwrap(), None);

        let genesis = Block::genesis();
        let block = Block::new_after(
            &genesis.header,
            vec![Transaction::new(vec![], vec![nf], 0)],
            1,
            1,
            0,
        );
        let mut commit = BlockCommit::new(block.header.clone());
        commit.nullifiers = vec![nf];
        commit.nullifier_size_after = 1;
        db.commit_block(&commit).unwrap();

        assert_eq!(set.size().unwrap(), 1);
        assert!(set.contains(&nf).unwrap());
        assert_eq!(set.spender(&nf).unwrap(), Some(block.header.hash));
    }
}

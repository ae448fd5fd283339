//! # Chain Weight
//!
//! Competing tips are compared by cumulative weight. What exactly "weight"
//! means is a policy choice, so the chain takes it as a pluggable strategy:
//!
//! - [`LongestChain`] — every block contributes 1. The heaviest tip is
//!   simply the deepest one.
//! - [`HeaviestWork`] — every block contributes its `work` units (clamped
//!   to at least 1), so a short chain of hard blocks can outweigh a longer
//!   chain of easy ones.
//!
//! Whatever the strategy, the contract is the same: cumulative weight must
//! be **strictly increasing** along every parent-child edge. Heaviest-tip
//! propagation (`graph::GraphManager::update_heaviest`) relies on that
//! monotonicity to stop walking early. Ties between equal-weight tips are
//! broken in favour of the earlier insertion, which falls out of the
//! strictly-greater comparison there.

use crate::block::BlockHeader;

/// Policy for accumulating chain weight block by block.
pub trait WeightStrategy: Send + Sync {
    /// Cumulative weight of a chain ending at `header`, given the
    /// cumulative weight of its parent (0 for genesis).
    ///
    /// Implementations must return a value strictly greater than
    /// `parent_weight`.
    fn cumulative_weight(&self, parent_weight: u128, header: &BlockHeader) -> u128;
}

/// Longest chain wins: each block adds exactly 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongestChain;

impl WeightStrategy for LongestChain {
    fn cumulative_weight(&self, parent_weight: u128, _header: &BlockHeader) -> u128 {
        parent_weight + 1
    }
}

/// Most accumulated work wins: each block adds its `work` units.
///
/// Blocks with zero work still add 1 so that weight stays strictly
/// increasing with sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaviestWork;

impl WeightStrategy for HeaviestWork {
    fn cumulative_weight(&self, parent_weight: u128, header: &BlockHeader) -> u128 {
        parent_weight + u128::from(header.work.max(1))
    }
}

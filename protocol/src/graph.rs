//! # Chain Segments ("Graphs")
//!
//! The block tree is partitioned into *graphs*: contiguous, fork-free runs
//! of blocks. As long as nobody forks, the whole chain is one graph. The
//! moment a second child appears under some parent, the late child starts
//! a new graph whose `merge_id` points back at the run that won the race
//! to extend that parent.
//!
//! ```text
//!        graph 1: G ── A1 ── A2            (tail G, latest A2)
//!                        │
//!        graph 2:        └─ B2 ── B3       (tail B2, merge_id = 1)
//! ```
//!
//! Two consequences make this cheap to maintain:
//!
//! - `merge_id` chains always lead back to the genesis graph, so a new
//!   tip's weight needs to be compared along one short chain of graph
//!   rows, not along the whole block history.
//! - `heaviest_hash` on each row is monotone in that chain: once a row on
//!   the path already holds a tip at least as heavy as the candidate,
//!   every row above it does too, and propagation stops early.
//!
//! Graph rows are plain records addressed by `u64` ids in a flat table —
//! arena-style indices rather than object references, so the back-pointers
//! (`merge_id`) cost nothing and the table can only grow.
//!
//! All mutations here are *staged* into a [`BlockCommit`]; the orchestrator
//! commits them atomically with the header and accumulator writes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::BlockHeader;
use crate::error::{ChainError, ChainResult};
use crate::hash::{hash_hex, BlockHash};
use crate::storage::db::{BlockCommit, ChainDb};

/// Arena-style index of a graph row. Allocated from a persisted counter,
/// starting at 1; 0 is reserved for "unassigned".
pub type GraphId = u64;

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// One contiguous, fork-free run of blocks.
///
/// - `tail_hash` — first block of the run: genesis, or the block that
///   forked away from a sibling run.
/// - `latest_hash` — tip most recently appended *directly* onto this run.
/// - `heaviest_hash` — best tip reachable from this run's tail, possibly
///   in a descendant graph.
/// - `merge_id` — the sibling graph that held the competing continuation
///   when this run was created; `None` for the genesis run.
///
/// Rows are created on fork, mutated on every direct extension and on
/// heaviest-tip propagation, and never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    /// Row id. Stable for the lifetime of the store.
    pub id: GraphId,
    /// First block of this run.
    pub tail_hash: BlockHash,
    /// Most recent direct extension of this run.
    pub latest_hash: BlockHash,
    /// Heaviest tip known beneath this run's tail.
    pub heaviest_hash: BlockHash,
    /// Sibling run this one forked away from, if any.
    pub merge_id: Option<GraphId>,
}

impl Graph {
    /// Row for a run that starts a chain: genesis.
    pub fn root(id: GraphId, tail_hash: BlockHash) -> Self {
        Self {
            id,
            tail_hash,
            latest_hash: tail_hash,
            heaviest_hash: tail_hash,
            merge_id: None,
        }
    }

    /// Row for a run that forks away from `merge_id` at `tail_hash`.
    pub fn fork(id: GraphId, tail_hash: BlockHash, merge_id: GraphId) -> Self {
        Self {
            id,
            tail_hash,
            latest_hash: tail_hash,
            heaviest_hash: tail_hash,
            merge_id: Some(merge_id),
        }
    }
}

// ---------------------------------------------------------------------------
// GraphManager
// ---------------------------------------------------------------------------

/// Owns the segment bookkeeping: assigning accepted blocks to graphs and
/// propagating the heaviest-tip pointer up the merge chain.
#[derive(Debug, Clone)]
pub struct GraphManager {
    db: Arc<ChainDb>,
}

impl GraphManager {
    pub fn new(db: Arc<ChainDb>) -> Self {
        Self { db }
    }

    /// Stage the genesis graph row for an empty chain and assign the new
    /// header to it.
    pub fn create_root(&self, commit: &mut BlockCommit) -> ChainResult<GraphId> {
        let id = self.allocate_id(commit)?;
        commit.stage_graph(Graph::root(id, commit.header.hash));
        commit.header.graph_id = id;
        Ok(id)
    }

    /// Assign the header in `commit` to a graph, given its parent.
    ///
    /// If the parent is still the tip of its run, the new header inherits
    /// the parent's graph and advances `latest_hash`. Otherwise a sibling
    /// already extended the parent, so the new header starts a fresh graph
    /// whose `merge_id` records the run that won the race.
    pub fn assign(&self, commit: &mut BlockCommit, parent: &BlockHeader) -> ChainResult<GraphId> {
        let new_hash = commit.header.hash;
        let mut parent_graph = self.stored_graph(parent.graph_id)?;

        if parent_graph.latest_hash == parent.hash {
            parent_graph.latest_hash = new_hash;
            commit.stage_graph(parent_graph);
            commit.header.graph_id = parent.graph_id;
            return Ok(parent.graph_id);
        }

        let id = self.allocate_id(commit)?;
        commit.stage_graph(Graph::fork(id, new_hash, parent.graph_id));
        commit.header.graph_id = id;
        debug!(
            graph = id,
            merge = parent.graph_id,
            tail = %hash_hex(&new_hash),
            "fork created a new graph"
        );
        Ok(id)
    }

    /// Propagate the new header as a heaviest-tip candidate up the merge
    /// chain, stopping at the first row whose incumbent is at least as
    /// heavy.
    ///
    /// The strictly-greater comparison is what breaks weight ties in
    /// favour of the earlier insertion. Cost is O(merge-chain depth), not
    /// O(chain length).
    pub fn update_heaviest(&self, commit: &mut BlockCommit) -> ChainResult<()> {
        let candidate_hash = commit.header.hash;
        let candidate_weight = commit.header.weight;

        let mut next = Some(commit.header.graph_id);
        while let Some(id) = next {
            let mut graph = self.graph_row(commit, id)?;

            if graph.heaviest_hash == candidate_hash {
                // Freshly created fork row; its own run already points at
                // the candidate. Keep climbing.
                next = graph.merge_id;
                continue;
            }

            let incumbent = self.header_weight(commit, &graph.heaviest_hash)?;
            if candidate_weight <= incumbent {
                break;
            }

            debug!(
                graph = id,
                heaviest = %hash_hex(&candidate_hash),
                weight = candidate_weight,
                "heaviest tip updated"
            );
            graph.heaviest_hash = candidate_hash;
            next = graph.merge_id;
            commit.stage_graph(graph);
        }

        Ok(())
    }

    /// Graph row by id, preferring rows already staged in this commit.
    fn graph_row(&self, commit: &BlockCommit, id: GraphId) -> ChainResult<Graph> {
        if let Some(staged) = commit.staged_graph(id) {
            return Ok(staged.clone());
        }
        self.stored_graph(id)
    }

    fn stored_graph(&self, id: GraphId) -> ChainResult<Graph> {
        self.db.graph(id)?.ok_or(ChainError::MissingGraph(id))
    }

    /// Cumulative weight of the header a graph row points at. The header
    /// may be the one being committed right now.
    fn header_weight(&self, commit: &BlockCommit, hash: &BlockHash) -> ChainResult<u128> {
        if *hash == commit.header.hash {
            return Ok(commit.header.weight);
        }
        let header = self
            .db
            .block_header(hash)?
            .ok_or(ChainError::MissingHeader(*hash))?;
        Ok(header.weight)
    }

    /// Reserve the next graph id and stage the bumped counter.
    fn allocate_id(&self, commit: &mut BlockCommit) -> ChainResult<GraphId> {
        let id = match commit.next_graph_id {
            Some(next) => next,
            None => self.db.next_graph_id()?,
        };
        commit.next_graph_id = Some(id + 1);
        Ok(id)
    }
}

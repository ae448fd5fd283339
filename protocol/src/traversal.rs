//! # Traversal Engine
//!
//! Lazy, cancellable walks over the block tree, built on the header store
//! plus the graph table. All sequences are pull-based iterators: producing
//! the next header may hit the store, already-produced headers are final,
//! and cancellation is simply dropping the iterator.
//!
//! ## Two-phase correctness
//!
//! Walking between two arbitrary blocks is only meaningful when one is a
//! true ancestor of the other. That is checked in two phases:
//!
//! 1. **Cheap graph check** at construction: follow `merge_id` chains
//!    between the endpoints' graphs. If the graphs cannot possibly
//!    connect, the walk fails with [`ChainError::NoPath`] before a single
//!    header is produced.
//! 2. **Verified walk** while producing: every yielded header is checked
//!    against its neighbour's `previous_hash` link (and the walk must land
//!    exactly on the far endpoint). The graph check is optimistic — two
//!    forks can share a graph path — so a mismatch here surfaces as
//!    [`ChainError::DivergingForks`], possibly after some (individually
//!    correct) headers were already yielded.
//!
//! Ascending walks have no child pointers to follow, so each graph
//! segment on the path is reconstructed by descending from the segment's
//! upper boundary and replayed forward. At most one segment is buffered
//! at a time.

use std::collections::VecDeque;

use crate::block::BlockHeader;
use crate::chain::Blockchain;
use crate::error::{ChainError, ChainResult};
use crate::graph::GraphId;
use crate::hash::BlockHash;

/// Result of [`find_fork`]: the lowest common ancestor, and whether the
/// two inputs were already on one line (no true branching between them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkInfo {
    /// The lowest common ancestor of the two inputs.
    pub fork: BlockHeader,
    /// True iff `fork` equals one of the inputs.
    pub is_linear: bool,
}

// ---------------------------------------------------------------------------
// Iterator construction
// ---------------------------------------------------------------------------

/// Ascending walk genesis → heaviest tip. Empty on an unseeded store.
pub(crate) fn iterate_to_head(chain: &Blockchain) -> BlockIterator<'_> {
    let genesis = match chain.genesis_header() {
        Ok(Some(genesis)) => genesis,
        Ok(None) => return BlockIterator::done(chain),
        Err(err) => return BlockIterator::failed(chain, err),
    };

    let head = match chain
        .read_graph(genesis.graph_id)
        .and_then(|graph| chain.read_header(&graph.heaviest_hash))
    {
        Ok(head) => head,
        Err(err) => return BlockIterator::failed(chain, err),
    };

    iterate_to_block(chain, &genesis, &head)
}

/// Walk between two stored headers, inclusive. Direction follows the
/// sequence numbers; `from == to` yields that one header exactly once.
pub(crate) fn iterate_to_block<'a>(
    chain: &'a Blockchain,
    from: &BlockHeader,
    to: &BlockHeader,
) -> BlockIterator<'a> {
    // Work from the stored versions: callers may hold candidate headers
    // whose bookkeeping fields were never assigned.
    let (from, to) = match (chain.read_header(&from.hash), chain.read_header(&to.hash)) {
        (Ok(from), Ok(to)) => (from, to),
        (Err(err), _) | (_, Err(err)) => return BlockIterator::failed(chain, err),
    };

    if from.hash == to.hash {
        return BlockIterator {
            chain,
            state: IterState::Single(Some(from)),
        };
    }

    if from.sequence <= to.sequence {
        match graph_path(chain, from.graph_id, to.graph_id) {
            Ok(path) => BlockIterator {
                chain,
                state: IterState::Ascending(Ascending {
                    from,
                    to,
                    path,
                    next_segment: 0,
                    segment: VecDeque::new(),
                    prev_hash: None,
                    reached_to: false,
                }),
            },
            Err(err) => BlockIterator::failed(chain, err),
        }
    } else {
        // Descending: `to` must be an ancestor, so `from`'s merge chain
        // has to pass through `to`'s graph.
        match graph_path(chain, to.graph_id, from.graph_id) {
            Ok(_) => BlockIterator {
                chain,
                state: IterState::Descending(Descending {
                    from,
                    to,
                    prev: None,
                }),
            },
            Err(err) => BlockIterator::failed(chain, err),
        }
    }
}

/// Follow `merge_id` links from `descendant` up to `ancestor`.
///
/// Returns the graph ids ordered ancestor-first. Fails with `NoPath` when
/// the chain of merges never reaches `ancestor`'s graph — the blocks
/// cannot be related.
fn graph_path(
    chain: &Blockchain,
    ancestor: GraphId,
    descendant: GraphId,
) -> ChainResult<Vec<GraphId>> {
    let mut path = Vec::new();
    let mut current = descendant;
    loop {
        path.push(current);
        if current == ancestor {
            break;
        }
        match chain.read_graph(current)?.merge_id {
            Some(merge) => current = merge,
            None => return Err(ChainError::NoPath),
        }
    }
    path.reverse();
    Ok(path)
}

// ---------------------------------------------------------------------------
// BlockIterator
// ---------------------------------------------------------------------------

/// Lazy sequence of headers between two blocks. Fused: after yielding an
/// error (or finishing), it only returns `None`.
pub struct BlockIterator<'a> {
    chain: &'a Blockchain,
    state: IterState,
}

enum IterState {
    /// Construction failed; yield the error once.
    Failed(Option<ChainError>),
    /// `from == to`: one header, once.
    Single(Option<BlockHeader>),
    Ascending(Ascending),
    Descending(Descending),
    Done,
}

impl<'a> BlockIterator<'a> {
    fn done(chain: &'a Blockchain) -> Self {
        Self {
            chain,
            state: IterState::Done,
        }
    }

    fn failed(chain: &'a Blockchain, err: ChainError) -> Self {
        Self {
            chain,
            state: IterState::Failed(Some(err)),
        }
    }

    /// Drain the iterator into a vector, stopping at the first error.
    /// Test-friendly counterpart of lazily pulling.
    pub fn collect_headers(self) -> ChainResult<Vec<BlockHeader>> {
        let mut headers = Vec::new();
        for item in self {
            headers.push(item?);
        }
        Ok(headers)
    }
}

impl Iterator for BlockIterator<'_> {
    type Item = ChainResult<BlockHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = match &mut self.state {
            IterState::Done => return None,
            IterState::Failed(err) => {
                let err = err.take();
                self.state = IterState::Done;
                return err.map(Err);
            }
            IterState::Single(header) => {
                let header = header.take();
                self.state = IterState::Done;
                return header.map(Ok);
            }
            IterState::Ascending(walk) => walk.produce(self.chain),
            IterState::Descending(walk) => walk.produce(self.chain),
        };

        match step {
            Step::Yield(header) => Some(Ok(header)),
            Step::Finished => {
                self.state = IterState::Done;
                None
            }
            Step::Fail(err) => {
                self.state = IterState::Done;
                Some(Err(err))
            }
        }
    }
}

enum Step {
    Yield(BlockHeader),
    Finished,
    Fail(ChainError),
}

// ---------------------------------------------------------------------------
// Ascending walk
// ---------------------------------------------------------------------------

struct Ascending {
    from: BlockHeader,
    to: BlockHeader,
    /// Graphs on the route, ancestor-first (`from`'s graph .. `to`'s).
    path: Vec<GraphId>,
    /// Index of the next segment to reconstruct.
    next_segment: usize,
    /// Headers of the current segment, in ascending order.
    segment: VecDeque<BlockHeader>,
    /// Hash of the last yielded header, for link verification.
    prev_hash: Option<BlockHash>,
    reached_to: bool,
}

impl Ascending {
    fn produce(&mut self, chain: &Blockchain) -> Step {
        loop {
            if let Some(header) = self.segment.pop_front() {
                // Verify before yielding: the first header must be `from`
                // itself, every later one must link onto its predecessor.
                let linked = match self.prev_hash {
                    None => header.hash == self.from.hash,
                    Some(prev) => header.previous_hash == prev,
                };
                if !linked {
                    return Step::Fail(ChainError::DivergingForks);
                }

                self.prev_hash = Some(header.hash);
                if header.hash == self.to.hash {
                    self.reached_to = true;
                }
                return Step::Yield(header);
            }

            if self.reached_to || self.next_segment >= self.path.len() {
                return Step::Finished;
            }

            if let Err(err) = self.materialize_segment(chain) {
                return Step::Fail(err);
            }
            self.next_segment += 1;
        }
    }

    /// Rebuild segment `next_segment` in ascending order by descending
    /// from its upper boundary.
    ///
    /// The upper boundary is `to` for the last graph on the path, and the
    /// parent of the *next* graph's tail otherwise (that parent lies in
    /// this graph by construction of `merge_id`). The lower boundary is
    /// `from` for the first segment and the graph's own tail after that.
    fn materialize_segment(&mut self, chain: &Blockchain) -> ChainResult<()> {
        let index = self.next_segment;
        let is_last = index + 1 == self.path.len();

        let upper = if is_last {
            self.to.clone()
        } else {
            let next_tail_hash = chain.read_graph(self.path[index + 1])?.tail_hash;
            let next_tail = chain.read_header(&next_tail_hash)?;
            chain.read_header(&next_tail.previous_hash)?
        };

        let lower_sequence = if index == 0 {
            self.from.sequence
        } else {
            let tail_hash = chain.read_graph(self.path[index])?.tail_hash;
            chain.read_header(&tail_hash)?.sequence
        };

        let mut current = upper;
        let mut segment = VecDeque::with_capacity(
            current.sequence.saturating_sub(lower_sequence) as usize + 1,
        );
        loop {
            let at_bottom = current.sequence <= lower_sequence;
            segment.push_front(current.clone());
            if at_bottom {
                break;
            }
            current = chain.read_header(&current.previous_hash)?;
        }

        self.segment = segment;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Descending walk
// ---------------------------------------------------------------------------

struct Descending {
    from: BlockHeader,
    to: BlockHeader,
    /// Last yielded header; `None` before the first yield.
    prev: Option<BlockHeader>,
}

impl Descending {
    fn produce(&mut self, chain: &Blockchain) -> Step {
        let produced = match &self.prev {
            None => self.from.clone(),
            Some(prev) => {
                if prev.hash == self.to.hash {
                    return Step::Finished;
                }
                match chain.read_header(&prev.previous_hash) {
                    Ok(parent) => parent,
                    Err(err) => return Step::Fail(err),
                }
            }
        };

        // Landing at `to`'s height anywhere but on `to` itself means the
        // endpoints sit on diverging forks.
        if produced.sequence <= self.to.sequence && produced.hash != self.to.hash {
            return Step::Fail(ChainError::DivergingForks);
        }

        self.prev = Some(produced.clone());
        Step::Yield(produced)
    }
}

// ---------------------------------------------------------------------------
// Fork finding
// ---------------------------------------------------------------------------

/// Lowest common ancestor of `left` and `right`.
///
/// Steps whichever side is deeper back toward genesis until the two meet.
/// When a side's whole current run lies above the other side, the walk
/// skips the run in one hop via the graph's `tail_hash`.
pub(crate) fn find_fork(
    chain: &Blockchain,
    left: &BlockHeader,
    right: &BlockHeader,
) -> ChainResult<ForkInfo> {
    let left = chain.read_header(&left.hash)?;
    let right = chain.read_header(&right.hash)?;

    let mut a = left.clone();
    let mut b = right.clone();

    while a.hash != b.hash {
        if a.sequence > b.sequence {
            a = step_back(chain, &a, b.sequence)?;
        } else if b.sequence > a.sequence {
            b = step_back(chain, &b, a.sequence)?;
        } else {
            a = chain.read_header(&a.previous_hash)?;
            b = chain.read_header(&b.previous_hash)?;
        }
    }

    let is_linear = a.hash == left.hash || a.hash == right.hash;
    Ok(ForkInfo { fork: a, is_linear })
}

/// One step (or one whole-run skip) toward genesis. `header.sequence`
/// must be greater than `floor`.
fn step_back(chain: &Blockchain, header: &BlockHeader, floor: u64) -> ChainResult<BlockHeader> {
    let graph = chain.read_graph(header.graph_id)?;
    let tail = chain.read_header(&graph.tail_hash)?;

    if tail.sequence > floor {
        // The other side sits below this entire run, so the common
        // ancestor does too. Jump straight to the run's parent.
        chain.read_header(&tail.previous_hash)
    } else {
        chain.read_header(&header.previous_hash)
    }
}

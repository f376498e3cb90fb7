//! # Collapse
//!
//! Streaming graph simplification. `CollapseEngine` buffers path nodes from
//! an upstream builder, hands each node that reaches the horizon to a
//! `CollapseStrategy`, and emits nodes once no further collapse can touch
//! them.
//!
//! | Type | Module | Role |
//! |------|--------|------|
//! | `CollapseEngine` | `engine` | Buffering, horizon, requeue, ordered emission |
//! | `LeafBubbleCollapse` | `leaf_bubble` | Leaf and bubble search-and-merge policy |
//! | `TraversalState` | `traversal` | Backward-linked search path record |

pub mod engine;
pub mod leaf_bubble;
pub mod traversal;

use serde::{Deserialize, Serialize};

use crate::graph::PathGraph;
use crate::model::{NodeId, PathNode};
use crate::{Error, Result};

pub use engine::CollapseEngine;
pub use leaf_bubble::LeafBubbleCollapse;
pub use traversal::TraversalState;

/// Extra lookahead, in multiples of the maximum collapse length, so that a
/// bubble nested on another bubble's branch is still buffered when the
/// outer collapse exposes it:
///
/// ```text
///         B
///        / \
///       A - A      A only becomes a bubble once B is collapsed
///      /     \
///  * - * - * - * - *
/// ```
pub const RECOLLAPSE_MARGIN: usize = 1;

// ============================================================================
// Configuration
// ============================================================================

/// Collapse parameters.
///
/// Fields are signed so that negative values in a deserialized document
/// reach `validate()` and are rejected there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseConfig {
    /// K-mer length.
    pub k: i64,
    /// Maximum traversed length, in k-mers, of a single collapse attempt.
    pub max_path_collapse_length: i64,
    /// Inclusive base mismatch budget per collapse attempt.
    pub max_bases_mismatch: i64,
}

impl CollapseConfig {
    pub fn new(k: i64, max_path_collapse_length: i64, max_bases_mismatch: i64) -> Result<Self> {
        let config = Self { k, max_path_collapse_length, max_bases_mismatch };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.k <= 0 || self.k > 32 {
            return Err(Error::InvalidConfig(format!("k must be in 1..=32, got {}", self.k)));
        }
        if self.max_path_collapse_length < 0 {
            return Err(Error::InvalidConfig(format!(
                "max_path_collapse_length must not be negative, got {}",
                self.max_path_collapse_length
            )));
        }
        if self.max_bases_mismatch < 0 {
            return Err(Error::InvalidConfig(format!(
                "max_bases_mismatch must not be negative, got {}",
                self.max_bases_mismatch
            )));
        }
        Ok(())
    }

    pub fn kmer_length(&self) -> usize {
        self.k as usize
    }

    pub fn max_collapse_length(&self) -> usize {
        self.max_path_collapse_length as usize
    }

    pub fn mismatch_budget(&self) -> usize {
        self.max_bases_mismatch as usize
    }

    /// How far past a node's last k-mer the engine must have loaded input
    /// before the node can be collapsed.
    pub fn lookahead(&self) -> i64 {
        (self.max_collapse_length() * (1 + RECOLLAPSE_MARGIN)) as i64
    }
}

// ============================================================================
// Strategy seam
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeKind {
    /// A dead-end branch was folded into a surviving path.
    Leaf,
    /// A reconverging branch was folded into its sibling.
    Bubble,
}

/// A committed merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    pub kind: MergeKind,
    /// Surviving nodes that absorbed support.
    pub survivors: Vec<NodeId>,
}

/// Search-and-merge policy plugged into `CollapseEngine`.
pub trait CollapseStrategy {
    /// Attempt one collapse starting at `node`. Returns the merge if one was
    /// committed.
    fn collapse(&mut self, graph: &mut PathGraph, node: NodeId, max_collapse_length: usize) -> Result<Option<Merge>>;

    /// Whether nodes touched by a merge must be processed again.
    fn reprocess_merged_nodes(&self) -> bool {
        true
    }
}

/// Running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseStats {
    pub leaves_collapsed: u64,
    pub branches_collapsed: u64,
    pub nodes_processed: u64,
    pub nodes_emitted: u64,
}

/// Run a fresh engine over `nodes` and collect its output.
pub fn collapse_all(nodes: impl IntoIterator<Item = PathNode>, config: CollapseConfig) -> Result<Vec<PathNode>> {
    CollapseEngine::new(nodes.into_iter().map(Ok), config)?.collect()
}

//! # debruijn-collapse: Streaming Positional de Bruijn Graph Simplification
//!
//! Removes sequencing-error tips (leaves) and low-support reconverging
//! branches (bubbles) from a positional de Bruijn assembly graph while the
//! graph is being streamed out of an upstream graph builder.
//!
//! ## Design Principles
//!
//! 1. **Arena-owned graph**: `PathGraph` owns every live node, addressed by `NodeId`
//! 2. **Positional topology**: every edge carries the offset range over which it is valid
//! 3. **Pull-driven**: `CollapseEngine` is an `Iterator`; nothing happens until the consumer pulls
//! 4. **Strategy seam**: the search-and-merge policy sits behind `CollapseStrategy`
//!
//! ## Quick Start
//!
//! ```rust
//! use debruijn_collapse::{collapse_all, kmers_from_sequence, CollapseConfig, NodeId, PathNode};
//!
//! # fn example() -> debruijn_collapse::Result<()> {
//! let config = CollapseConfig::new(4, 10, 1)?;
//! let kmers = kmers_from_sequence(b"ACGTTGCA", 4).unwrap();
//! let weights = vec![3; kmers.len()];
//! let node = PathNode::new(NodeId(1), kmers, weights, 100, 100);
//!
//! let output = collapse_all(vec![node], config)?;
//! assert_eq!(output.len(), 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod graph;
pub mod collapse;
pub mod export;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    Direction, Edge, Interval, Kmer, NodeId, PathNode,
    decode_kmer, encode_bases, kmers_from_sequence,
};

// ============================================================================
// Re-exports: Graph
// ============================================================================

pub use graph::{Degree, DegreeMap, PathGraph, PathSubnode};

// ============================================================================
// Re-exports: Collapse
// ============================================================================

pub use collapse::{
    CollapseConfig, CollapseEngine, CollapseStats, CollapseStrategy,
    LeafBubbleCollapse, Merge, MergeKind, TraversalState, collapse_all,
    RECOLLAPSE_MARGIN,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Node {node}: k-mer {index} does not overlap its predecessor by k-1 bases")]
    NonContiguousKmers { node: NodeId, index: usize },

    #[error("Node {node}: {reason}")]
    MalformedNode { node: NodeId, reason: String },

    #[error("Node {node} starts at {start}, before previously received start {previous}")]
    UnsortedInput { node: NodeId, start: i64, previous: i64 },

    #[error("Not found: node {0}")]
    NotFound(NodeId),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

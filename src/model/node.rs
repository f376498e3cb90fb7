//! Path node: a contiguous de Bruijn k-mer chain with positional validity.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::kmer::{Kmer, is_successor};
use super::Interval;
use crate::{Error, Result};

/// Opaque node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction along the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Towards following k-mers (`next` edges).
    Forward,
    /// Towards preceding k-mers (`prev` edges).
    Backward,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Adjacency to another node.
///
/// `range` is the junction range: the start offsets of the *following*
/// node's first k-mer at which the adjacency holds. Both endpoints of an
/// edge store the same range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub node: NodeId,
    pub range: Interval,
}

impl Edge {
    pub fn new(node: NodeId, range: Interval) -> Self {
        Self { node, range }
    }

    /// Edge valid wherever the two nodes' positions line up.
    pub fn unrestricted(node: NodeId) -> Self {
        Self { node, range: Interval::ALL }
    }
}

pub type EdgeList = SmallVec<[Edge; 2]>;

/// A chain of adjacent k-mers sharing one positional validity interval.
///
/// K-mer `i` may start at any offset in `[first_start + i, first_end + i]`.
/// Each weight applies at every one of those offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    pub id: NodeId,
    pub kmers: Vec<Kmer>,
    pub weights: Vec<u32>,
    pub first_start: i64,
    pub first_end: i64,
    pub prev: EdgeList,
    pub next: EdgeList,
}

impl PathNode {
    pub fn new(id: NodeId, kmers: Vec<Kmer>, weights: Vec<u32>, first_start: i64, first_end: i64) -> Self {
        Self {
            id,
            kmers,
            weights,
            first_start,
            first_end,
            prev: SmallVec::new(),
            next: SmallVec::new(),
        }
    }

    pub fn with_prev(mut self, node: NodeId) -> Self {
        self.prev.push(Edge::unrestricted(node));
        self
    }

    pub fn with_next(mut self, node: NodeId) -> Self {
        self.next.push(Edge::unrestricted(node));
        self
    }

    /// Declare a preceding node, valid only where this node's first k-mer
    /// starts inside `range`.
    pub fn with_prev_range(mut self, node: NodeId, range: Interval) -> Self {
        self.prev.push(Edge::new(node, range));
        self
    }

    /// Declare a following node, valid only where the following node's
    /// first k-mer starts inside `range`.
    pub fn with_next_range(mut self, node: NodeId, range: Interval) -> Self {
        self.next.push(Edge::new(node, range));
        self
    }

    /// Number of k-mers.
    pub fn len(&self) -> usize {
        self.kmers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kmers.is_empty()
    }

    pub fn first(&self) -> Interval {
        Interval::new(self.first_start, self.first_end)
    }

    pub fn last_start(&self) -> i64 {
        self.first_start + self.len() as i64 - 1
    }

    pub fn last_end(&self) -> i64 {
        self.first_end + self.len() as i64 - 1
    }

    /// Number of start offsets the node is valid at.
    pub fn width(&self) -> i64 {
        self.first_end - self.first_start + 1
    }

    /// Sum of per-k-mer weights.
    pub fn weight(&self) -> u64 {
        self.weights.iter().map(|&w| w as u64).sum()
    }

    /// Total support mass: every weight counted at every valid offset.
    pub fn mass(&self) -> u64 {
        self.weight() * self.width().max(0) as u64
    }

    pub fn edges(&self, dir: Direction) -> &EdgeList {
        match dir {
            Direction::Forward => &self.next,
            Direction::Backward => &self.prev,
        }
    }

    pub fn edges_mut(&mut self, dir: Direction) -> &mut EdgeList {
        match dir {
            Direction::Forward => &mut self.next,
            Direction::Backward => &mut self.prev,
        }
    }

    /// Check the caller contract: non-empty, one weight per k-mer, a
    /// non-empty interval, and an unbroken k-mer chain.
    pub fn validate(&self, k: usize) -> Result<()> {
        if self.kmers.is_empty() {
            return Err(Error::MalformedNode { node: self.id, reason: "no k-mers".into() });
        }
        if self.weights.len() != self.kmers.len() {
            return Err(Error::MalformedNode {
                node: self.id,
                reason: format!("{} weights for {} k-mers", self.weights.len(), self.kmers.len()),
            });
        }
        if self.first_start > self.first_end {
            return Err(Error::MalformedNode {
                node: self.id,
                reason: format!("empty interval [{}, {}]", self.first_start, self.first_end),
            });
        }
        let kmer_mask = if k == 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
        if let Some(index) = self.kmers.iter().position(|&km| km & !kmer_mask != 0) {
            return Err(Error::MalformedNode {
                node: self.id,
                reason: format!("k-mer {index} wider than k={k}"),
            });
        }
        if let Some(i) = self.kmers.windows(2).position(|w| !is_successor(w[0], w[1], k)) {
            return Err(Error::NonContiguousKmers { node: self.id, index: i + 1 });
        }
        Ok(())
    }
}

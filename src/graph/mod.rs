//! # Path Graph Arena
//!
//! The positional de Bruijn graph while it is being simplified. Nodes live in
//! a map keyed by `NodeId` handles, so identity is the handle and never the
//! node's value. Edges name their neighbour by handle and carry a junction
//! range (see [`Edge`]).
//!
//! A neighbour that has left the arena (already emitted downstream) stays
//! referenced by the edges of live nodes and still counts towards their
//! degree, but can no longer be traversed.
//!
//! Every mutation records the touched handles in a dirty set so the
//! collapse engine can re-key and requeue exactly the nodes that changed.
//! Splits and merges also record which handle each new or absorbing node
//! descends from, so references held outside the arena can follow them.

pub mod degree;
pub mod merge;
pub mod subnode;

use hashbrown::{HashMap, HashSet};

use crate::model::*;
use crate::{Error, Result};

pub use degree::{Degree, DegreeMap};
pub use subnode::PathSubnode;

// ============================================================================
// PathGraph
// ============================================================================

/// Arena of live path nodes.
#[derive(Debug, Default)]
pub struct PathGraph {
    nodes: HashMap<NodeId, PathNode>,
    dirty: HashSet<NodeId>,
    /// `(ancestor, descendant)` pairs, oldest first.
    lineage: Vec<(NodeId, NodeId)>,
    next_id: u64,
}

impl PathGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            dirty: HashSet::new(),
            lineage: Vec::new(),
            next_id: 1,
        }
    }

    fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add an unconnected node, returning its arena handle.
    pub fn insert(&mut self, kmers: Vec<Kmer>, weights: Vec<u32>, first: Interval) -> NodeId {
        let id = self.allocate();
        self.nodes.insert(id, PathNode::new(id, kmers, weights, first.start, first.end));
        self.dirty.insert(id);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&PathNode> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&PathNode> {
        self.nodes.get(&id).ok_or(Error::NotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut PathNode> {
        self.dirty.insert(id);
        self.nodes.get_mut(&id).ok_or(Error::NotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathNode> {
        self.nodes.values()
    }

    /// Take a node out of the arena. Edges of other nodes that reference it
    /// are left in place.
    pub fn remove(&mut self, id: NodeId) -> Option<PathNode> {
        let removed = self.nodes.remove(&id);
        if removed.is_some() {
            self.dirty.insert(id);
        }
        removed
    }

    /// Handles touched since the last call.
    pub fn take_dirty(&mut self) -> Vec<NodeId> {
        let mut dirty: Vec<NodeId> = self.dirty.drain().collect();
        dirty.sort();
        dirty
    }

    /// Record that `descendant` now carries part of `ancestor`'s k-mers.
    pub(crate) fn record_descent(&mut self, ancestor: NodeId, descendant: NodeId) {
        self.lineage.push((ancestor, descendant));
    }

    /// `(ancestor, descendant)` pairs recorded since the last call, in the
    /// order the splits and merges happened.
    pub fn take_lineage(&mut self) -> Vec<(NodeId, NodeId)> {
        std::mem::take(&mut self.lineage)
    }

    /// Total support mass of all live nodes.
    pub fn mass(&self) -> u64 {
        self.nodes.values().map(PathNode::mass).sum()
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Offsets at which `next`'s first k-mer can directly follow `prev`'s
    /// last k-mer.
    pub fn junction(&self, prev: NodeId, next: NodeId) -> Result<Option<Interval>> {
        let p = self.node(prev)?;
        let n = self.node(next)?;
        let after_prev = Interval::new(p.last_start() + 1, p.last_end() + 1);
        Ok(after_prev.intersect(&n.first()))
    }

    /// Connect two live nodes where their positions line up and `declared`
    /// allows. Returns false if the resulting range is empty.
    pub fn connect(&mut self, prev: NodeId, next: NodeId, declared: Interval) -> Result<bool> {
        let Some(range) = self.junction(prev, next)?.and_then(|r| r.intersect(&declared)) else {
            return Ok(false);
        };
        self.link(prev, next, range);
        Ok(true)
    }

    /// Record an edge on whichever endpoints are live.
    pub(crate) fn link(&mut self, prev: NodeId, next: NodeId, range: Interval) {
        if let Ok(p) = self.node_mut(prev) {
            add_edge(&mut p.next, Edge::new(next, range));
        }
        if let Ok(n) = self.node_mut(next) {
            add_edge(&mut n.prev, Edge::new(prev, range));
        }
    }

    /// Drop `node`'s mirror edges pointing back at `target`.
    pub(crate) fn unlink_mirror(&mut self, node: NodeId, dir: Direction, target: NodeId) {
        if let Ok(n) = self.node_mut(node) {
            n.edges_mut(dir).retain(|e| e.node != target);
        }
    }

    /// Live handles adjacent to `id` in either direction.
    pub fn neighbours(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&id) else { return Vec::new() };
        let mut out: Vec<NodeId> = node
            .prev
            .iter()
            .chain(node.next.iter())
            .map(|e| e.node)
            .filter(|n| *n != id && self.nodes.contains_key(n))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// Insert an edge, folding it into an existing edge to the same node when
/// the ranges touch.
pub(crate) fn add_edge(list: &mut EdgeList, edge: Edge) {
    if let Some(existing) = list
        .iter_mut()
        .find(|e| e.node == edge.node && e.range.touches(&edge.range))
    {
        existing.range = existing.range.span(&edge.range);
        return;
    }
    list.push(edge);
}

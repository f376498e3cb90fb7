//! Traversal state: an immutable, backward-linked record of a search path.
//!
//! Each state knows the subnode it ends on, its parent, the path length in
//! k-mers and the accumulated weight. Extending a path allocates a new state
//! and leaves the parent untouched, so sibling branches of a backtracking
//! search share their common prefix.

use std::rc::Rc;

use crate::graph::{PathGraph, PathSubnode};
use crate::model::{Direction, Interval, Kmer};
use crate::Result;

#[derive(Debug)]
pub struct TraversalState {
    parent: Option<Rc<TraversalState>>,
    subnode: PathSubnode,
    path_length: usize,
    score: u64,
}

impl TraversalState {
    /// Single-subnode path.
    pub fn root(graph: &PathGraph, subnode: PathSubnode) -> Result<Rc<Self>> {
        let score = graph.node(subnode.node())?.weight();
        Ok(Rc::new(Self { parent: None, subnode, path_length: subnode.length(), score }))
    }

    /// Extend `parent` by one adjacent subnode.
    pub fn extend(parent: &Rc<Self>, graph: &PathGraph, subnode: PathSubnode) -> Result<Rc<Self>> {
        let score = parent.score + graph.node(subnode.node())?.weight();
        Ok(Rc::new(Self {
            parent: Some(Rc::clone(parent)),
            subnode,
            path_length: parent.path_length + subnode.length(),
            score,
        }))
    }

    /// Same path with the final subnode narrowed to `first`.
    pub fn restricted(&self, first: Interval) -> Rc<Self> {
        Rc::new(Self {
            parent: self.parent.clone(),
            subnode: self.subnode.with_range(first),
            path_length: self.path_length,
            score: self.score,
        })
    }

    pub fn subnode(&self) -> PathSubnode {
        self.subnode
    }

    pub fn path_length(&self) -> usize {
        self.path_length
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    /// Subnodes from the search root outward, with every earlier subnode
    /// narrowed to the offsets consistent with the final one.
    pub fn path(&self, dir: Direction) -> Vec<PathSubnode> {
        let mut out = vec![self.subnode];
        let mut current = self.subnode;
        let mut state = self.parent.as_deref();
        while let Some(s) = state {
            let shift = match dir {
                Direction::Forward => -(s.subnode.length() as i64),
                Direction::Backward => current.length() as i64,
            };
            current = s.subnode.with_range(current.first().shift(shift));
            out.push(current);
            state = s.parent.as_deref();
        }
        out.reverse();
        out
    }

    /// Subnodes in reference order.
    pub fn reference_path(&self, dir: Direction) -> Vec<PathSubnode> {
        let mut path = self.path(dir);
        if dir == Direction::Backward {
            path.reverse();
        }
        path
    }

    /// K-mers from the search root outward.
    pub fn kmers(&self, graph: &PathGraph, dir: Direction) -> Result<Vec<Kmer>> {
        let mut out = Vec::with_capacity(self.path_length);
        for sn in self.path(dir) {
            out.extend(search_order_kmers(graph, sn, dir)?);
        }
        Ok(out)
    }

    /// Offsets of the k-mer just before the path (forward) or just after it
    /// (backward): the anchor the path hangs off.
    pub fn anchor(&self, dir: Direction) -> Interval {
        match dir {
            Direction::Forward => Interval::new(self.subnode.last_start(), self.subnode.last_end())
                .shift(-(self.path_length as i64)),
            Direction::Backward => self.subnode.first().shift(self.path_length as i64),
        }
    }

    /// Narrow the final subnode so that the path hangs off exactly `anchor`.
    pub fn restricted_to_anchor(&self, anchor: Interval, dir: Direction) -> Rc<Self> {
        let first = match dir {
            Direction::Forward => anchor.shift(self.path_length as i64 - self.subnode.length() as i64 + 1),
            Direction::Backward => anchor.shift(-(self.path_length as i64)),
        };
        self.restricted(first)
    }
}

/// A subnode's k-mers in search order.
pub fn search_order_kmers(graph: &PathGraph, subnode: PathSubnode, dir: Direction) -> Result<Vec<Kmer>> {
    let node = graph.node(subnode.node())?;
    Ok(match dir {
        Direction::Forward => node.kmers.clone(),
        Direction::Backward => node.kmers.iter().rev().copied().collect(),
    })
}

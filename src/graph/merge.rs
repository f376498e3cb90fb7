//! Split and merge primitives.
//!
//! A merge absorbs a `source` path into a `target` path of the same length
//! over the same anchor interval. Both paths are first cut so that every
//! source node lines up with exactly one target node (same k-mer count,
//! same start range), then each source node is folded into its partner:
//! weights are added (both paths are alternative support for the same
//! locus), edges are repointed, and the source node is deleted.
//!
//! Splitting never changes total mass: a positional split keeps every
//! weight at every offset, and a length split partitions the k-mers.

use std::collections::VecDeque;

use hashbrown::HashSet;

use super::{PathGraph, PathSubnode};
use crate::model::*;
use crate::{Error, Result};

impl PathGraph {
    /// Cut `id` so that it covers exactly `keep`. The handle `id` stays
    /// with the `keep` piece; flanking pieces become new nodes.
    ///
    /// Returns the handles of the new flank nodes.
    pub fn split_positional(&mut self, id: NodeId, keep: Interval) -> Result<Vec<NodeId>> {
        let old = self.node(id)?.clone();
        if !old.first().encloses(&keep) {
            return Err(Error::Merge(format!(
                "cannot cut node {id} {} to {keep}",
                old.first()
            )));
        }
        if old.first() == keep {
            return Ok(Vec::new());
        }

        let len = old.len() as i64;
        let mut pieces = vec![(id, keep)];
        let mut flanks = Vec::new();
        for range in [
            Interval::new(old.first_start, keep.start - 1),
            Interval::new(keep.end + 1, old.first_end),
        ] {
            if range.start <= range.end {
                let flank = self.insert(old.kmers.clone(), old.weights.clone(), range);
                self.record_descent(id, flank);
                pieces.push((flank, range));
                flanks.push(flank);
            }
        }

        for e in &old.prev {
            if e.node != id {
                self.unlink_mirror(e.node, Direction::Forward, id);
            }
        }
        for e in &old.next {
            if e.node != id {
                self.unlink_mirror(e.node, Direction::Backward, id);
            }
        }
        {
            let n = self.node_mut(id)?;
            n.first_start = keep.start;
            n.first_end = keep.end;
            n.prev.clear();
            n.next.clear();
        }

        // Self-loops appear in both lists; relink them from `prev` only.
        for e in &old.prev {
            for &(piece, range) in &pieces {
                let Some(r) = e.range.intersect(&range) else { continue };
                if e.node == id {
                    for &(from, from_range) in &pieces {
                        if let Some(r) = r.intersect(&from_range.shift(len)) {
                            self.link(from, piece, r);
                        }
                    }
                } else {
                    self.link(e.node, piece, r);
                }
            }
        }
        for e in old.next.iter().filter(|e| e.node != id) {
            for &(piece, range) in &pieces {
                if let Some(r) = e.range.intersect(&range.shift(len)) {
                    self.link(piece, e.node, r);
                }
            }
        }
        Ok(flanks)
    }

    /// Cut `id` after its first `at` k-mers. The handle `id` keeps the head;
    /// the tail becomes a new node directly following it.
    pub fn split_length(&mut self, id: NodeId, at: usize) -> Result<NodeId> {
        let old = self.node(id)?.clone();
        if at == 0 || at >= old.len() {
            return Err(Error::Merge(format!(
                "cannot cut node {id} of length {} at {at}",
                old.len()
            )));
        }
        let tail_first = old.first().shift(at as i64);
        let tail = self.insert(old.kmers[at..].to_vec(), old.weights[at..].to_vec(), tail_first);
        self.record_descent(id, tail);

        for e in old.next.iter().filter(|e| e.node != id) {
            self.unlink_mirror(e.node, Direction::Backward, id);
        }
        {
            let head = self.node_mut(id)?;
            head.kmers.truncate(at);
            head.weights.truncate(at);
            head.next.clear();
            head.prev.retain(|e| e.node != id);
        }
        self.link(id, tail, tail_first);
        for e in &old.next {
            // a self-loop now runs from the tail back to the head
            self.link(tail, e.node, e.range);
        }
        Ok(tail)
    }

    /// Fold `source` into `target`. Both must have the same length and start
    /// range.
    fn absorb(&mut self, source: NodeId, target: NodeId) -> Result<()> {
        let s = self.node(source)?.clone();
        {
            let t = self.node(target)?;
            if t.len() != s.len() || t.first() != s.first() {
                return Err(Error::Merge(format!(
                    "node {source} {} x{} does not line up with node {target} {} x{}",
                    s.first(),
                    s.len(),
                    t.first(),
                    t.len()
                )));
            }
        }
        let weights = self
            .node(target)?
            .weights
            .iter()
            .zip(&s.weights)
            .map(|(w, add)| w.checked_add(*add))
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| Error::Merge(format!("weight overflow folding node {source} into node {target}")))?;
        self.remove(source);
        self.node_mut(target)?.weights = weights;
        self.record_descent(source, target);
        for e in &s.prev {
            let from = if e.node == source { target } else { e.node };
            self.unlink_mirror(from, Direction::Forward, source);
            self.link(from, target, e.range);
        }
        for e in s.next.iter().filter(|e| e.node != source) {
            self.unlink_mirror(e.node, Direction::Backward, source);
            self.link(target, e.node, e.range);
        }
        // link() cannot reach the removed source, but a target that was
        // adjacent to it still lists it.
        if let Ok(t) = self.node_mut(target) {
            t.prev.retain(|e| e.node != source);
            t.next.retain(|e| e.node != source);
        }
        Ok(())
    }

    /// Absorb the `source` path into the `target` path.
    ///
    /// Both paths are in reference order. The first `skip_source` k-mers of
    /// the source and `skip_target` k-mers of the target are left alone; the
    /// remaining source k-mers are merged one-to-one onto the target k-mers
    /// that follow the target skip. A node present in both paths at the same
    /// range is left in place.
    ///
    /// Returns the surviving target handles.
    pub fn merge(
        &mut self,
        source: &[PathSubnode],
        target: &[PathSubnode],
        skip_source: usize,
        skip_target: usize,
    ) -> Result<Vec<NodeId>> {
        let source_len: usize = source.iter().map(PathSubnode::length).sum();
        let target_len: usize = target.iter().map(PathSubnode::length).sum();
        let (Some(s0), Some(t0)) = (source.first(), target.first()) else {
            return Err(Error::Merge("empty merge path".into()));
        };
        if source_len <= skip_source || target_len < skip_target + (source_len - skip_source) {
            return Err(Error::Merge(format!(
                "source of {source_len} k-mers (skip {skip_source}) does not fit target of {target_len} (skip {skip_target})"
            )));
        }
        if s0.first().shift(skip_source as i64) != t0.first().shift(skip_target as i64) {
            return Err(Error::Merge(format!(
                "source starts at {} but target at {}",
                s0.first().shift(skip_source as i64),
                t0.first().shift(skip_target as i64)
            )));
        }
        let source_nodes: HashSet<NodeId> = source.iter().map(PathSubnode::node).collect();
        for t in target {
            if source_nodes.contains(&t.node()) && !source.contains(t) {
                return Err(Error::Merge(format!("node {} is on both paths at different offsets", t.node())));
            }
        }

        for sn in source.iter().chain(target) {
            self.split_positional(sn.node(), sn.first())?;
        }

        let mut src = self.skip_kmers(source, skip_source)?;
        let mut tgt = self.skip_kmers(target, skip_target)?;
        let mut survivors = Vec::new();
        while let Some(&s) = src.front() {
            let Some(&t) = tgt.front() else {
                return Err(Error::Merge("target path exhausted before source".into()));
            };
            let (ls, lt) = (self.node(s)?.len(), self.node(t)?.len());
            if ls > lt {
                let tail = self.split_length(s, lt)?;
                src.insert(1, tail);
            } else if lt > ls {
                let tail = self.split_length(t, ls)?;
                tgt.insert(1, tail);
            }
            src.pop_front();
            tgt.pop_front();
            if s != t {
                self.absorb(s, t)?;
            }
            survivors.push(t);
        }
        Ok(survivors)
    }

    /// Handles of `path` with the first `skip` k-mers cut away.
    fn skip_kmers(&mut self, path: &[PathSubnode], mut skip: usize) -> Result<VecDeque<NodeId>> {
        let mut out = VecDeque::with_capacity(path.len());
        for sn in path {
            let len = self.node(sn.node())?.len();
            if skip >= len {
                skip -= len;
            } else if skip > 0 {
                out.push_back(self.split_length(sn.node(), skip)?);
                skip = 0;
            } else {
                out.push_back(sn.node());
            }
        }
        Ok(out)
    }
}

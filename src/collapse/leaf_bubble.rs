//! Leaf and bubble collapse.
//!
//! A *leaf* is a short dead-end branch hanging off a branch point (the
//! root). A *bubble* is a branch that leaves a branch node and rejoins the
//! main path. Both are found the same way: starting at a node with a single
//! edge back to a root that itself branches, walk away from the root over
//! unbranched topology until the walk either dead-ends (leaf) or reaches a
//! node with several edges back towards the root (bubble closing). The walked
//! path is then matched, base by base, against every alternative path
//! leaving the same root, and merged into the first alternative that
//!
//! - has mismatches within the budget,
//! - is at least as long (bubbles: exactly as long, ending on the closing node),
//! - carries strictly more weight (bubbles: at least as much, ties going to
//!   the lexicographically smaller k-mer sequence).
//!
//! Every search runs in both directions. Searches backtrack over all
//! alternatives using explicit stacks, and a node may appear only once on
//! the paths under consideration.

use std::rc::Rc;

use hashbrown::HashSet;
use tracing::debug;

use super::traversal::{TraversalState, search_order_kmers};
use super::{CollapseConfig, CollapseStrategy, Merge, MergeKind};
use crate::graph::{Degree, PathGraph, PathSubnode};
use crate::model::{Direction, Kmer, NodeId, bases_different};
use crate::{Error, Result};

/// The leaf/bubble search-and-merge policy.
#[derive(Debug, Clone)]
pub struct LeafBubbleCollapse {
    k: usize,
    max_bases_mismatch: usize,
}

impl LeafBubbleCollapse {
    pub fn new(config: &CollapseConfig) -> Self {
        Self {
            k: config.kmer_length(),
            max_bases_mismatch: config.mismatch_budget(),
        }
    }
}

impl CollapseStrategy for LeafBubbleCollapse {
    fn collapse(&mut self, graph: &mut PathGraph, node: NodeId, max_collapse_length: usize) -> Result<Option<Merge>> {
        for dir in [Direction::Forward, Direction::Backward] {
            if let Some(merge) = self.process(graph, node, dir, max_collapse_length)? {
                return Ok(Some(merge));
            }
        }
        Ok(None)
    }
}

/// One move available from a leaf-walk frame.
enum LeafStep {
    /// The walk dead-ends here.
    Terminal(Rc<TraversalState>),
    /// Continue the walk into an unbranched node.
    Extend(Rc<TraversalState>),
    /// The walk reached a node where another branch rejoins.
    CloseBubble(Rc<TraversalState>),
}

struct LeafFrame {
    steps: std::vec::IntoIter<LeafStep>,
    entered: Option<NodeId>,
}

struct BranchFrame {
    state: Rc<TraversalState>,
    mismatches: usize,
    candidates: smallvec::IntoIter<[PathSubnode; 4]>,
    entered: NodeId,
}

/// What the branch search should do with a candidate path.
enum Verdict {
    Reject,
    Expand,
    Accept,
}

/// The path being collapsed.
struct Reference<'a> {
    state: &'a TraversalState,
    kmers: &'a [Kmer],
    terminal: Option<NodeId>,
}

impl LeafBubbleCollapse {
    /// Try every leaf that extends from `node` in `dir`.
    fn process(&self, graph: &mut PathGraph, node: NodeId, dir: Direction, max_len: usize) -> Result<Option<Merge>> {
        let whole = PathSubnode::new(graph, node)?;
        // the root lies on the opposite side to the direction the leaf extends
        let (prev, next) = match dir {
            Direction::Forward => (Degree::Single, Degree::NotMultiple),
            Direction::Backward => (Degree::NotMultiple, Degree::Single),
        };
        for start in whole.subnodes_of_degree(graph, prev, next) {
            let Some(root) = start.neighbours(graph, dir.opposite()).into_iter().next() else { continue };
            if root.node() == node {
                continue;
            }
            for r in root.ranges_of_degree(graph, dir, Degree::Multiple) {
                let shifted = match dir {
                    Direction::Forward => r.shift(root.length() as i64),
                    Direction::Backward => r.shift(-(start.length() as i64)),
                };
                let Some(range) = shifted.intersect(&start.first()) else { continue };
                let leaf_start = start.with_range(range);
                if leaf_start.length() > max_len {
                    continue;
                }
                let mut visited = HashSet::new();
                visited.insert(leaf_start.node());
                visited.insert(root.node());
                let initial = TraversalState::root(graph, leaf_start)?;
                if let Some(merge) = self.walk_leaf(graph, &mut visited, initial, dir, max_len)? {
                    return Ok(Some(merge));
                }
            }
        }
        Ok(None)
    }

    fn leaf_steps(
        &self,
        graph: &PathGraph,
        visited: &HashSet<NodeId>,
        tn: &Rc<TraversalState>,
        dir: Direction,
        max_len: usize,
    ) -> Result<Vec<LeafStep>> {
        let sub = tn.subnode();
        let mut steps = Vec::new();
        for r in sub.ranges_of_degree(graph, dir, Degree::None) {
            steps.push(LeafStep::Terminal(tn.restricted(r)));
        }
        for r in sub.ranges_of_degree(graph, dir, Degree::Single) {
            let Some(adj) = sub.with_range(r).neighbours(graph, dir).into_iter().next() else { continue };
            if tn.path_length() + adj.length() > max_len || visited.contains(&adj.node()) {
                continue;
            }
            for ar in adj.ranges_of_degree(graph, dir.opposite(), Degree::Single) {
                steps.push(LeafStep::Extend(TraversalState::extend(tn, graph, adj.with_range(ar))?));
            }
            for ar in adj.ranges_of_degree(graph, dir.opposite(), Degree::Multiple) {
                steps.push(LeafStep::CloseBubble(TraversalState::extend(tn, graph, adj.with_range(ar))?));
            }
        }
        Ok(steps)
    }

    /// Walk away from the root over unbranched topology, trying a collapse
    /// at every dead end and bubble closing.
    fn walk_leaf(
        &self,
        graph: &mut PathGraph,
        visited: &mut HashSet<NodeId>,
        start: Rc<TraversalState>,
        dir: Direction,
        max_len: usize,
    ) -> Result<Option<Merge>> {
        let steps = self.leaf_steps(graph, visited, &start, dir, max_len)?;
        let mut stack = vec![LeafFrame { steps: steps.into_iter(), entered: None }];
        loop {
            let step = match stack.last_mut() {
                Some(frame) => frame.steps.next(),
                None => return Ok(None),
            };
            match step {
                None => {
                    if let Some(node) = stack.pop().and_then(|f| f.entered) {
                        visited.remove(&node);
                    }
                }
                Some(LeafStep::Terminal(state)) => {
                    if let Some(merge) = self.try_collapse(graph, visited, &state, dir, None)? {
                        return Ok(Some(merge));
                    }
                }
                Some(LeafStep::Extend(state)) => {
                    let node = state.subnode().node();
                    visited.insert(node);
                    let steps = self.leaf_steps(graph, visited, &state, dir, max_len)?;
                    stack.push(LeafFrame { steps: steps.into_iter(), entered: Some(node) });
                }
                Some(LeafStep::CloseBubble(state)) => {
                    let terminal = state.subnode().node();
                    // the alternative branch has to be able to finish on the closing node
                    let was_visited = visited.remove(&terminal);
                    let merged = self.try_collapse(graph, visited, &state, dir, Some(terminal))?;
                    if was_visited {
                        visited.insert(terminal);
                    }
                    if merged.is_some() {
                        return Ok(merged);
                    }
                }
            }
        }
    }

    /// Match `to_collapse` against every other path leaving its anchor.
    fn try_collapse(
        &self,
        graph: &mut PathGraph,
        visited: &mut HashSet<NodeId>,
        to_collapse: &Rc<TraversalState>,
        dir: Direction,
        terminal: Option<NodeId>,
    ) -> Result<Option<Merge>> {
        let path = to_collapse.path(dir);
        let Some(first) = path.first() else { return Ok(None) };
        let Some(anchor) = first.neighbours(graph, dir.opposite()).into_iter().next() else {
            return Ok(None);
        };
        let ref_kmers = to_collapse.kmers(graph, dir)?;
        let reference = Reference { state: to_collapse, kmers: &ref_kmers, terminal };

        for sn in anchor.neighbours(graph, dir) {
            if visited.contains(&sn.node()) {
                continue;
            }
            let kmers = search_order_kmers(graph, sn, dir)?;
            let mismatches = bases_different(self.k, &ref_kmers, &kmers, 0, dir);
            visited.insert(sn.node());
            let found = self.search_branch(graph, visited, &reference, TraversalState::root(graph, sn)?, mismatches, dir)?;
            visited.remove(&sn.node());
            if let Some(target) = found {
                return self.commit(graph, &reference, &target, dir).map(Some);
            }
        }
        Ok(None)
    }

    /// Depth-first search for a path from `start` that `reference` can be
    /// merged into.
    fn search_branch(
        &self,
        graph: &PathGraph,
        visited: &mut HashSet<NodeId>,
        reference: &Reference<'_>,
        start: Rc<TraversalState>,
        mismatches: usize,
        dir: Direction,
    ) -> Result<Option<Rc<TraversalState>>> {
        match self.judge(graph, reference, &start, mismatches, dir)? {
            Verdict::Accept => return Ok(Some(start)),
            Verdict::Reject => return Ok(None),
            Verdict::Expand => {}
        }
        let candidates = start.subnode().neighbours(graph, dir).into_iter();
        // `entered` of the bottom frame is owned by the caller
        let mut stack = vec![BranchFrame { entered: start.subnode().node(), state: start, mismatches, candidates }];
        let mut found = None;
        while let Some(frame) = stack.last_mut() {
            let Some(sn) = frame.candidates.next() else {
                if let Some(done) = stack.pop() {
                    if !stack.is_empty() {
                        visited.remove(&done.entered);
                    }
                }
                continue;
            };
            if visited.contains(&sn.node()) {
                continue;
            }
            let child = TraversalState::extend(&frame.state, graph, sn)?;
            let offset = child.path_length() - sn.length();
            let kmers = search_order_kmers(graph, sn, dir)?;
            let child_mismatches = frame.mismatches + bases_different(self.k, reference.kmers, &kmers, offset, dir);
            match self.judge(graph, reference, &child, child_mismatches, dir)? {
                Verdict::Accept => {
                    found = Some(child);
                    break;
                }
                Verdict::Reject => {}
                Verdict::Expand => {
                    visited.insert(sn.node());
                    let candidates = sn.neighbours(graph, dir).into_iter();
                    stack.push(BranchFrame { state: child, mismatches: child_mismatches, candidates, entered: sn.node() });
                }
            }
        }
        // leave the visited set as the caller handed it over
        for frame in stack.iter().skip(1) {
            visited.remove(&frame.entered);
        }
        Ok(found)
    }

    fn judge(
        &self,
        graph: &PathGraph,
        reference: &Reference<'_>,
        candidate: &TraversalState,
        mismatches: usize,
        dir: Direction,
    ) -> Result<Verdict> {
        if mismatches > self.max_bases_mismatch {
            return Ok(Verdict::Reject);
        }
        let ref_state = reference.state;
        if candidate.path_length() < ref_state.path_length() {
            return Ok(Verdict::Expand);
        }
        match reference.terminal {
            None => {
                // a leaf is only removed in favour of strictly better support
                if candidate.score() <= ref_state.score() {
                    return Ok(Verdict::Reject);
                }
            }
            Some(terminal) => {
                if candidate.subnode().node() != terminal || candidate.path_length() != ref_state.path_length() {
                    return Ok(Verdict::Reject);
                }
                if candidate.score() < ref_state.score() {
                    return Ok(Verdict::Reject);
                }
                if candidate.score() == ref_state.score() && candidate.kmers(graph, dir)?.as_slice() >= reference.kmers {
                    return Ok(Verdict::Reject);
                }
            }
        }
        if candidate.anchor(dir).intersect(&ref_state.anchor(dir)).is_none() {
            return Ok(Verdict::Reject);
        }
        Ok(Verdict::Accept)
    }

    fn commit(
        &self,
        graph: &mut PathGraph,
        reference: &Reference<'_>,
        target: &Rc<TraversalState>,
        dir: Direction,
    ) -> Result<Merge> {
        let ref_state = reference.state;
        let anchor = target
            .anchor(dir)
            .intersect(&ref_state.anchor(dir))
            .ok_or_else(|| Error::Merge("paths no longer share an anchor".into()))?;
        let source = ref_state.restricted_to_anchor(anchor, dir);
        let target = target.restricted_to_anchor(anchor, dir);
        // backward paths line up at their far end; the excess sits at the start
        let (skip_source, skip_target) = match dir {
            Direction::Forward => (0, 0),
            Direction::Backward => (0, target.path_length() - source.path_length()),
        };
        let source_path = source.reference_path(dir);
        let target_path = target.reference_path(dir);
        let kind = if reference.terminal.is_some() { MergeKind::Bubble } else { MergeKind::Leaf };
        debug!(
            ?kind,
            ?dir,
            source = %source_path[0].node(),
            target = %target_path[0].node(),
            length = source.path_length(),
            %anchor,
            "collapsing path"
        );
        let survivors = graph.merge(&source_path, &target_path, skip_source, skip_target)?;
        Ok(Merge { kind, survivors })
    }
}

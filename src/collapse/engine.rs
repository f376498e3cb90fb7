//! Streaming collapse engine.
//!
//! Pulls path nodes from upstream in start-offset order, keeps a window of
//! them in a [`PathGraph`], runs the collapse strategy on each node once
//! enough input lies beyond it, and emits nodes once nothing still to be
//! processed can reach them.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;
use smallvec::{SmallVec, smallvec};
use tracing::{debug, trace, warn};

use super::{CollapseConfig, CollapseStats, CollapseStrategy, LeafBubbleCollapse, MergeKind};
use crate::graph::PathGraph;
use crate::model::{Direction, Interval, NodeId, PathNode};
use crate::{Error, Result};

/// Queue position: start offset, then arrival order.
type Key = (i64, u64, NodeId);

/// Edge declared towards an input id that has not arrived yet.
#[derive(Debug, Clone, Copy)]
struct PendingEdge {
    /// Input id of the declaring node.
    source: NodeId,
    /// Live handle the edge starts from.
    from: NodeId,
    dir: Direction,
    range: Interval,
}

/// Pull-driven collapse over a sorted stream of path nodes.
///
/// Input ids are only used to resolve declared edges. Emitted nodes carry
/// engine handles, and their edges refer to the handles of other emitted
/// nodes.
pub struct CollapseEngine<I, S = LeafBubbleCollapse> {
    input: I,
    config: CollapseConfig,
    strategy: S,
    graph: PathGraph,
    /// Input id -> every live handle descended from that input node.
    ids: HashMap<NodeId, SmallVec<[NodeId; 2]>>,
    /// Handle -> input ids it descends from.
    origin: HashMap<NodeId, SmallVec<[NodeId; 1]>>,
    pending: HashMap<NodeId, Vec<PendingEdge>>,
    keys: HashMap<NodeId, Key>,
    order: BTreeSet<Key>,
    unprocessed: BTreeSet<Key>,
    input_position: Option<i64>,
    next_seq: u64,
    input_done: bool,
    failed: bool,
    finished: bool,
    stats: CollapseStats,
}

impl<I> CollapseEngine<I, LeafBubbleCollapse>
where
    I: Iterator<Item = Result<PathNode>>,
{
    /// Engine running leaf and bubble collapse.
    pub fn new(input: I, config: CollapseConfig) -> Result<Self> {
        let strategy = LeafBubbleCollapse::new(&config);
        Self::with_strategy(input, config, strategy)
    }
}

impl<I, S> CollapseEngine<I, S>
where
    I: Iterator<Item = Result<PathNode>>,
    S: CollapseStrategy,
{
    pub fn with_strategy(input: I, config: CollapseConfig, strategy: S) -> Result<Self> {
        config.validate()?;
        debug!(
            k = config.k,
            max_path_collapse_length = config.max_path_collapse_length,
            max_bases_mismatch = config.max_bases_mismatch,
            "collapse engine created"
        );
        Ok(Self {
            input,
            config,
            strategy,
            graph: PathGraph::new(),
            ids: HashMap::new(),
            origin: HashMap::new(),
            pending: HashMap::new(),
            keys: HashMap::new(),
            order: BTreeSet::new(),
            unprocessed: BTreeSet::new(),
            input_position: None,
            next_seq: 0,
            input_done: false,
            failed: false,
            finished: false,
            stats: CollapseStats::default(),
        })
    }

    pub fn stats(&self) -> CollapseStats {
        self.stats
    }

    pub fn config(&self) -> &CollapseConfig {
        &self.config
    }

    /// Nodes currently buffered.
    pub fn graph(&self) -> &PathGraph {
        &self.graph
    }

    // ========================================================================
    // Ingest
    // ========================================================================

    fn ingest(&mut self, node: PathNode) -> Result<()> {
        node.validate(self.config.kmer_length())?;
        if let Some(previous) = self.input_position {
            if node.first_start < previous {
                return Err(Error::UnsortedInput { node: node.id, start: node.first_start, previous });
            }
        }
        if self.ids.contains_key(&node.id) {
            return Err(Error::MalformedNode { node: node.id, reason: "duplicate node id".into() });
        }

        let PathNode { id: external, kmers, weights, first_start, first_end, prev, next } = node;
        let id = self.graph.insert(kmers, weights, Interval::new(first_start, first_end));
        self.ids.insert(external, smallvec![id]);
        self.origin.insert(id, smallvec![external]);
        self.input_position = Some(first_start);
        trace!(node = %external, handle = %id, first_start, first_end, "ingested");

        // (prev, next) -> intersection of every declared range
        let mut declared: BTreeMap<(NodeId, NodeId), Option<Interval>> = BTreeMap::new();
        let mut declare = |key: (NodeId, NodeId), range: Interval| {
            declared
                .entry(key)
                .and_modify(|r| *r = r.and_then(|r| r.intersect(&range)))
                .or_insert(Some(range));
        };
        for edge in self.pending.remove(&external).unwrap_or_default() {
            if !self.graph.contains(edge.from) {
                continue;
            }
            match edge.dir {
                Direction::Forward => declare((edge.from, id), edge.range),
                Direction::Backward => declare((id, edge.from), edge.range),
            }
        }
        for (dir, edges) in [(Direction::Backward, prev), (Direction::Forward, next)] {
            for edge in edges {
                let Some(handles) = self.ids.get(&edge.node) else {
                    self.pending.entry(edge.node).or_default().push(PendingEdge {
                        source: external,
                        from: id,
                        dir,
                        range: edge.range,
                    });
                    continue;
                };
                // the neighbour may have been split; only pieces that line up connect
                for &other in handles.iter().filter(|&&h| self.graph.contains(h)) {
                    match dir {
                        Direction::Forward => declare((id, other), edge.range),
                        Direction::Backward => declare((other, id), edge.range),
                    }
                }
            }
        }
        for ((p, n), range) in declared {
            let Some(range) = range else { continue };
            if self.graph.contains(p) && self.graph.contains(n) && !self.graph.connect(p, n, range)? {
                trace!(prev = %p, next = %n, "declared edge has no positional overlap");
            }
        }
        self.sync_dirty(false);
        Ok(())
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    /// Re-key every node the graph reports as touched. With `requeue`, the
    /// touched nodes and their live neighbours are queued for processing.
    fn sync_dirty(&mut self, requeue: bool) {
        self.follow_lineage();
        let mut touched = Vec::new();
        for id in self.graph.take_dirty() {
            let old = self.keys.remove(&id);
            let mut was_unprocessed = false;
            if let Some(key) = old {
                was_unprocessed = self.unprocessed.remove(&key);
                self.order.remove(&key);
            }
            let Some(start) = self.graph.get(id).map(|n| n.first_start) else {
                self.retire(id, false);
                continue;
            };
            let seq = match old {
                Some((_, seq, _)) => seq,
                None => {
                    self.next_seq += 1;
                    self.next_seq
                }
            };
            let key = (start, seq, id);
            self.keys.insert(id, key);
            self.order.insert(key);
            if old.is_none() || was_unprocessed || requeue {
                self.unprocessed.insert(key);
            }
            if requeue {
                touched.push(id);
            }
        }
        for id in touched {
            for neighbour in self.graph.neighbours(id) {
                if let Some(&key) = self.keys.get(&neighbour) {
                    self.unprocessed.insert(key);
                }
            }
        }
    }

    /// Hand input ids and pending edges on to the handles that split off
    /// from, or absorbed, the nodes they referred to.
    fn follow_lineage(&mut self) {
        for (ancestor, descendant) in self.graph.take_lineage() {
            let externals = self.origin.get(&ancestor).cloned().unwrap_or_default();
            for external in externals {
                let handles = self.ids.entry(external).or_default();
                if !handles.contains(&descendant) {
                    handles.push(descendant);
                }
                let aliases = self.origin.entry(descendant).or_default();
                if !aliases.contains(&external) {
                    aliases.push(external);
                }
            }
            for edges in self.pending.values_mut() {
                let inherited: Vec<PendingEdge> = edges
                    .iter()
                    .filter(|e| e.from == ancestor)
                    .map(|e| PendingEdge { from: descendant, ..*e })
                    .collect();
                edges.extend(inherited);
            }
        }
    }

    /// Forget a handle that left the graph.
    fn retire(&mut self, id: NodeId, emitted: bool) {
        if let Some(key) = self.keys.remove(&id) {
            self.order.remove(&key);
            self.unprocessed.remove(&key);
        }
        for external in self.origin.remove(&id).unwrap_or_default() {
            if let Some(handles) = self.ids.get_mut(&external) {
                handles.retain(|h| *h != id);
                if handles.is_empty() {
                    self.ids.remove(&external);
                }
            }
        }
        self.pending.retain(|target, edges| {
            let (dropped, kept): (Vec<PendingEdge>, Vec<PendingEdge>) =
                edges.iter().copied().partition(|e| e.from == id);
            if emitted {
                // a live piece of the same declaring node can still resolve it
                for e in dropped.iter().filter(|e| !kept.iter().any(|k| k.source == e.source)) {
                    warn!(node = %id, neighbour = %target, "dropping unresolved edge of emitted node");
                }
            }
            *edges = kept;
            !edges.is_empty()
        });
    }

    // ========================================================================
    // Processing
    // ========================================================================

    /// Whether enough input lies beyond `id` for any collapse from it to
    /// see every node it could reach.
    fn is_ready(&self, id: NodeId) -> Result<bool> {
        if self.input_done {
            return Ok(true);
        }
        let last_end = self.graph.node(id)?.last_end();
        Ok(self
            .input_position
            .is_some_and(|position| last_end + self.config.lookahead() + 1 < position))
    }

    fn next_ready(&self) -> Result<Option<NodeId>> {
        let Some(&(_, _, id)) = self.unprocessed.first() else { return Ok(None) };
        Ok(self.is_ready(id)?.then_some(id))
    }

    fn process(&mut self, id: NodeId) -> Result<()> {
        if let Some(key) = self.keys.get(&id) {
            self.unprocessed.remove(key);
        }
        self.stats.nodes_processed += 1;
        trace!(node = %id, "processing");

        let max_len = self.config.max_collapse_length();
        let Some(merge) = self.strategy.collapse(&mut self.graph, id, max_len)? else {
            self.sync_dirty(false);
            return Ok(());
        };
        match merge.kind {
            MergeKind::Leaf => self.stats.leaves_collapsed += 1,
            MergeKind::Bubble => self.stats.branches_collapsed += 1,
        }
        let requeue = self.strategy.reprocess_merged_nodes();
        self.sync_dirty(requeue);
        if requeue {
            if let Some(&key) = self.keys.get(&id) {
                self.unprocessed.insert(key);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Emission
    // ========================================================================

    /// Lowest start offset any future collapse can begin from.
    fn frontier(&self) -> Option<i64> {
        let queued = self.unprocessed.first().map(|k| k.0);
        let unread = if self.input_done { None } else { self.input_position };
        match (queued, unread) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn try_emit(&mut self) -> Result<Option<PathNode>> {
        let Some(&key) = self.order.first() else { return Ok(None) };
        if self.unprocessed.contains(&key) {
            return Ok(None);
        }
        let (_, _, id) = key;
        let last_end = self.graph.node(id)?.last_end();
        let stable = match self.frontier() {
            None => self.input_done,
            Some(frontier) => last_end + 2 * (self.config.lookahead() + 1) < frontier,
        };
        if !stable {
            return Ok(None);
        }
        let node = self.graph.remove(id).ok_or(Error::NotFound(id))?;
        self.retire(id, true);
        self.stats.nodes_emitted += 1;
        trace!(node = %id, first_start = node.first_start, "emitted");
        Ok(Some(node))
    }

    fn advance(&mut self) -> Result<Option<PathNode>> {
        loop {
            if let Some(node) = self.try_emit()? {
                return Ok(Some(node));
            }
            if let Some(id) = self.next_ready()? {
                self.process(id)?;
                continue;
            }
            if self.input_done {
                return Ok(None);
            }
            match self.input.next() {
                Some(Ok(node)) => self.ingest(node)?,
                Some(Err(e)) => return Err(e),
                None => self.input_done = true,
            }
        }
    }
}

impl<I, S> Iterator for CollapseEngine<I, S>
where
    I: Iterator<Item = Result<PathNode>>,
    S: CollapseStrategy,
{
    type Item = Result<PathNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(node)) => Some(Ok(node)),
            Ok(None) => {
                self.finished = true;
                debug!(
                    leaves_collapsed = self.stats.leaves_collapsed,
                    branches_collapsed = self.stats.branches_collapsed,
                    nodes_processed = self.stats.nodes_processed,
                    nodes_emitted = self.stats.nodes_emitted,
                    "collapse stream finished"
                );
                None
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collapse::Merge;
    use crate::model::kmers_from_sequence;

    /// Counts calls and never merges.
    #[derive(Default)]
    struct Passive {
        calls: usize,
    }

    impl CollapseStrategy for Passive {
        fn collapse(&mut self, _: &mut PathGraph, _: NodeId, _: usize) -> Result<Option<Merge>> {
            self.calls += 1;
            Ok(None)
        }
    }

    fn single(id: u64, seq: &[u8], start: i64) -> PathNode {
        let kmers = kmers_from_sequence(seq, 3).unwrap();
        let weights = vec![1; kmers.len()];
        PathNode::new(NodeId(id), kmers, weights, start, start)
    }

    #[test]
    fn test_every_node_is_processed_once() {
        let nodes: Vec<_> = (0..20).map(|i| single(i, b"ACGT", i as i64 * 3)).collect();
        let config = CollapseConfig::new(3, 4, 0).unwrap();
        let mut engine = CollapseEngine::with_strategy(nodes.into_iter().map(Ok), config, Passive::default()).unwrap();
        let out: Vec<_> = engine.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(out.len(), 20);
        assert_eq!(engine.strategy.calls, 20);
        assert_eq!(engine.stats().nodes_processed, 20);
        assert_eq!(engine.stats().nodes_emitted, 20);
    }

    #[test]
    fn test_window_stays_bounded() {
        let nodes = (0..200).map(|i| Ok(single(i, b"ACG", i as i64 * 10)));
        let config = CollapseConfig::new(3, 2, 0).unwrap();
        let mut engine = CollapseEngine::new(nodes, config).unwrap();
        let mut emitted = 0;
        while let Some(node) = engine.next() {
            node.unwrap();
            emitted += 1;
            assert!(engine.graph().len() <= 4, "window grew to {}", engine.graph().len());
        }
        assert_eq!(emitted, 200);
    }

    #[test]
    fn test_forward_declared_edge_resolves_on_arrival() {
        let a = single(10, b"ACGT", 0).with_next(NodeId(20));
        let b = single(20, b"GTA", 2);
        let config = CollapseConfig::new(3, 4, 0).unwrap();
        let out = crate::collapse_all(vec![a, b], config).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].next.len(), 1);
        assert_eq!(out[0].next[0].node, out[1].id);
        assert_eq!(out[1].prev[0].node, out[0].id);
        assert_eq!(out[1].prev[0].range, Interval::point(2));
    }

    #[test]
    fn test_upstream_error_ends_stream() {
        let input = vec![
            Ok(single(1, b"ACG", 0)),
            Err(Error::Merge("upstream".into())),
            Ok(single(2, b"ACG", 100)),
        ];
        let config = CollapseConfig::new(3, 4, 0).unwrap();
        let mut engine = CollapseEngine::new(input.into_iter(), config).unwrap();
        assert!(matches!(engine.next(), Some(Err(Error::Merge(_)))));
        assert!(engine.next().is_none());
    }

    #[test]
    fn test_duplicate_input_id_is_rejected() {
        let input = vec![single(1, b"ACG", 0), single(1, b"ACG", 1)];
        let config = CollapseConfig::new(3, 4, 0).unwrap();
        let result = crate::collapse_all(input, config);
        assert!(matches!(result, Err(Error::MalformedNode { .. })));
    }
}

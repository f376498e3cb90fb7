//! Path subnode: a windowed view of a node over part of its validity range.

use smallvec::SmallVec;

use super::{Degree, DegreeMap, PathGraph};
use crate::model::interval::intersect_all;
use crate::model::*;
use crate::Result;

/// `(node, first-k-mer start range)`. Never outlives the search that made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathSubnode {
    node: NodeId,
    first: Interval,
    len: usize,
}

impl PathSubnode {
    /// The whole node.
    pub fn new(graph: &PathGraph, id: NodeId) -> Result<Self> {
        let n = graph.node(id)?;
        Ok(Self { node: id, first: n.first(), len: n.len() })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn first(&self) -> Interval {
        self.first
    }

    pub fn first_start(&self) -> i64 {
        self.first.start
    }

    pub fn first_end(&self) -> i64 {
        self.first.end
    }

    pub fn last_start(&self) -> i64 {
        self.first.start + self.len as i64 - 1
    }

    pub fn last_end(&self) -> i64 {
        self.first.end + self.len as i64 - 1
    }

    /// Number of k-mers.
    pub fn length(&self) -> usize {
        self.len
    }

    pub fn width(&self) -> i64 {
        self.first.width()
    }

    /// Same node, different start range.
    pub fn with_range(&self, first: Interval) -> Self {
        Self { first, ..*self }
    }

    /// Edge ranges expressed as start offsets of this node's first k-mer.
    fn edge_ranges<'g>(&self, graph: &'g PathGraph, dir: Direction) -> impl Iterator<Item = Interval> + 'g {
        let shift = match dir {
            Direction::Forward => -(self.len as i64),
            Direction::Backward => 0,
        };
        graph
            .get(self.node)
            .into_iter()
            .flat_map(move |n| n.edges(dir).iter())
            .map(move |e| e.range.shift(shift))
    }

    pub fn degree_map(&self, graph: &PathGraph, dir: Direction) -> DegreeMap {
        DegreeMap::build(self.first, self.edge_ranges(graph, dir))
    }

    /// Sub-ranges of this subnode whose edge count in `dir` falls in `degree`.
    pub fn ranges_of_degree(&self, graph: &PathGraph, dir: Direction, degree: Degree) -> Vec<Interval> {
        self.degree_map(graph, dir).ranges_of(degree)
    }

    /// Maximal subnodes whose incoming edge count is `prev` and outgoing
    /// edge count is `next`.
    pub fn subnodes_of_degree(&self, graph: &PathGraph, prev: Degree, next: Degree) -> Vec<PathSubnode> {
        let backward = self.ranges_of_degree(graph, Direction::Backward, prev);
        let forward = self.ranges_of_degree(graph, Direction::Forward, next);
        intersect_all(&backward, &forward)
            .into_iter()
            .map(|r| self.with_range(r))
            .collect()
    }

    /// Adjacent subnodes in `dir`, each restricted to the offsets at which
    /// it is adjacent to this subnode.
    ///
    /// Neighbours no longer in the arena are skipped. Results are ordered by
    /// start offset, then k-mer content, so the order does not depend on
    /// handle allocation.
    pub fn neighbours(&self, graph: &PathGraph, dir: Direction) -> SmallVec<[PathSubnode; 4]> {
        let mut out: SmallVec<[PathSubnode; 4]> = SmallVec::new();
        let Some(node) = graph.get(self.node) else { return out };
        for edge in node.edges(dir) {
            let Some(adj) = graph.get(edge.node) else { continue };
            let sub = match dir {
                Direction::Forward => edge
                    .range
                    .intersect(&self.first.shift(self.len as i64))
                    .map(|r| PathSubnode { node: adj.id, first: r, len: adj.len() }),
                Direction::Backward => edge
                    .range
                    .intersect(&self.first)
                    .map(|r| PathSubnode { node: adj.id, first: r.shift(-(adj.len() as i64)), len: adj.len() }),
            };
            out.extend(sub);
        }
        out.sort_by(|a, b| {
            let ka = graph.get(a.node).map(|n| n.kmers.as_slice());
            let kb = graph.get(b.node).map(|n| n.kmers.as_slice());
            (a.first, ka, a.node).cmp(&(b.first, kb, b.node))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A(0..3) fans out to B and C; B and C rejoin at D.
    fn diamond() -> (PathGraph, [NodeId; 4]) {
        let mut g = PathGraph::new();
        let a = g.insert(kmers_from_sequence(b"AAAAC", 3).unwrap(), vec![1; 3], Interval::new(0, 0));
        let b = g.insert(kmers_from_sequence(b"ACGT", 3).unwrap(), vec![1; 2], Interval::new(3, 3));
        let c = g.insert(kmers_from_sequence(b"ACTT", 3).unwrap(), vec![1; 2], Interval::new(3, 3));
        let d = g.insert(kmers_from_sequence(b"GTTA", 3).unwrap(), vec![1; 2], Interval::new(5, 5));
        for (p, n) in [(a, b), (a, c), (b, d), (c, d)] {
            g.connect(p, n, Interval::ALL).unwrap();
        }
        (g, [a, b, c, d])
    }

    #[test]
    fn test_neighbours_forward_and_backward() {
        let (g, [a, b, c, d]) = diamond();
        let sa = PathSubnode::new(&g, a).unwrap();
        let next: Vec<NodeId> = sa.neighbours(&g, Direction::Forward).iter().map(|s| s.node()).collect();
        assert_eq!(next.len(), 2);
        assert!(next.contains(&b) && next.contains(&c));

        let sd = PathSubnode::new(&g, d).unwrap();
        let prev = sd.neighbours(&g, Direction::Backward);
        assert_eq!(prev.len(), 2);
        assert!(prev.iter().all(|s| s.first() == Interval::new(3, 3)));
    }

    #[test]
    fn test_subnodes_of_degree() {
        let (g, [a, b, _, d]) = diamond();
        let sa = PathSubnode::new(&g, a).unwrap();
        assert_eq!(sa.ranges_of_degree(&g, Direction::Forward, Degree::Multiple), vec![Interval::new(0, 0)]);
        let sb = PathSubnode::new(&g, b).unwrap();
        assert_eq!(sb.subnodes_of_degree(&g, Degree::Single, Degree::Single), vec![sb]);
        let sd = PathSubnode::new(&g, d).unwrap();
        assert!(sd.subnodes_of_degree(&g, Degree::NotMultiple, Degree::NotMultiple).is_empty());
    }

    #[test]
    fn test_positional_restriction() {
        let mut g = PathGraph::new();
        let a = g.insert(kmers_from_sequence(b"ACG", 3).unwrap(), vec![1], Interval::new(0, 9));
        let b = g.insert(kmers_from_sequence(b"CGT", 3).unwrap(), vec![1], Interval::new(5, 20));
        g.connect(a, b, Interval::ALL).unwrap();
        let sa = PathSubnode::new(&g, a).unwrap();
        let map = sa.degree_map(&g, Direction::Forward);
        assert_eq!(map.runs(), &[(Interval::new(0, 3), 0), (Interval::new(4, 9), 1)]);
        let sb = sa.neighbours(&g, Direction::Forward)[0];
        assert_eq!(sb.first(), Interval::new(5, 10));
    }
}

//! End-to-end tests for the streaming contract: ordering, pass-through,
//! cyclic topology and input validation.

use debruijn_collapse::{
    collapse_all, kmers_from_sequence, CollapseConfig, CollapseEngine, Error, Interval, NodeId,
    PathNode,
};
use pretty_assertions::assert_eq;

const K: usize = 4;

fn node(id: u64, seq: &[u8], weight: u32, first: Interval) -> PathNode {
    let kmers = kmers_from_sequence(seq, K).unwrap();
    let weights = vec![weight; kmers.len()];
    PathNode::new(NodeId(id), kmers, weights, first.start, first.end)
}

/// A main path with a tip and a bubble, wide enough that edges are
/// positional.
fn mixed_graph() -> Vec<PathNode> {
    vec![
        node(1, b"AACCGGT", 5, Interval::new(0, 3)).with_next(NodeId(2)).with_next(NodeId(3)),
        node(2, b"GGTTACG", 5, Interval::new(4, 7)).with_next(NodeId(4)).with_next(NodeId(5)),
        node(3, b"GGTTC", 1, Interval::new(4, 7)),
        node(4, b"ACGAATC", 4, Interval::new(8, 11)).with_next(NodeId(6)),
        node(5, b"ACGCATC", 2, Interval::new(8, 11)).with_next(NodeId(6)),
        node(6, b"ATCCA", 5, Interval::new(12, 15)),
    ]
}

fn assert_same_graph(output: &[PathNode], input: &[PathNode]) {
    assert_eq!(output.len(), input.len());
    for (out, original) in output.iter().zip(input) {
        assert_eq!(out.kmers, original.kmers);
        assert_eq!(out.weights, original.weights);
        assert_eq!(out.first(), original.first());
    }
}

// ============================================================================
// 1. Zero collapse length is a pass-through
// ============================================================================

#[test]
fn test_zero_collapse_length_is_noop() {
    let input = mixed_graph();
    let config = CollapseConfig::new(K as i64, 0, 3).unwrap();
    let mut engine = CollapseEngine::new(input.clone().into_iter().map(Ok), config).unwrap();

    let output: Vec<PathNode> = engine.by_ref().collect::<Result<_, _>>().unwrap();

    assert_same_graph(&output, &input);
    let next_counts: Vec<usize> = output.iter().map(|n| n.next.len()).collect();
    assert_eq!(next_counts, vec![2, 2, 0, 1, 1, 0]);
    assert_eq!(engine.stats().leaves_collapsed, 0);
    assert_eq!(engine.stats().branches_collapsed, 0);
    assert_eq!(engine.stats().nodes_emitted, 6);
}

// ============================================================================
// 2. Output order and mass
// ============================================================================

#[test]
fn test_output_is_sorted_and_conserves_mass() {
    let input = mixed_graph();
    let config = CollapseConfig::new(K as i64, 10, 1).unwrap();

    let output = collapse_all(input.clone(), config).unwrap();

    let starts: Vec<i64> = output.iter().map(|n| n.first_start).collect();
    let mut sorted = starts.clone();
    sorted.sort();
    assert_eq!(starts, sorted);

    let mass_in: u64 = input.iter().map(PathNode::mass).sum();
    let mass_out: u64 = output.iter().map(PathNode::mass).sum();
    assert_eq!(mass_out, mass_in);
    // the tip folds into node 2, splitting it, and one bubble branch goes
    assert_eq!(output.len(), 5);
}

#[test]
fn test_output_edges_refer_to_output_nodes() {
    let config = CollapseConfig::new(K as i64, 10, 1).unwrap();
    let output = collapse_all(mixed_graph(), config).unwrap();

    for n in &output {
        for e in &n.next {
            let target = output.iter().find(|o| o.id == e.node).expect("edge target emitted");
            assert!(target.prev.iter().any(|b| b.node == n.id && b.range == e.range));
        }
        for e in &n.prev {
            let source = output.iter().find(|o| o.id == e.node).expect("edge source emitted");
            assert!(source.next.iter().any(|f| f.node == n.id && f.range == e.range));
        }
    }
}

#[test]
fn test_collapsed_output_is_idempotent() {
    let config = CollapseConfig::new(K as i64, 10, 1).unwrap();
    let first = collapse_all(mixed_graph(), config).unwrap();

    let mut engine = CollapseEngine::new(first.clone().into_iter().map(Ok), config).unwrap();
    let second: Vec<PathNode> = engine.by_ref().collect::<Result<_, _>>().unwrap();

    assert_eq!(engine.stats().leaves_collapsed, 0);
    assert_eq!(engine.stats().branches_collapsed, 0);
    assert_same_graph(&second, &first);
}

// ============================================================================
// 3. Cyclic topology
// ============================================================================

#[test]
fn test_self_loop_is_never_merged_into_itself() {
    // AAAA repeated: the node follows itself one offset later
    let repeat = node(1, b"AAAAA", 3, Interval::new(0, 10)).with_next(NodeId(1));
    let config = CollapseConfig::new(K as i64, 10, 2).unwrap();
    let mut engine = CollapseEngine::new(std::iter::once(Ok(repeat.clone())), config).unwrap();

    let output: Vec<PathNode> = engine.by_ref().collect::<Result<_, _>>().unwrap();

    assert_eq!(output.len(), 1);
    assert_eq!(output[0].weights, repeat.weights);
    assert_eq!(output[0].next.len(), 1);
    assert_eq!(output[0].next[0].node, output[0].id);
    assert_eq!(output[0].next[0].range, Interval::new(2, 10));
    assert_eq!(engine.stats().leaves_collapsed + engine.stats().branches_collapsed, 0);
}

#[test]
fn test_cycle_between_two_nodes_terminates() {
    // ACGT -> CGTA -> GTAC -> TACG -> ACGT ...
    let a = node(1, b"ACGTA", 2, Interval::new(0, 20)).with_next(NodeId(2));
    let b = node(2, b"GTACG", 2, Interval::new(2, 22)).with_next(NodeId(1));
    let config = CollapseConfig::new(K as i64, 8, 1).unwrap();

    let output = collapse_all(vec![a.clone(), b.clone()], config).unwrap();

    let mass_out: u64 = output.iter().map(PathNode::mass).sum();
    assert_eq!(mass_out, a.mass() + b.mass());
}

// ============================================================================
// 4. Invalid input fails fast
// ============================================================================

#[test]
fn test_invalid_config_is_rejected() {
    let input = mixed_graph().into_iter().map(Ok);
    let result = CollapseEngine::new(input, CollapseConfig { k: 0, max_path_collapse_length: 10, max_bases_mismatch: 0 });
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn test_non_contiguous_kmers_are_rejected() {
    let mut broken = node(7, b"ACGTA", 1, Interval::point(0));
    broken.kmers[1] = kmers_from_sequence(b"TTTT", K).unwrap()[0];
    let config = CollapseConfig::new(K as i64, 10, 0).unwrap();

    let result = collapse_all(vec![broken], config);

    assert!(matches!(result, Err(Error::NonContiguousKmers { node: NodeId(7), index: 1 })));
}

#[test]
fn test_unsorted_input_is_rejected_and_ends_stream() {
    let input = vec![
        node(1, b"ACGTA", 1, Interval::point(10)),
        node(2, b"ACGTA", 1, Interval::point(4)),
        node(3, b"ACGTA", 1, Interval::point(40)),
    ];
    let config = CollapseConfig::new(K as i64, 2, 0).unwrap();
    let mut engine = CollapseEngine::new(input.into_iter().map(Ok), config).unwrap();

    let first = engine.next().unwrap();
    assert!(matches!(first, Err(Error::UnsortedInput { node: NodeId(2), start: 4, previous: 10 })));
    assert!(engine.next().is_none());
}

// ============================================================================
// 5. Declared edges follow split nodes
// ============================================================================

const LONG: &[u8] = b"ACGGTCATGCCATTAGCGTACCTGAAGTCGGATCCAATGTGCTAGCA";

/// `m1 -> {tip, m2} -> m3`, where the tip folds into the head of the long
/// node `m2` before `m3` has been read. `link` declares the `m2 -> m3` edge.
fn split_before_successor(link: fn(PathNode, PathNode) -> (PathNode, PathNode)) -> Vec<PathNode> {
    let m1 = node(1, &LONG[0..7], 5, Interval::point(0)).with_next(NodeId(2)).with_next(NodeId(3));
    let tip = node(2, &LONG[4..9], 1, Interval::point(4));
    let m2 = node(3, &LONG[4..43], 5, Interval::point(4));
    // unconnected, only there to move the input position past the tip's horizon
    let spacer = node(4, b"TTTTTTT", 2, Interval::point(20));
    let m3 = node(5, &LONG[40..47], 5, Interval::point(40));
    let (m2, m3) = link(m2, m3);
    vec![m1, tip, m2, spacer, m3]
}

fn assert_main_path_intact(output: &[PathNode]) {
    let m1 = kmers_from_sequence(&LONG[0..7], K).unwrap();
    let m3 = kmers_from_sequence(&LONG[40..47], K).unwrap();
    let mut current = output.iter().find(|n| n.kmers == m1).expect("head of the path emitted");
    let mut kmers = current.kmers.len();
    while let Some(edge) = current.next.first() {
        assert_eq!(current.next.len(), 1);
        current = output.iter().find(|o| o.id == edge.node).expect("edge target emitted");
        kmers += current.kmers.len();
    }
    assert_eq!(current.kmers, m3);
    assert_eq!(kmers, LONG.len() + 1 - K);

    let spacer = kmers_from_sequence(b"TTTTTTT", K).unwrap();
    let path: Vec<&PathNode> = output.iter().filter(|n| n.kmers != spacer).collect();
    assert_eq!(path.iter().filter(|n| n.prev.is_empty()).count(), 1);
    assert_eq!(path.iter().filter(|n| n.next.is_empty()).count(), 1);
}

#[test]
fn test_forward_edge_survives_split_of_its_source() {
    let input = split_before_successor(|m2, m3| (m2.with_next(NodeId(5)), m3));
    let config = CollapseConfig::new(K as i64, 4, 0).unwrap();
    let mut engine = CollapseEngine::new(input.clone().into_iter().map(Ok), config).unwrap();

    let output: Vec<PathNode> = engine.by_ref().collect::<Result<_, _>>().unwrap();

    assert_eq!(engine.stats().leaves_collapsed, 1);
    assert_main_path_intact(&output);
    let mass_in: u64 = input.iter().map(PathNode::mass).sum();
    assert_eq!(output.iter().map(PathNode::mass).sum::<u64>(), mass_in);
}

#[test]
fn test_backward_edge_resolves_against_split_pieces() {
    let input = split_before_successor(|m2, m3| (m2, m3.with_prev(NodeId(3))));
    let config = CollapseConfig::new(K as i64, 4, 0).unwrap();
    let mut engine = CollapseEngine::new(input.into_iter().map(Ok), config).unwrap();

    let output: Vec<PathNode> = engine.by_ref().collect::<Result<_, _>>().unwrap();

    assert_eq!(engine.stats().leaves_collapsed, 1);
    assert_main_path_intact(&output);
}

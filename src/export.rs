//! Debug dump: a tab-separated listing of path nodes and their edges.
//!
//! ```text
//! # id  first_start  first_end  kmers  weight  sequence  prev  next
//! 1     100          104        3      9       ACGTTG    -     2,3
//! ```
//!
//! Edges are written as comma-separated neighbour ids; `-` marks none. This
//! is for eyeballing a collapse run, not an interchange format.

use std::io::Write;

use crate::model::*;
use crate::Result;

/// Write `nodes` to `writer`, one row per node.
pub fn write_dump(nodes: &[PathNode], writer: &mut dyn Write, k: usize) -> Result<()> {
    let mass: u64 = nodes.iter().map(PathNode::mass).sum();

    // Header
    writeln!(writer, "# debruijn-collapse dump")?;
    writeln!(writer, "# nodes: {}  k: {}  mass: {}", nodes.len(), k, mass)?;
    writeln!(writer, "# id\tfirst_start\tfirst_end\tkmers\tweight\tsequence\tprev\tnext")?;

    for node in nodes {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            node.id,
            node.first_start,
            node.first_end,
            node.len(),
            node.weight(),
            sequence(node, k),
            format_edges(&node.prev),
            format_edges(&node.next),
        )?;
    }
    Ok(())
}

/// Bases spelled by the k-mer chain: the first k-mer in full, then the last
/// base of each following k-mer.
fn sequence(node: &PathNode, k: usize) -> String {
    let mut bases = match node.kmers.first() {
        Some(&kmer) => decode_kmer(kmer, k),
        None => return String::new(),
    };
    bases.extend(node.kmers.iter().skip(1).map(|&kmer| decode_kmer(last_base(kmer), 1)[0]));
    String::from_utf8_lossy(&bases).into_owned()
}

fn format_edges(edges: &EdgeList) -> String {
    if edges.is_empty() {
        return "-".into();
    }
    edges.iter().map(|e| e.node.to_string()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_rows() {
        let a = PathNode::new(NodeId(1), kmers_from_sequence(b"ACGTTG", 4).unwrap(), vec![3; 3], 100, 104)
            .with_next(NodeId(2))
            .with_next(NodeId(3));
        let b = PathNode::new(NodeId(2), kmers_from_sequence(b"TTGA", 4).unwrap(), vec![1], 103, 107)
            .with_prev(NodeId(1));

        let mut out = Vec::new();
        write_dump(&[a, b], &mut out, 4).unwrap();
        let text = String::from_utf8(out).unwrap();
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();

        assert!(text.contains("# nodes: 2  k: 4  mass: 50"));
        assert_eq!(rows, vec!["1\t100\t104\t3\t9\tACGTTG\t-\t2,3", "2\t103\t107\t1\t1\tTTGA\t1\t-"]);
    }
}

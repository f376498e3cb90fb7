//! 2-bit k-mer codec.
//!
//! Bases pack as A=0, C=1, G=2, T=3, first base in the most significant
//! position, so a k-mer of length `k` occupies the low `2k` bits of a `u64`.

use super::Direction;

/// A 2-bit packed k-mer, `k <= 32`.
pub type Kmer = u64;

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

pub fn encode_base(base: u8) -> Option<u64> {
    match base.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Pack a whole base sequence as a single k-mer (`k = bases.len()`).
pub fn encode_bases(bases: &[u8]) -> Option<Kmer> {
    if bases.is_empty() || bases.len() > 32 {
        return None;
    }
    bases.iter().try_fold(0u64, |acc, &b| Some((acc << 2) | encode_base(b)?))
}

/// All overlapping k-mers of `seq`, in order. `None` on ambiguous bases.
pub fn kmers_from_sequence(seq: &[u8], k: usize) -> Option<Vec<Kmer>> {
    if k == 0 || k > 32 || seq.len() < k {
        return None;
    }
    seq.windows(k).map(encode_bases).collect()
}

pub fn decode_kmer(kmer: Kmer, k: usize) -> Vec<u8> {
    (0..k)
        .map(|i| BASES[((kmer >> (2 * (k - 1 - i))) & 3) as usize])
        .collect()
}

pub fn first_base(kmer: Kmer, k: usize) -> u64 {
    (kmer >> (2 * (k - 1))) & 3
}

pub fn last_base(kmer: Kmer) -> u64 {
    kmer & 3
}

/// True if `next` follows `prev` in a de Bruijn chain (overlap of k-1 bases).
pub fn is_successor(prev: Kmer, next: Kmer, k: usize) -> bool {
    let suffix_mask = (1u64 << (2 * (k - 1))) - 1;
    (prev & suffix_mask) == (next >> 2)
}

/// Count base mismatches between two k-mer paths read outward from a shared
/// anchor.
///
/// Both slices are in search order: index 0 is the k-mer adjacent to the
/// anchor. `candidate[i]` is aligned against `reference[offset + i]`. Each
/// k-mer contributes only the base it adds beyond its predecessor in the
/// search: the last base when searching forward, the first base when
/// searching backward. Positions past the end of `reference` are ignored.
pub fn bases_different(
    k: usize,
    reference: &[Kmer],
    candidate: &[Kmer],
    offset: usize,
    dir: Direction,
) -> usize {
    let Some(tail) = reference.get(offset..) else { return 0 };
    tail.iter()
        .zip(candidate)
        .filter(|&(&r, &c)| match dir {
            Direction::Forward => last_base(r) != last_base(c),
            Direction::Backward => first_base(r, k) != first_base(c, k),
        })
        .count()
}

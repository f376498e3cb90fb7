//! # Path Graph Model
//!
//! Plain data types shared by the graph arena, the collapse engine, and the
//! caller: node handles, positional intervals, edges, and the 2-bit k-mer codec.
//!
//! Design rule: no graph state here. Everything in this module is pure data
//! or a pure function over it.

pub mod interval;
pub mod kmer;
pub mod node;

pub use interval::Interval;
pub use kmer::{
    Kmer, bases_different, decode_kmer, encode_bases, first_base, is_successor,
    kmers_from_sequence, last_base,
};
pub use node::{Direction, Edge, EdgeList, NodeId, PathNode};

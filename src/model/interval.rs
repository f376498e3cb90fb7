//! Closed integer intervals over reference offsets.

use serde::{Deserialize, Serialize};

/// Inclusive offset range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    /// Unrestricted range. Kept well inside `i64` so shifting never overflows.
    pub const ALL: Interval = Interval { start: i64::MIN / 4, end: i64::MAX / 4 };

    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn point(pos: i64) -> Self {
        Self { start: pos, end: pos }
    }

    /// Number of offsets covered.
    pub fn width(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn contains(&self, pos: i64) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// True if `other` lies entirely inside this interval.
    pub fn encloses(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(Interval { start, end })
    }

    /// True if the union of the two intervals is itself an interval.
    pub fn touches(&self, other: &Interval) -> bool {
        self.start <= other.end.saturating_add(1) && other.start <= self.end.saturating_add(1)
    }

    pub fn span(&self, other: &Interval) -> Interval {
        Interval { start: self.start.min(other.start), end: self.end.max(other.end) }
    }

    pub fn shift(&self, by: i64) -> Interval {
        Interval { start: self.start + by, end: self.end + by }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Merge sorted-or-unsorted intervals into the minimal set of disjoint,
/// non-adjacent intervals.
pub fn coalesce(mut ranges: Vec<Interval>) -> Vec<Interval> {
    ranges.sort();
    let mut out: Vec<Interval> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match out.last_mut() {
            Some(last) if last.touches(&r) => *last = last.span(&r),
            _ => out.push(r),
        }
    }
    out
}

/// Pairwise intersection of two coalesced interval sets.
pub fn intersect_all(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if let Some(r) = a[i].intersect(&b[j]) {
            out.push(r);
        }
        if a[i].end < b[j].end { i += 1 } else { j += 1 }
    }
    out
}

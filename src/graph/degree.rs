//! Degree classifier: partitions an offset range by edge count.

use crate::model::Interval;
use crate::model::interval::coalesce;

/// Edge-count category used to select sub-ranges of a subnode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Degree {
    None,
    Single,
    Multiple,
    /// `None` or `Single`.
    NotMultiple,
}

impl Degree {
    pub fn matches(self, count: usize) -> bool {
        match self {
            Degree::None => count == 0,
            Degree::Single => count == 1,
            Degree::Multiple => count > 1,
            Degree::NotMultiple => count <= 1,
        }
    }
}

/// Maximal constant-count runs covering a domain interval with no gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegreeMap {
    runs: Vec<(Interval, usize)>,
}

impl DegreeMap {
    /// Count, at every offset of `domain`, how many of `edges` cover it.
    pub fn build(domain: Interval, edges: impl IntoIterator<Item = Interval>) -> Self {
        let mut events: Vec<(i64, i64)> = Vec::new();
        for edge in edges {
            if let Some(r) = edge.intersect(&domain) {
                events.push((r.start, 1));
                events.push((r.end + 1, -1));
            }
        }
        events.sort_unstable();

        let mut runs: Vec<(Interval, usize)> = Vec::new();
        let mut cursor = domain.start;
        let mut count: i64 = 0;
        let mut i = 0;
        while i < events.len() {
            let pos = events[i].0;
            if pos > cursor {
                push_run(&mut runs, Interval::new(cursor, pos - 1), count as usize);
                cursor = pos;
            }
            while i < events.len() && events[i].0 == pos {
                count += events[i].1;
                i += 1;
            }
        }
        if cursor <= domain.end {
            push_run(&mut runs, Interval::new(cursor, domain.end), count as usize);
        }
        Self { runs }
    }

    pub fn runs(&self) -> &[(Interval, usize)] {
        &self.runs
    }

    /// Coalesced sub-ranges whose count falls in `degree`.
    pub fn ranges_of(&self, degree: Degree) -> Vec<Interval> {
        coalesce(
            self.runs
                .iter()
                .filter(|(_, count)| degree.matches(*count))
                .map(|(r, _)| *r)
                .collect(),
        )
    }
}

fn push_run(runs: &mut Vec<(Interval, usize)>, range: Interval, count: usize) {
    match runs.last_mut() {
        Some((last, c)) if *c == count && last.end + 1 == range.start => last.end = range.end,
        _ => runs.push((range, count)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partition_has_no_gaps() {
        let map = DegreeMap::build(
            Interval::new(0, 9),
            [Interval::new(2, 5), Interval::new(4, 12), Interval::new(-5, -1)],
        );
        assert_eq!(
            map.runs(),
            &[
                (Interval::new(0, 1), 0),
                (Interval::new(2, 3), 1),
                (Interval::new(4, 5), 2),
                (Interval::new(6, 9), 1),
            ]
        );
    }

    #[test]
    fn test_ranges_of_category() {
        let map = DegreeMap::build(Interval::new(0, 9), [Interval::new(2, 5), Interval::new(4, 12)]);
        assert_eq!(map.ranges_of(Degree::Multiple), vec![Interval::new(4, 5)]);
        assert_eq!(map.ranges_of(Degree::Single), vec![Interval::new(2, 3), Interval::new(6, 9)]);
        assert_eq!(map.ranges_of(Degree::None), vec![Interval::new(0, 1)]);
        assert_eq!(
            map.ranges_of(Degree::NotMultiple),
            vec![Interval::new(0, 3), Interval::new(6, 9)]
        );
    }

    #[test]
    fn test_no_edges() {
        let map = DegreeMap::build(Interval::new(3, 3), []);
        assert_eq!(map.ranges_of(Degree::None), vec![Interval::new(3, 3)]);
        assert!(map.ranges_of(Degree::Single).is_empty());
    }
}

use gridtrace_common::geom::coord::GridPoint;
use std::cmp::Ordering;

/// Move costs in fixed-point thousandths of a grid pitch, so path costs are
/// exact integers and tie-breaking is reproducible.
pub const ORTHO_COST: i64 = 1000;
pub const DIAG_COST: i64 = 1414;

/// Octilinear neighborhood, counter-clockwise from +x.
pub const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Exact cost of a straight octilinear run; also the octile lower bound for
/// arbitrary cell pairs, which is what the heuristic uses.
pub fn octile_cost(a: GridPoint, b: GridPoint) -> i64 {
    let dx = i64::from((b.x - a.x).abs());
    let dy = i64::from((b.y - a.y).abs());
    let diag = dx.min(dy);
    let ortho = dx.max(dy) - diag;
    diag * DIAG_COST + ortho * ORTHO_COST
}

/// Open-set entry. The insertion counter is the secondary key: of two equal
/// priorities the earlier insertion pops first, which keeps expansions in a
/// reproducible order.
#[derive(Clone, Copy, Debug)]
pub struct OpenEntry {
    pub f_score: i64,
    pub counter: u64,
    pub key: u64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_score == other.f_score && self.counter == other.counter
    }
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the std max-heap pops the smallest f first.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.counter.cmp(&self.counter))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn octile_matches_straight_runs() {
        let o = GridPoint::new(0, 0);
        assert_eq!(octile_cost(o, GridPoint::new(5, 0)), 5 * ORTHO_COST);
        assert_eq!(octile_cost(o, GridPoint::new(4, 4)), 4 * DIAG_COST);
        assert_eq!(
            octile_cost(o, GridPoint::new(5, 2)),
            2 * DIAG_COST + 3 * ORTHO_COST
        );
    }

    #[test]
    fn heap_pops_lowest_f_then_earliest_insertion() {
        let mut heap = BinaryHeap::new();
        heap.push(OpenEntry {
            f_score: 10,
            counter: 0,
            key: 1,
        });
        heap.push(OpenEntry {
            f_score: 5,
            counter: 1,
            key: 2,
        });
        heap.push(OpenEntry {
            f_score: 5,
            counter: 2,
            key: 3,
        });
        assert_eq!(heap.pop().map(|e| e.key), Some(2));
        assert_eq!(heap.pop().map(|e| e.key), Some(3));
        assert_eq!(heap.pop().map(|e| e.key), Some(1));
    }
}

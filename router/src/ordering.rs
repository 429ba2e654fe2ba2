use gridtrace_common::board::indices::NetId;
use gridtrace_common::board::model::BoardModel;
use gridtrace_common::board::stubs::stub_groups;
use gridtrace_common::geom::point::Point;
use priority_queue::PriorityQueue;
use rustc_hash::FxHashSet;
use std::cmp::Reverse;
use std::f64::consts::TAU;

/// A net reduced to its two farthest stub-group centroids (or pad
/// positions), the geometry the planarity heuristic works on.
pub struct NetEndpoints {
    pub net: NetId,
    pub a: Point<f64>,
    pub b: Point<f64>,
}

/// Splits the board's nets into those with two resolvable endpoints and the
/// rest (fully connected, single-island, or empty nets keep their input
/// position at the back of the order).
pub fn board_endpoints(board: &BoardModel) -> (Vec<NetEndpoints>, Vec<NetId>) {
    let mut resolved = Vec::new();
    let mut rest = Vec::new();
    for id in (0..board.num_nets()).map(NetId::new) {
        let groups = stub_groups(board, id);
        if groups.len() < 2 {
            rest.push(id);
            continue;
        }
        let mut best = (0, 1, 0.0_f64);
        for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                let d = groups[i].centroid.dist_sq(groups[j].centroid);
                if d > best.2 {
                    best = (i, j, d);
                }
            }
        }
        resolved.push(NetEndpoints {
            net: id,
            a: groups[best.0].centroid,
            b: groups[best.1].centroid,
        });
    }
    (resolved, rest)
}

/// Maximum-Planar-Subset routing order.
///
/// Endpoints are projected by angle onto a circle around their common
/// centroid; two nets conflict when their angular intervals interleave,
/// which approximates a straight-line crossing. Each round greedily appends
/// the net with the fewest conflicts among the round's survivors and defers
/// its conflict neighbors to the next round, so the front of the order is
/// maximally planar. Nets in `rest` are appended unchanged.
pub fn planar_order(resolved: &[NetEndpoints], rest: &[NetId]) -> Vec<NetId> {
    let n = resolved.len();
    let mut order = Vec::with_capacity(n + rest.len());
    if n > 0 {
        let conflicts = conflict_graph(resolved);
        let mut remaining: Vec<usize> = (0..n).collect();
        while !remaining.is_empty() {
            let active: FxHashSet<usize> = remaining.iter().copied().collect();
            let mut counts = vec![0usize; n];
            let mut queue: PriorityQueue<usize, Reverse<(usize, usize)>> = PriorityQueue::new();
            for &i in &remaining {
                counts[i] = conflicts[i].iter().filter(|j| active.contains(j)).count();
                queue.push(i, Reverse((counts[i], i)));
            }

            let mut deferred = Vec::new();
            while let Some((u, _)) = queue.pop() {
                order.push(resolved[u].net);
                let mut dropped = vec![u];
                for &v in &conflicts[u] {
                    if queue.remove(&v).is_some() {
                        deferred.push(v);
                        dropped.push(v);
                    }
                }
                for d in dropped {
                    for &w in &conflicts[d] {
                        if queue.get(&w).is_some() {
                            counts[w] -= 1;
                            queue.change_priority(&w, Reverse((counts[w], w)));
                        }
                    }
                }
            }
            deferred.sort_unstable();
            remaining = deferred;
        }
    }
    order.extend_from_slice(rest);
    order
}

fn conflict_graph(nets: &[NetEndpoints]) -> Vec<Vec<usize>> {
    let mut sum = Point::new(0.0, 0.0);
    for e in nets {
        sum = sum + e.a + e.b;
    }
    let count = (nets.len() * 2) as f64;
    let center = Point::new(sum.x / count, sum.y / count);

    let arcs: Vec<(f64, f64)> = nets
        .iter()
        .map(|e| (angle(center, e.a), angle(center, e.b)))
        .collect();

    let mut adj = vec![Vec::new(); nets.len()];
    for i in 0..nets.len() {
        for j in (i + 1)..nets.len() {
            if interleaves(arcs[i], arcs[j]) {
                adj[i].push(j);
                adj[j].push(i);
            }
        }
    }
    adj
}

fn angle(center: Point<f64>, p: Point<f64>) -> f64 {
    (p.y - center.y).atan2(p.x - center.x)
}

/// Chords cross when exactly one endpoint of `b` falls inside the arc swept
/// counterclockwise between `a`'s endpoints.
fn interleaves(a: (f64, f64), b: (f64, f64)) -> bool {
    let span = ccw(a.0, a.1);
    let first = ccw(a.0, b.0) < span;
    let second = ccw(a.0, b.1) < span;
    first != second
}

fn ccw(from: f64, to: f64) -> f64 {
    let d = to - from;
    if d < 0.0 { d + TAU } else { d }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(net: usize, deg_a: f64, deg_b: f64) -> NetEndpoints {
        let on_circle = |deg: f64| {
            let rad = deg.to_radians();
            Point::new(10.0 * rad.cos(), 10.0 * rad.sin())
        };
        NetEndpoints {
            net: NetId::new(net),
            a: on_circle(deg_a),
            b: on_circle(deg_b),
        }
    }

    #[test]
    fn crossing_chords_interleave_and_nested_do_not() {
        let a = (0.0_f64.to_radians(), 180.0_f64.to_radians());
        let crossing = (90.0_f64.to_radians(), 270.0_f64.to_radians());
        let nested = (45.0_f64.to_radians(), 135.0_f64.to_radians());
        assert!(interleaves(a, crossing));
        assert!(!interleaves(a, nested));
    }

    #[test]
    fn conflicted_nets_are_split_across_rounds() {
        // B crosses both A and C; D crosses nothing.
        let nets = vec![
            chord(0, 0.0, 180.0),
            chord(1, 90.0, 270.0),
            chord(2, 45.0, 135.0),
            chord(3, 190.0, 260.0),
        ];
        let order = planar_order(&nets, &[]);
        assert_eq!(
            order,
            vec![NetId::new(3), NetId::new(0), NetId::new(2), NetId::new(1)]
        );
        // B lands after both of its crossing partners.
        let pos = |id: usize| order.iter().position(|&x| x == NetId::new(id)).unwrap();
        assert!(pos(0) < pos(1));
        assert!(pos(2) < pos(1));
    }

    #[test]
    fn conflict_free_nets_keep_input_order() {
        let nets = vec![chord(0, 0.0, 30.0), chord(1, 60.0, 90.0), chord(2, 120.0, 150.0)];
        let order = planar_order(&nets, &[]);
        assert_eq!(order, vec![NetId::new(0), NetId::new(1), NetId::new(2)]);
    }

    #[test]
    fn endpoint_less_nets_are_appended_in_input_order() {
        let nets = vec![chord(0, 0.0, 180.0)];
        let rest = vec![NetId::new(5), NetId::new(2)];
        let order = planar_order(&nets, &rest);
        assert_eq!(order, vec![NetId::new(0), NetId::new(5), NetId::new(2)]);
    }
}

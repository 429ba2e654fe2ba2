use crate::board::indices::NetId;
use crate::board::model::BoardModel;
use crate::board::stubs;
use crate::geom::point::Point;
use crate::geom::rect::Rect;
use crate::geom::rtree::SpatialIndex;
use crate::util::config::RulesConfig;
use rayon::prelude::*;
use std::sync::Mutex;

const CHECK_TOLERANCE: f64 = 0.005;
const BIN_SIZE: f64 = 5.0;
const MAX_REPORTED: usize = 50;

/// Copper feature kinds checked against each other. A single dispatch point
/// keeps the pair loop branch-predictable.
#[derive(Clone, Copy, Debug)]
enum Shape {
    Segment {
        a: Point<f64>,
        b: Point<f64>,
        half_width: f64,
    },
    Disk {
        center: Point<f64>,
        radius: f64,
    },
}

#[derive(Clone, Copy, Debug)]
struct Feature {
    shape: Shape,
    layer: u8,
    net: Option<NetId>,
    is_via: bool,
}

impl Feature {
    /// Edge-to-edge distance; zero when outlines touch or cross.
    fn edge_distance(&self, other: &Feature) -> f64 {
        let centerline = match (self.shape, other.shape) {
            (Shape::Segment { a, b, half_width: _ }, Shape::Segment { a: c, b: d, .. }) => {
                segment_to_segment_dist(a, b, c, d)
            }
            (Shape::Segment { a, b, .. }, Shape::Disk { center, .. })
            | (Shape::Disk { center, .. }, Shape::Segment { a, b, .. }) => {
                point_to_segment_dist(center, a, b)
            }
            (Shape::Disk { center, .. }, Shape::Disk { center: c2, .. }) => center.dist(c2),
        };
        (centerline - self.extent() - other.extent()).max(0.0)
    }

    fn extent(&self) -> f64 {
        match self.shape {
            Shape::Segment { half_width, .. } => half_width,
            Shape::Disk { radius, .. } => radius,
        }
    }

    fn bounds(&self) -> (f64, f64, f64, f64) {
        match self.shape {
            Shape::Segment { a, b, half_width } => (
                a.x.min(b.x) - half_width,
                a.x.max(b.x) + half_width,
                a.y.min(b.y) - half_width,
                a.y.max(b.y) + half_width,
            ),
            Shape::Disk { center, radius } => (
                center.x - radius,
                center.x + radius,
                center.y - radius,
                center.y + radius,
            ),
        }
    }
}

/// Design-rule check over finished board geometry: copper clearance between
/// different nets, and per-net connectivity. Runs after batch routing and
/// behind the `check` subcommand.
pub fn run(board: &BoardModel, rules: &RulesConfig) -> Result<(), String> {
    log::info!("Starting design rule check...");

    let (clearance_result, connectivity_result) = rayon::join(
        || check_clearance(board, rules),
        || check_connectivity(board),
    );

    let mut msgs = Vec::new();
    match clearance_result {
        Ok(()) => log::info!("\x1b[32mPASS\x1b[0m: copper clearance."),
        Err(e) => {
            log::error!("\x1b[31mFAIL\x1b[0m: copper clearance.");
            msgs.push(e);
        }
    }
    match connectivity_result {
        Ok(()) => log::info!("\x1b[32mPASS\x1b[0m: net connectivity."),
        Err(e) => {
            log::error!("\x1b[31mFAIL\x1b[0m: net connectivity.");
            msgs.push(e);
        }
    }

    if msgs.is_empty() {
        log::info!("\x1b[32mSUCCESS\x1b[0m: board is clean.");
        Ok(())
    } else {
        Err(msgs.join("; "))
    }
}

#[derive(Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy)]
struct BinKey {
    layer: u8,
    bx: i32,
    by: i32,
}

fn collect_features(board: &BoardModel) -> Vec<Feature> {
    let mut features = Vec::new();
    for t in &board.tracks {
        features.push(Feature {
            shape: Shape::Segment {
                a: t.start,
                b: t.end,
                half_width: t.width / 2.0,
            },
            layer: t.layer,
            net: Some(t.net),
            is_via: false,
        });
    }
    for v in &board.vias {
        // A via spans the whole stackup; one feature per layer.
        for layer in 0..board.num_layers() {
            features.push(Feature {
                shape: Shape::Disk {
                    center: v.pos,
                    radius: v.diameter / 2.0,
                },
                layer,
                net: Some(v.net),
                is_via: true,
            });
        }
    }
    for p in &board.pads {
        for &layer in &p.layers {
            features.push(Feature {
                shape: Shape::Disk {
                    center: p.pos,
                    radius: p.half_extent(),
                },
                layer,
                net: p.net,
                is_via: false,
            });
        }
    }
    features
}

fn check_clearance(board: &BoardModel, rules: &RulesConfig) -> Result<(), String> {
    let features = collect_features(board);

    let mut entries: Vec<(BinKey, usize)> = features
        .par_iter()
        .enumerate()
        .flat_map(|(i, f)| {
            let (min_x, max_x, min_y, max_y) = f.bounds();
            let reach = rules.clearance.max(rules.via_clearance);
            let mut out = Vec::new();
            let start_bx = ((min_x - reach) / BIN_SIZE).floor() as i32;
            let end_bx = ((max_x + reach) / BIN_SIZE).floor() as i32;
            let start_by = ((min_y - reach) / BIN_SIZE).floor() as i32;
            let end_by = ((max_y + reach) / BIN_SIZE).floor() as i32;
            for bx in start_bx..=end_bx {
                for by in start_by..=end_by {
                    out.push((
                        BinKey {
                            layer: f.layer,
                            bx,
                            by,
                        },
                        i,
                    ));
                }
            }
            out
        })
        .collect();

    entries.par_sort_unstable_by(|a, b| a.cmp(b));

    let mut chunks = Vec::new();
    if !entries.is_empty() {
        let mut start = 0;
        for i in 1..entries.len() {
            if entries[i].0 != entries[i - 1].0 {
                chunks.push((start, i));
                start = i;
            }
        }
        chunks.push((start, entries.len()));
    }

    let violations = Mutex::new(Vec::new());

    chunks.par_iter().for_each(|&(start, end)| {
        let slice = &entries[start..end];
        let mut local = Vec::new();
        for i in 0..slice.len() {
            for j in (i + 1)..slice.len() {
                let (fi, fj) = (&features[slice[i].1], &features[slice[j].1]);
                if slice[i].1 == slice[j].1 {
                    continue;
                }
                if fi.net.is_some() && fi.net == fj.net {
                    continue;
                }
                let required = if fi.is_via || fj.is_via {
                    rules.via_clearance
                } else {
                    rules.clearance
                };
                let dist = fi.edge_distance(fj);
                if dist < required - CHECK_TOLERANCE {
                    local.push(format!(
                        "clearance {:.3} < {:.3} between {} and {} on layer {}",
                        dist,
                        required,
                        describe_net(board, fi.net),
                        describe_net(board, fj.net),
                        fi.layer
                    ));
                }
            }
        }
        if !local.is_empty() {
            violations.lock().unwrap().extend(local);
        }
    });

    let keepout_hits = check_keepouts(board);

    let mut all = violations.into_inner().unwrap();
    all.extend(keepout_hits);
    // Bin overlap can report the same pair from several bins.
    all.sort();
    all.dedup();

    if all.is_empty() {
        Ok(())
    } else {
        for v in all.iter().take(MAX_REPORTED) {
            log::error!("DRC: {}", v);
        }
        Err(format!("{} clearance violations", all.len()))
    }
}

/// A track may legally reach into a keepout to meet an allow-listed fanout
/// cell; only full crossings (midpoint strictly inside) are flagged.
fn check_keepouts(board: &BoardModel) -> Vec<String> {
    let mut index = SpatialIndex::new();
    for (k, keepout) in board.keepouts.iter().enumerate() {
        index.insert(keepout.rect, k);
    }

    let mut hits = Vec::new();
    for (i, t) in board.tracks.iter().enumerate() {
        let reach = Rect::new(
            Point::new(t.start.x.min(t.end.x), t.start.y.min(t.end.y)),
            Point::new(t.start.x.max(t.end.x), t.start.y.max(t.end.y)),
        )
        .expand(t.width / 2.0);
        let mid = t.midpoint();
        for k in index.query(reach) {
            let rect = board.keepouts[k].rect;
            let inner = rect.expand(-t.width / 2.0);
            if inner.contains(mid) && !rect.contains(t.start) && !rect.contains(t.end) {
                hits.push(format!(
                    "track {} of {} crosses keepout at ({:.3},{:.3})",
                    i,
                    describe_net(board, Some(t.net)),
                    mid.x,
                    mid.y
                ));
            }
        }
    }
    hits
}

fn check_connectivity(board: &BoardModel) -> Result<(), String> {
    let split: Vec<String> = (0..board.num_nets())
        .into_par_iter()
        .filter_map(|i| {
            let net = NetId::new(i);
            let groups = stubs::stub_groups(board, net);
            if groups.len() > 1 {
                Some(format!(
                    "net '{}' is split into {} islands",
                    board.net_name(net),
                    groups.len()
                ))
            } else {
                None
            }
        })
        .collect();

    if split.is_empty() {
        Ok(())
    } else {
        for msg in split.iter().take(MAX_REPORTED) {
            log::error!("DRC: {}", msg);
        }
        Err(format!("{} open nets", split.len()))
    }
}

fn describe_net(board: &BoardModel, net: Option<NetId>) -> String {
    match net {
        Some(id) => format!("'{}'", board.net_name(id)),
        None => "unconnected copper".to_string(),
    }
}

fn point_to_segment_dist(p: Point<f64>, a: Point<f64>, b: Point<f64>) -> f64 {
    let l2 = a.dist_sq(b);
    if l2 == 0.0 {
        return p.dist(a);
    }
    let t = ((p.x - a.x) * (b.x - a.x) + (p.y - a.y) * (b.y - a.y)) / l2;
    let t = t.clamp(0.0, 1.0);
    p.dist(Point::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y)))
}

fn segment_to_segment_dist(a: Point<f64>, b: Point<f64>, c: Point<f64>, d: Point<f64>) -> f64 {
    if segments_intersect(a, b, c, d) {
        return 0.0;
    }
    point_to_segment_dist(a, c, d)
        .min(point_to_segment_dist(b, c, d))
        .min(point_to_segment_dist(c, a, b))
        .min(point_to_segment_dist(d, a, b))
}

fn segments_intersect(a: Point<f64>, b: Point<f64>, c: Point<f64>, d: Point<f64>) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    let on_segment = |p: Point<f64>, s: Point<f64>, e: Point<f64>| {
        p.x >= s.x.min(e.x) - CHECK_TOLERANCE
            && p.x <= s.x.max(e.x) + CHECK_TOLERANCE
            && p.y >= s.y.min(e.y) - CHECK_TOLERANCE
            && p.y <= s.y.max(e.y) + CHECK_TOLERANCE
    };

    (o1 == 0 && on_segment(c, a, b))
        || (o2 == 0 && on_segment(d, a, b))
        || (o3 == 0 && on_segment(a, c, d))
        || (o4 == 0 && on_segment(b, c, d))
}

fn orientation(p: Point<f64>, q: Point<f64>, r: Point<f64>) -> i32 {
    let val = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
    if val.abs() < 1e-12 {
        return 0;
    }
    if val > 0.0 { 1 } else { 2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::model::BoardModel;

    fn board_with_two_nets(gap: f64) -> BoardModel {
        let mut board = BoardModel::new();
        board.add_layer("F.Cu");
        let a = board.add_net("A");
        let b = board.add_net("B");
        board.add_track(a, 0, Point::new(0.0, 0.0), Point::new(5.0, 0.0), 0.2);
        board.add_track(b, 0, Point::new(0.0, 0.2 + gap), Point::new(5.0, 0.2 + gap), 0.2);
        board
    }

    #[test]
    fn close_tracks_violate_clearance() {
        let board = board_with_two_nets(0.05);
        let rules = RulesConfig::default();
        assert!(check_clearance(&board, &rules).is_err());
    }

    #[test]
    fn spaced_tracks_pass() {
        let board = board_with_two_nets(0.5);
        let rules = RulesConfig::default();
        assert!(check_clearance(&board, &rules).is_ok());
    }

    #[test]
    fn keepout_crossing_is_flagged() {
        let mut board = BoardModel::new();
        board.add_layer("F.Cu");
        let a = board.add_net("A");
        board.add_keepout(Rect::new(Point::new(2.0, -1.0), Point::new(3.0, 1.0)));
        board.add_track(a, 0, Point::new(0.0, 0.0), Point::new(5.0, 0.0), 0.2);
        assert_eq!(check_keepouts(&board).len(), 1);
    }

    #[test]
    fn track_ending_inside_keepout_is_exempt() {
        let mut board = BoardModel::new();
        board.add_layer("F.Cu");
        let a = board.add_net("A");
        board.add_keepout(Rect::new(Point::new(2.0, -1.0), Point::new(3.0, 1.0)));
        board.add_track(a, 0, Point::new(2.2, 0.0), Point::new(3.4, 0.0), 0.2);
        assert!(check_keepouts(&board).is_empty());
    }

    #[test]
    fn segment_distance_handles_crossing() {
        let d = segment_to_segment_dist(
            Point::new(0.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
            Point::new(2.0, 0.0),
        );
        assert_eq!(d, 0.0);
    }
}

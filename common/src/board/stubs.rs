use crate::board::indices::NetId;
use crate::board::model::BoardModel;
use crate::geom::point::Point;

/// Distance under which two endpoints count as electrically joined.
pub const JOIN_TOLERANCE: f64 = 0.01;

/// One electrically-connected island of a net's existing copper.
///
/// Routing a net means joining its groups until one remains. Indices refer
/// into the owning `BoardModel`'s `tracks`/`vias`/`pads` vectors.
#[derive(Clone, Debug)]
pub struct StubGroup {
    pub tracks: Vec<usize>,
    pub vias: Vec<usize>,
    pub pads: Vec<usize>,
    pub centroid: Point<f64>,
    /// Layers the group can accept a connection on, sorted ascending.
    pub layers: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq)]
enum Item {
    Track(usize),
    Via(usize),
    Pad(usize),
}

/// Cluster a net's copper into connected groups by endpoint coincidence.
///
/// Tracks join on the same layer within `JOIN_TOLERANCE`; a via joins
/// anything at its position regardless of layer; a pad joins whatever
/// touches its outline on one of its layers.
pub fn stub_groups(board: &BoardModel, net: NetId) -> Vec<StubGroup> {
    let mut items = Vec::new();
    for (i, t) in board.tracks.iter().enumerate() {
        if t.net == net {
            items.push(Item::Track(i));
        }
    }
    for (i, v) in board.vias.iter().enumerate() {
        if v.net == net {
            items.push(Item::Via(i));
        }
    }
    for (i, p) in board.pads.iter().enumerate() {
        if p.net == Some(net) {
            items.push(Item::Pad(i));
        }
    }
    if items.is_empty() {
        return Vec::new();
    }

    let n = items.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if joined(board, items[i], items[j]) {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    // BFS over the adjacency, in item order, so group order is stable.
    let mut group_of = vec![usize::MAX; n];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for start in 0..n {
        if group_of[start] != usize::MAX {
            continue;
        }
        let gid = groups.len();
        let mut members = Vec::new();
        let mut queue = vec![start];
        group_of[start] = gid;
        while let Some(i) = queue.pop() {
            members.push(i);
            for &j in &adjacency[i] {
                if group_of[j] == usize::MAX {
                    group_of[j] = gid;
                    queue.push(j);
                }
            }
        }
        members.sort_unstable();
        groups.push(members);
    }

    groups
        .into_iter()
        .map(|members| build_group(board, &items, &members))
        .collect()
}

fn build_group(board: &BoardModel, items: &[Item], members: &[usize]) -> StubGroup {
    let mut group = StubGroup {
        tracks: Vec::new(),
        vias: Vec::new(),
        pads: Vec::new(),
        centroid: Point::new(0.0, 0.0),
        layers: Vec::new(),
    };
    let mut anchors: Vec<Point<f64>> = Vec::new();
    let mut has_via = false;

    for &m in members {
        match items[m] {
            Item::Track(i) => {
                let t = &board.tracks[i];
                group.tracks.push(i);
                group.layers.push(t.layer);
                anchors.push(t.start);
                anchors.push(t.end);
            }
            Item::Via(i) => {
                group.vias.push(i);
                has_via = true;
                anchors.push(board.vias[i].pos);
            }
            Item::Pad(i) => {
                let p = &board.pads[i];
                group.pads.push(i);
                group.layers.extend_from_slice(&p.layers);
                anchors.push(p.pos);
            }
        }
    }

    if has_via {
        group.layers.extend(0..board.num_layers());
    }
    group.layers.sort_unstable();
    group.layers.dedup();

    let count = anchors.len() as f64;
    let sum = anchors
        .into_iter()
        .fold(Point::new(0.0, 0.0), |acc, p| acc + p);
    group.centroid = Point::new(sum.x / count, sum.y / count);
    group
}

fn joined(board: &BoardModel, a: Item, b: Item) -> bool {
    match (a, b) {
        (Item::Track(i), Item::Track(j)) => {
            // Endpoint-to-segment rather than endpoint-to-endpoint, so a
            // route landing mid-stub (a T junction) still counts as joined.
            let (t1, t2) = (&board.tracks[i], &board.tracks[j]);
            t1.layer == t2.layer
                && ([t1.start, t1.end]
                    .iter()
                    .any(|&e| point_segment_dist(e, t2.start, t2.end) <= JOIN_TOLERANCE)
                    || [t2.start, t2.end]
                        .iter()
                        .any(|&e| point_segment_dist(e, t1.start, t1.end) <= JOIN_TOLERANCE))
        }
        (Item::Track(i), Item::Via(j)) | (Item::Via(j), Item::Track(i)) => {
            let (t, v) = (&board.tracks[i], &board.vias[j]);
            point_segment_dist(v.pos, t.start, t.end) <= JOIN_TOLERANCE
        }
        (Item::Track(i), Item::Pad(j)) | (Item::Pad(j), Item::Track(i)) => {
            let (t, p) = (&board.tracks[i], &board.pads[j]);
            let outline = p.bounds().expand(JOIN_TOLERANCE);
            p.layers.contains(&t.layer) && (outline.contains(t.start) || outline.contains(t.end))
        }
        (Item::Via(i), Item::Pad(j)) | (Item::Pad(j), Item::Via(i)) => {
            let (v, p) = (&board.vias[i], &board.pads[j]);
            p.bounds().expand(JOIN_TOLERANCE).contains(v.pos)
        }
        (Item::Via(i), Item::Via(j)) => {
            board.vias[i].pos.dist(board.vias[j].pos) <= JOIN_TOLERANCE
        }
        (Item::Pad(i), Item::Pad(j)) => board.pads[i].bounds().overlaps(&board.pads[j].bounds()),
    }
}

fn point_segment_dist(p: Point<f64>, a: Point<f64>, b: Point<f64>) -> f64 {
    let l2 = a.dist_sq(b);
    if l2 == 0.0 {
        return p.dist(a);
    }
    let t = (((p.x - a.x) * (b.x - a.x) + (p.y - a.y) * (b.y - a.y)) / l2).clamp(0.0, 1.0);
    p.dist(Point::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::model::PadShape;

    fn two_layer_board() -> BoardModel {
        let mut board = BoardModel::new();
        board.add_layer("F.Cu");
        board.add_layer("B.Cu");
        board
    }

    #[test]
    fn chained_tracks_form_one_group() {
        let mut board = two_layer_board();
        let net = board.add_net("SIG");
        board.add_track(net, 0, Point::new(0.0, 0.0), Point::new(1.0, 0.0), 0.2);
        board.add_track(net, 0, Point::new(1.0, 0.0), Point::new(2.0, 1.0), 0.2);
        board.add_track(net, 0, Point::new(5.0, 5.0), Point::new(6.0, 5.0), 0.2);

        let groups = stub_groups(&board, net);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].tracks.len(), 2);
        assert_eq!(groups[0].layers, vec![0]);
    }

    #[test]
    fn via_joins_across_layers() {
        let mut board = two_layer_board();
        let net = board.add_net("SIG");
        board.add_track(net, 0, Point::new(0.0, 0.0), Point::new(1.0, 0.0), 0.2);
        board.add_track(net, 1, Point::new(1.0, 0.0), Point::new(2.0, 0.0), 0.2);
        assert_eq!(stub_groups(&board, net).len(), 2);

        board.add_via(net, Point::new(1.0, 0.0), 0.6, 0.3);
        let groups = stub_groups(&board, net);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].layers, vec![0, 1]);
    }

    #[test]
    fn t_junction_joins_tracks() {
        let mut board = two_layer_board();
        let net = board.add_net("SIG");
        board.add_track(net, 0, Point::new(0.0, 0.0), Point::new(4.0, 0.0), 0.2);
        board.add_track(net, 0, Point::new(2.0, 0.0), Point::new(2.0, 3.0), 0.2);
        assert_eq!(stub_groups(&board, net).len(), 1);
    }

    #[test]
    fn pad_touching_track_joins_it() {
        let mut board = two_layer_board();
        let net = board.add_net("SIG");
        board.add_track(net, 0, Point::new(0.0, 0.0), Point::new(1.0, 0.0), 0.2);
        board.add_pad(
            Some(net),
            Point::new(0.0, 0.0),
            PadShape::Circle,
            Point::new(0.8, 0.8),
            vec![0],
        );
        let groups = stub_groups(&board, net);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].pads.len(), 1);
    }
}

use crate::RouteError;
use crate::algo::astar::{FoundPath, Search, SearchOutcome, SearchParams};
use crate::convert::GridConverter;
use crate::diffpair::{self, PairEndpoints, PairOutcome};
use crate::field::builder::FieldBuilder;
use crate::field::{ObstacleField, walk_cells};
use crate::ordering;
use crate::postprocess;
use crate::report::{NetOutcome, NetReport, Progress, ProgressSink, Report, SkipReason};
use crate::target::TargetSet;
use gridtrace_common::board::indices::NetId;
use gridtrace_common::board::model::BoardModel;
use gridtrace_common::board::stubs::{self, StubGroup};
use gridtrace_common::geom::coord::{GridPoint, GridState, cell_key};
use gridtrace_common::geom::point::Point;
use gridtrace_common::geom::rect::Rect;
use gridtrace_common::geom::rtree::SpatialIndex;
use gridtrace_common::util::config::Config;
use gridtrace_common::util::profiler::ScopedTimer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use std::time::Instant;

/// Iterations per `step` call between progress events.
const STEP_BATCH: u32 = 4096;

/// Routes every net of the board in planar order: differential pairs first,
/// then single nets. Routed geometry is folded back into the board, where the
/// next net's obstacle field picks it up. Returns the per-net tally; an `Err`
/// means a broken invariant, not an unroutable board.
pub fn route_board(
    board: &mut BoardModel,
    config: &Config,
    sink: &mut dyn ProgressSink,
) -> Result<Report, RouteError> {
    config.validate()?;
    let _timer = ScopedTimer::new("batch routing");
    let started = Instant::now();
    let conv = GridConverter::new(config.grid.pitch);

    let pairs = board.diff_pairs();
    let in_pair: FxHashSet<NetId> = pairs.iter().flat_map(|&(p, n)| [p, n]).collect();

    let singles: Vec<NetId> = if config.ordering.enabled {
        let (resolved, rest) = ordering::board_endpoints(board);
        ordering::planar_order(&resolved, &rest)
    } else {
        (0..board.num_nets()).map(NetId::new).collect()
    };

    // Nets that still await routing contribute soft stub repulsion to every
    // field built before their turn.
    let mut unrouted: Vec<NetId> = (0..board.num_nets())
        .map(NetId::new)
        .filter(|&id| stubs::stub_groups(board, id).len() > 1)
        .collect();

    let mut report = Report::default();
    let total = board.num_nets();

    for &(p, n) in &pairs {
        for (offset, net) in [(0, p), (1, n)] {
            sink.event(Progress::NetStarted {
                index: report.nets.len() + offset,
                total,
                net,
                name: board.net_name(net),
            });
        }
        let (p_outcome, n_outcome) = route_pair_nets(board, config, &conv, &unrouted, p, n, sink)?;
        unrouted.retain(|&id| id != p && id != n);
        finish_net(board, &mut report, p, p_outcome, sink);
        finish_net(board, &mut report, n, n_outcome, sink);
    }

    for &net in &singles {
        if in_pair.contains(&net) {
            continue;
        }
        sink.event(Progress::NetStarted {
            index: report.nets.len(),
            total,
            net,
            name: board.net_name(net),
        });
        let outcome = route_single(board, config, &conv, &unrouted, net, sink)?;
        unrouted.retain(|&id| id != net);
        finish_net(board, &mut report, net, outcome, sink);
    }

    report.elapsed = started.elapsed();
    report.log_summary();
    Ok(report)
}

fn finish_net(
    board: &BoardModel,
    report: &mut Report,
    net: NetId,
    outcome: NetOutcome,
    sink: &mut dyn ProgressSink,
) {
    let name = board.net_name(net).to_string();
    match &outcome {
        NetOutcome::Routed {
            iterations,
            length,
            vias,
        } => log::info!(
            "net '{}': routed, {:.2}mm, {} vias, {} iterations",
            name,
            length,
            vias,
            iterations
        ),
        NetOutcome::FailedNoPath { iterations } => {
            log::warn!("net '{}': no path after {} iterations", name, iterations)
        }
        NetOutcome::Skipped { reason } => log::debug!("net '{}': skipped, {}", name, reason),
    }
    let entry = NetReport { net, name, outcome };
    sink.event(Progress::NetDone { report: &entry });
    report.nets.push(entry);
}

/// One single-ended net: joins its stub groups pairwise, closest pair first,
/// re-resolving after every successful join until one island remains.
fn route_single(
    board: &mut BoardModel,
    config: &Config,
    conv: &GridConverter,
    unrouted: &[NetId],
    net: NetId,
    sink: &mut dyn ProgressSink,
) -> Result<NetOutcome, RouteError> {
    let mut groups = stubs::stub_groups(board, net);
    if groups.is_empty() {
        return Ok(NetOutcome::Skipped {
            reason: SkipReason::NoCopper,
        });
    }
    if groups.len() == 1 {
        return Ok(NetOutcome::Skipped {
            reason: SkipReason::AlreadyConnected,
        });
    }
    if groups.iter().any(|g| g.layers.is_empty()) {
        return Ok(NetOutcome::Skipped {
            reason: SkipReason::NoUsableLayer,
        });
    }

    let params = SearchParams::from_config(&config.search);
    let others: Vec<NetId> = unrouted.iter().copied().filter(|&id| id != net).collect();
    let mut rng = StdRng::seed_from_u64(net.0 as u64);
    let mut iterations: u32 = 0;
    let mut length = 0.0;
    let mut vias = 0;

    while groups.len() > 1 {
        let (gi, gj) = closest_group_pair(&groups);
        let builder = FieldBuilder::new(board, *conv, config);
        let base = builder.base(&[net], &others);

        let mut reverse = rng.gen_bool(0.5);
        let mut found: Option<(FoundPath, ObstacleField, Vec<Point<f64>>, usize, usize)> = None;
        for _ in 0..2 {
            let (si, ti) = if reverse { (gj, gi) } else { (gi, gj) };
            let mut field = base.clone();
            let (sources, origins, targets) =
                prepare_attempt(board, config, conv, &mut field, &groups[si], &groups[ti]);
            let corridor = if config.search.coarse_first {
                coarse_corridor(board, config, conv, net, &others, &groups[si], &groups[ti])
            } else {
                None
            };
            let outcome = drive_search(
                &field,
                &targets,
                &sources,
                params,
                corridor.as_ref(),
                net,
                sink,
            );
            iterations = iterations.saturating_add(outcome.iterations());
            match outcome {
                SearchOutcome::Found(f) => {
                    found = Some((f, field, origins, si, ti));
                    break;
                }
                // Retry once with source and target swapped.
                _ => reverse = !reverse,
            }
        }

        let Some((hit, field, origins, si, ti)) = found else {
            return Ok(NetOutcome::FailedNoPath { iterations });
        };

        let path = postprocess::smooth(&postprocess::simplify(&hit.path), &field);
        postprocess::self_check(&path, &field)?;

        let snap_tol = conv.pitch() * 0.75;
        let start_anchor = refine_anchor(
            board,
            &groups[si],
            origins[hit.source_index],
            path.first().map(|s| conv.state_to_float(*s)),
            snap_tol,
        );
        let end_anchor = refine_anchor(
            board,
            &groups[ti],
            hit.goal.anchor,
            path.last().map(|s| conv.state_to_float(*s)),
            snap_tol,
        );
        let geometry = postprocess::emit_geometry(
            &path,
            conv,
            &config.rules,
            net,
            Some(start_anchor),
            Some(end_anchor),
        );
        length += geometry.length;
        vias += geometry.vias.len();
        for t in &geometry.tracks {
            board.add_track(t.net, t.layer, t.start, t.end, t.width);
        }
        for v in &geometry.vias {
            board.add_via(v.net, v.pos, v.diameter, v.drill);
        }

        let regrouped = stubs::stub_groups(board, net);
        debug_assert!(regrouped.len() < groups.len());
        if regrouped.len() >= groups.len() {
            log::error!(
                "net '{}': emitted geometry did not join its stub groups",
                board.net_name(net)
            );
            return Ok(NetOutcome::FailedNoPath { iterations });
        }
        groups = regrouped;
    }

    Ok(NetOutcome::Routed {
        iterations,
        length,
        vias,
    })
}

/// Both halves of a differential pair at once, through the centerline
/// search. Falls back to plain single-net routing when either half cannot
/// give the pair two endpoints.
fn route_pair_nets(
    board: &mut BoardModel,
    config: &Config,
    conv: &GridConverter,
    unrouted: &[NetId],
    p: NetId,
    n: NetId,
    sink: &mut dyn ProgressSink,
) -> Result<(NetOutcome, NetOutcome), RouteError> {
    let pg = stubs::stub_groups(board, p);
    let ng = stubs::stub_groups(board, n);
    if pg.len() < 2 || ng.len() < 2 {
        let p_outcome = route_single(board, config, conv, unrouted, p, sink)?;
        let n_outcome = route_single(board, config, conv, unrouted, n, sink)?;
        return Ok((p_outcome, n_outcome));
    }

    let (pa, pb) = farthest_groups(&pg);
    let na = nearest_group(&ng, pg[pa].centroid, usize::MAX);
    let nb = nearest_group(&ng, pg[pb].centroid, na);

    let Some(start_layer) = common_layer(&pg[pa].layers, &ng[na].layers) else {
        return Ok(skip_pair(SkipReason::PairLayersDisjoint));
    };
    let Some(end_layer) = common_layer(&pg[pb].layers, &ng[nb].layers) else {
        return Ok(skip_pair(SkipReason::PairLayersDisjoint));
    };

    let ends = PairEndpoints {
        p_start: pg[pa].centroid,
        n_start: ng[na].centroid,
        start_layer,
        p_end: pg[pb].centroid,
        n_end: ng[nb].centroid,
        end_layer,
    };

    let others: Vec<NetId> = unrouted
        .iter()
        .copied()
        .filter(|&id| id != p && id != n)
        .collect();
    let builder = FieldBuilder::new(board, *conv, config);
    // Obstacles grow by the lane offset so every legal centerline cell
    // leaves room for both lanes.
    let mut field = builder.base_with_margin(config.rules.pair_spacing, &[p, n], &others);

    let params = SearchParams::from_config(&config.search);
    let spacing = config.rules.pair_spacing * 2.0;
    let escape_cells = conv.to_grid_distance(config.rules.escape_radius);

    match diffpair::route_pair(&mut field, conv, params, spacing, escape_cells, &ends)? {
        PairOutcome::Routed(route) => {
            let p_geometry = postprocess::emit_continuous(&route.p_lane, &config.rules, p);
            let n_geometry = postprocess::emit_continuous(&route.n_lane, &config.rules, n);
            for g in [&p_geometry, &n_geometry] {
                for t in &g.tracks {
                    board.add_track(t.net, t.layer, t.start, t.end, t.width);
                }
                for v in &g.vias {
                    board.add_via(v.net, v.pos, v.diameter, v.drill);
                }
            }
            Ok((
                NetOutcome::Routed {
                    iterations: route.iterations,
                    length: p_geometry.length,
                    vias: p_geometry.vias.len(),
                },
                NetOutcome::Routed {
                    // The joint search is billed to the P side.
                    iterations: 0,
                    length: n_geometry.length,
                    vias: n_geometry.vias.len(),
                },
            ))
        }
        PairOutcome::NoPath { iterations } => Ok((
            NetOutcome::FailedNoPath { iterations },
            NetOutcome::FailedNoPath { iterations: 0 },
        )),
    }
}

fn skip_pair(reason: SkipReason) -> (NetOutcome, NetOutcome) {
    (
        NetOutcome::Skipped { reason },
        NetOutcome::Skipped { reason },
    )
}

/// Seeds, their continuous origins, and the goal set for one attempt.
/// Endpoint cells are punched through zones and obstacle clearance, and both
/// group centroids open a relaxed-clearance escape zone.
fn prepare_attempt(
    board: &BoardModel,
    config: &Config,
    conv: &GridConverter,
    field: &mut ObstacleField,
    src: &StubGroup,
    dst: &StubGroup,
) -> (Vec<GridState>, Vec<Point<f64>>, TargetSet) {
    let mut sources = Vec::new();
    let mut origins = Vec::new();
    for (point, layers) in group_anchors(board, src) {
        for layer in layers {
            let state = conv.to_state(point, layer);
            field.add_source_target_cell(state.cell(), layer);
            sources.push(state);
            origins.push(point);
        }
    }

    let connect_half = config.rules.track_width / 2.0;
    let mut targets = TargetSet::new(
        *conv,
        config.search.via_cost,
        connect_half,
        conv.pitch() * 0.5,
    );
    for &i in &dst.tracks {
        let t = &board.tracks[i];
        targets.add_track(t.start, t.end, t.layer, t.width);
    }
    for &i in &dst.vias {
        for &layer in &dst.layers {
            targets.add_point(board.vias[i].pos, layer);
        }
    }
    for &i in &dst.pads {
        let pad = &board.pads[i];
        for &layer in &pad.layers {
            targets.add_point(pad.pos, layer);
        }
    }
    for anchor in targets.anchors() {
        field.add_source_target_cell(anchor.state.cell(), anchor.state.layer);
    }

    let escape_cells = conv.to_grid_distance(config.rules.escape_radius);
    field.add_escape_zone(conv.to_grid(src.centroid), escape_cells);
    field.add_escape_zone(conv.to_grid(dst.centroid), escape_cells);

    (sources, origins, targets)
}

/// Connection candidates of a group: track endpoints on their layer, vias on
/// every layer the group reaches, pad centers on the pad's layers.
fn group_anchors(board: &BoardModel, group: &StubGroup) -> Vec<(Point<f64>, Vec<u8>)> {
    let mut anchors = Vec::new();
    for &i in &group.tracks {
        let t = &board.tracks[i];
        anchors.push((t.start, vec![t.layer]));
        anchors.push((t.end, vec![t.layer]));
    }
    for &i in &group.vias {
        anchors.push((board.vias[i].pos, group.layers.clone()));
    }
    for &i in &group.pads {
        let pad = &board.pads[i];
        anchors.push((pad.pos, pad.layers.clone()));
    }
    anchors
}

/// Prefers an exact copper anchor (pad center or track endpoint) within snap
/// range of the path end; otherwise the origin carried through the search.
fn refine_anchor(
    board: &BoardModel,
    group: &StubGroup,
    carried: Point<f64>,
    path_end: Option<Point<f64>>,
    tol: f64,
) -> Point<f64> {
    let Some(at) = path_end else {
        return carried;
    };
    let mut index = SpatialIndex::new();
    let mut anchors = Vec::new();
    for (point, _) in group_anchors(board, group) {
        index.insert(Rect::new(point, point), anchors.len());
        anchors.push(point);
    }
    match index.nearest(at) {
        Some((id, dist)) if dist <= tol => anchors[id],
        _ => carried,
    }
}

fn drive_search(
    field: &ObstacleField,
    targets: &TargetSet,
    sources: &[GridState],
    params: SearchParams,
    corridor: Option<&FxHashSet<u64>>,
    net: NetId,
    sink: &mut dyn ProgressSink,
) -> SearchOutcome {
    let mut search = Search::new(field, targets, sources, params, corridor);
    loop {
        if let Some(outcome) = search.step(STEP_BATCH) {
            return outcome;
        }
        sink.event(Progress::Searching {
            net,
            snapshot: &search.snapshot(),
        });
    }
}

/// Coarse guide pass. A found coarse path, dilated by one coarse cell,
/// becomes the fine corridor; a failed pass guides nothing, since the coarse
/// grid may close gaps the fine route could thread.
fn coarse_corridor(
    board: &BoardModel,
    config: &Config,
    conv: &GridConverter,
    net: NetId,
    unrouted: &[NetId],
    src: &StubGroup,
    dst: &StubGroup,
) -> Option<FxHashSet<u64>> {
    let multiplier = config.grid.coarse_multiplier;
    let coarse = conv.coarsened(multiplier);
    let builder = FieldBuilder::new(board, coarse, config);
    let mut field = builder.base(&[net], unrouted);
    let (sources, _, targets) = prepare_attempt(board, config, &coarse, &mut field, src, dst);
    if sources.is_empty() || targets.is_empty() {
        return None;
    }

    let params = SearchParams::from_config(&config.search);
    let found = match Search::new(&field, &targets, &sources, params, None).run() {
        SearchOutcome::Found(f) => f,
        _ => return None,
    };

    let m = multiplier as i32;
    let mut corridor = FxHashSet::default();
    let mut cover = |c: GridPoint| {
        for fx in (c.x - 1) * m..(c.x + 2) * m {
            for fy in (c.y - 1) * m..(c.y + 2) * m {
                corridor.insert(cell_key(fx, fy));
            }
        }
    };
    for w in found.path.windows(2) {
        walk_cells(w[0].cell(), w[1].cell(), &mut cover);
    }
    if found.path.len() == 1 {
        cover(found.path[0].cell());
    }
    Some(corridor)
}

fn closest_group_pair(groups: &[StubGroup]) -> (usize, usize) {
    let mut best = (0, 1, f64::MAX);
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            let d = groups[i].centroid.dist_sq(groups[j].centroid);
            if d < best.2 {
                best = (i, j, d);
            }
        }
    }
    (best.0, best.1)
}

fn farthest_groups(groups: &[StubGroup]) -> (usize, usize) {
    let mut best = (0, 1, 0.0_f64);
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            let d = groups[i].centroid.dist_sq(groups[j].centroid);
            if d > best.2 {
                best = (i, j, d);
            }
        }
    }
    (best.0, best.1)
}

fn nearest_group(groups: &[StubGroup], to: Point<f64>, exclude: usize) -> usize {
    let mut best = (usize::MAX, f64::MAX);
    for (i, g) in groups.iter().enumerate() {
        if i == exclude {
            continue;
        }
        let d = g.centroid.dist_sq(to);
        if d < best.1 {
            best = (i, d);
        }
    }
    best.0
}

fn common_layer(a: &[u8], b: &[u8]) -> Option<u8> {
    a.iter().copied().find(|layer| b.contains(layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SilentSink;
    use gridtrace_common::board::model::PadShape;

    fn pad_to_pad_board() -> BoardModel {
        let mut board = BoardModel::new();
        board.add_layer("F.Cu");
        board.add_layer("B.Cu");
        let net = board.add_net("SIG");
        board.add_pad(
            Some(net),
            Point::new(1.0, 1.0),
            PadShape::Circle,
            Point::new(0.8, 0.8),
            vec![0],
        );
        board.add_pad(
            Some(net),
            Point::new(6.0, 1.0),
            PadShape::Circle,
            Point::new(0.8, 0.8),
            vec![0],
        );
        board
    }

    #[test]
    fn open_board_routes_and_connects() {
        let mut board = pad_to_pad_board();
        let config = Config::default();
        let mut sink = SilentSink;
        let report = route_board(&mut board, &config, &mut sink).unwrap();

        assert_eq!(report.routed(), 1);
        assert_eq!(report.failed(), 0);
        let net = board.net_id("SIG").unwrap();
        assert_eq!(stubs::stub_groups(&board, net).len(), 1);
        assert!(!board.tracks.is_empty());
    }

    #[test]
    fn connected_net_is_skipped() {
        let mut board = pad_to_pad_board();
        let net = board.net_id("SIG").unwrap();
        board.add_track(net, 0, Point::new(1.0, 1.0), Point::new(6.0, 1.0), 0.25);
        let config = Config::default();
        let report = route_board(&mut board, &config, &mut SilentSink).unwrap();

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.routed(), 0);
    }

    #[test]
    fn walled_single_layer_board_fails_cleanly() {
        let mut board = BoardModel::new();
        board.add_layer("F.Cu");
        let net = board.add_net("SIG");
        board.add_pad(
            Some(net),
            Point::new(1.0, 1.0),
            PadShape::Circle,
            Point::new(0.4, 0.4),
            vec![0],
        );
        board.add_pad(
            Some(net),
            Point::new(6.0, 1.0),
            PadShape::Circle,
            Point::new(0.4, 0.4),
            vec![0],
        );
        // A keepout slab across the whole routable span.
        board.add_keepout(Rect::new(Point::new(3.0, -50.0), Point::new(4.0, 50.0)));

        let mut config = Config::default();
        config.search.max_iterations = 20_000;
        let report = route_board(&mut board, &config, &mut SilentSink).unwrap();

        assert_eq!(report.failed(), 1);
        assert!(report.total_iterations() > 0);
    }

    #[test]
    fn differential_pair_routes_jointly() {
        let mut board = BoardModel::new();
        board.add_layer("F.Cu");
        board.add_layer("B.Cu");
        let p = board.add_net("LVDS_P");
        let n = board.add_net("LVDS_N");
        // Pad rows sit exactly one pair-spacing apart (2 x 0.3mm), so the
        // grafted lane ends land on the pad centers.
        for (net, y) in [(p, 1.3), (n, 0.7)] {
            for x in [1.0, 8.0] {
                board.add_pad(
                    Some(net),
                    Point::new(x, y),
                    PadShape::Circle,
                    Point::new(0.2, 0.2),
                    vec![0],
                );
            }
        }
        let config = Config::default();
        let report = route_board(&mut board, &config, &mut SilentSink).unwrap();

        assert_eq!(report.routed(), 2);
        for net in [p, n] {
            assert_eq!(stubs::stub_groups(&board, net).len(), 1);
            assert!(board.tracks.iter().any(|t| t.net == net));
        }
        assert!(gridtrace_common::util::check::run(&board, &config.rules).is_ok());
    }

    #[test]
    fn routed_nets_block_later_nets() {
        let mut board = BoardModel::new();
        board.add_layer("F.Cu");
        board.add_layer("B.Cu");
        let a = board.add_net("A");
        let b = board.add_net("B");
        for (net, y) in [(a, 1.0), (b, 2.0)] {
            board.add_pad(
                Some(net),
                Point::new(1.0, y),
                PadShape::Circle,
                Point::new(0.6, 0.6),
                vec![0],
            );
            board.add_pad(
                Some(net),
                Point::new(8.0, y),
                PadShape::Circle,
                Point::new(0.6, 0.6),
                vec![0],
            );
        }
        let config = Config::default();
        let report = route_board(&mut board, &config, &mut SilentSink).unwrap();
        assert_eq!(report.routed(), 2);

        // Both nets must still be clean against each other.
        assert!(gridtrace_common::util::check::run(&board, &config.rules).is_ok());
    }
}

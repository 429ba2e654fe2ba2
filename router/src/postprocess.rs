use crate::RouteError;
use crate::convert::GridConverter;
use crate::field::ObstacleField;
use gridtrace_common::board::indices::NetId;
use gridtrace_common::board::model::{Track, Via};
use gridtrace_common::geom::coord::{GridPoint, GridState};
use gridtrace_common::geom::point::Point;
use gridtrace_common::util::config::RulesConfig;

/// Snap distance as a fraction of the pitch; rounding error is at most
/// half a diagonal, so this always covers it while staying sub-pitch.
const SNAP_FRACTION: f64 = 0.75;

/// Drops every waypoint that continues its predecessor's direction on the
/// same layer. Layer changes always survive, they are physical vias.
pub fn simplify(path: &[GridState]) -> Vec<GridState> {
    if path.len() < 3 {
        return path.to_vec();
    }
    let mut out = vec![path[0]];
    for i in 1..path.len() - 1 {
        if step_dir(path[i - 1], path[i]) != step_dir(path[i], path[i + 1]) {
            out.push(path[i]);
        }
    }
    out.push(path[path.len() - 1]);
    out
}

/// Octilinear moves have components of equal magnitude or zero, so the sign
/// triple identifies the direction exactly.
fn step_dir(a: GridState, b: GridState) -> (i32, i32, i32) {
    (
        (b.x - a.x).signum(),
        (b.y - a.y).signum(),
        (i32::from(b.layer) - i32::from(a.layer)).signum(),
    )
}

/// Replaces staircases with at most two straight segments where the field
/// allows it, trying the furthest reachable waypoint first. Never crosses a
/// via and never trades a legal staircase for a blocked shortcut.
pub fn smooth(path: &[GridState], field: &ObstacleField) -> Vec<GridState> {
    if path.len() < 3 {
        return path.to_vec();
    }
    let mut out = vec![path[0]];
    let mut i = 0;
    while i < path.len() - 1 {
        let mut advanced = false;
        let mut j = path.len() - 1;
        while j > i + 1 {
            if same_layer_run(&path[i..=j]) {
                if let Some(corner) = two_segment_shortcut(path[i], path[j], field) {
                    if let Some(c) = corner {
                        out.push(GridState::new(c.x, c.y, path[i].layer));
                    }
                    out.push(path[j]);
                    i = j;
                    advanced = true;
                    break;
                }
            }
            j -= 1;
        }
        if !advanced {
            out.push(path[i + 1]);
            i += 1;
        }
    }
    simplify(&out)
}

fn same_layer_run(slice: &[GridState]) -> bool {
    slice.iter().all(|s| s.layer == slice[0].layer)
}

/// One straight segment when the endpoints are octilinearly aligned, else
/// an orthogonal-plus-diagonal elbow in either order. Returns the corner
/// waypoint, or `Some(None)` for the direct segment, or `None` when every
/// variant collides.
fn two_segment_shortcut(
    a: GridState,
    b: GridState,
    field: &ObstacleField,
) -> Option<Option<GridPoint>> {
    let (ac, bc, layer) = (a.cell(), b.cell(), a.layer);
    let (dx, dy) = (bc.x - ac.x, bc.y - ac.y);
    if dx == 0 || dy == 0 || dx.abs() == dy.abs() {
        if field.is_move_blocked(ac, bc, layer) {
            return None;
        }
        return Some(None);
    }

    let (adx, ady) = (dx.abs(), dy.abs());
    let (sx, sy) = (dx.signum(), dy.signum());
    let (ortho_first, diag_first) = if adx > ady {
        (
            GridPoint::new(ac.x + sx * (adx - ady), ac.y),
            GridPoint::new(ac.x + sx * ady, ac.y + sy * ady),
        )
    } else {
        (
            GridPoint::new(ac.x, ac.y + sy * (ady - adx)),
            GridPoint::new(ac.x + sx * adx, ac.y + sy * adx),
        )
    };

    for corner in [ortho_first, diag_first] {
        if !field.is_move_blocked(ac, corner, layer) && !field.is_move_blocked(corner, bc, layer) {
            return Some(Some(corner));
        }
    }
    None
}

/// Round-trip validation of a finished path against the field it was found
/// in. A failure here is an implementation bug, not an operational outcome,
/// and must never reach the board writer.
pub fn self_check(path: &[GridState], field: &ObstacleField) -> Result<(), RouteError> {
    for w in path.windows(2) {
        let (a, b) = (w[0], w[1]);
        if a.layer == b.layer {
            if field.is_move_blocked(a.cell(), b.cell(), a.layer) {
                return Err(RouteError::PathCrossesObstacle {
                    x: a.x,
                    y: a.y,
                    layer: a.layer,
                });
            }
        } else {
            if a.cell() != b.cell() {
                return Err(RouteError::ViaMovesLaterally { x: a.x, y: a.y });
            }
            if field.is_via_blocked(a.cell()) {
                return Err(RouteError::ViaOnBlockedCell { x: a.x, y: a.y });
            }
        }
    }
    Ok(())
}

pub struct PathGeometry {
    pub tracks: Vec<Track>,
    pub vias: Vec<Via>,
    /// Total copper length in mm, for reporting.
    pub length: f64,
}

/// Converts a finished waypoint path into board geometry. The first and
/// last waypoints snap to their continuous anchors when within a sub-pitch
/// tolerance; a farther anchor (a projection hit partway along a target
/// track) gets a short stitch segment instead, so emitted copper always
/// meets existing copper exactly.
pub fn emit_geometry(
    path: &[GridState],
    conv: &GridConverter,
    rules: &RulesConfig,
    net: NetId,
    start_anchor: Option<Point<f64>>,
    end_anchor: Option<Point<f64>>,
) -> PathGeometry {
    let mut points: Vec<(Point<f64>, u8)> = path
        .iter()
        .map(|s| (conv.state_to_float(*s), s.layer))
        .collect();

    let tol = conv.pitch() * SNAP_FRACTION;
    if let (Some(anchor), Some(&(p, layer))) = (start_anchor, points.first()) {
        if p.dist(anchor) <= tol {
            points[0].0 = anchor;
        } else {
            points.insert(0, (anchor, layer));
        }
    }
    if let (Some(anchor), Some(&(p, layer))) = (end_anchor, points.last()) {
        if p.dist(anchor) <= tol {
            let last = points.len() - 1;
            points[last].0 = anchor;
        } else {
            points.push((anchor, layer));
        }
    }

    emit_continuous(&points, rules, net)
}

/// Geometry from already-continuous waypoints, used by the differential
/// pair lanes whose points come from perpendicular offsetting rather than
/// grid cells.
pub fn emit_continuous(points: &[(Point<f64>, u8)], rules: &RulesConfig, net: NetId) -> PathGeometry {
    let mut geometry = PathGeometry {
        tracks: Vec::new(),
        vias: Vec::new(),
        length: 0.0,
    };
    for w in points.windows(2) {
        let ((a, la), (b, lb)) = (w[0], w[1]);
        if la == lb {
            if a.dist(b) > f64::EPSILON {
                geometry.length += a.dist(b);
                geometry.tracks.push(Track {
                    net,
                    layer: la,
                    start: a,
                    end: b,
                    width: rules.track_width,
                });
            }
        } else {
            geometry.vias.push(Via {
                net,
                pos: a,
                diameter: rules.via_diameter,
                drill: rules.via_drill,
            });
        }
    }
    geometry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Expansion;

    fn st(x: i32, y: i32, layer: u8) -> GridState {
        GridState::new(x, y, layer)
    }

    #[test]
    fn simplify_collapses_straight_runs_and_keeps_vias() {
        let path = vec![
            st(0, 0, 0),
            st(1, 1, 0),
            st(2, 2, 0),
            st(3, 2, 0),
            st(4, 2, 0),
            st(4, 2, 1),
            st(5, 2, 1),
        ];
        let simplified = simplify(&path);
        assert_eq!(
            simplified,
            vec![
                st(0, 0, 0),
                st(2, 2, 0),
                st(4, 2, 0),
                st(4, 2, 1),
                st(5, 2, 1)
            ]
        );
    }

    #[test]
    fn simplify_is_idempotent() {
        let path = vec![
            st(0, 0, 0),
            st(1, 0, 0),
            st(2, 0, 0),
            st(3, 1, 0),
            st(4, 2, 0),
        ];
        let once = simplify(&path);
        let twice = simplify(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn smooth_replaces_staircase_with_elbow_in_open_field() {
        let field = ObstacleField::new(1);
        // A 5-right 2-up staircase walked as alternating single steps.
        let path = vec![
            st(0, 0, 0),
            st(1, 0, 0),
            st(2, 1, 0),
            st(3, 1, 0),
            st(4, 2, 0),
            st(5, 2, 0),
        ];
        let smoothed = smooth(&path, &field);
        assert_eq!(smoothed.first(), Some(&st(0, 0, 0)));
        assert_eq!(smoothed.last(), Some(&st(5, 2, 0)));
        assert_eq!(smoothed.len(), 3);
    }

    #[test]
    fn smooth_keeps_staircase_when_shortcut_is_blocked() {
        let mut field = ObstacleField::new(1);
        // Wall with a one-cell slit exactly on the staircase.
        for y in 0..8 {
            if y == 2 {
                continue;
            }
            field.mark_circle_blocked(
                GridPoint::new(3, y),
                0,
                Expansion {
                    track: 0,
                    tight: 0,
                    via: 0,
                },
            );
        }
        let path = vec![
            st(0, 0, 0),
            st(1, 1, 0),
            st(2, 2, 0),
            st(3, 2, 0),
            st(4, 2, 0),
            st(5, 3, 0),
            st(6, 4, 0),
        ];
        let smoothed = smooth(&path, &field);
        for w in smoothed.windows(2) {
            assert!(!field.is_move_blocked(w[0].cell(), w[1].cell(), 0));
        }
        assert_eq!(smoothed.first(), Some(&st(0, 0, 0)));
        assert_eq!(smoothed.last(), Some(&st(6, 4, 0)));
    }

    #[test]
    fn self_check_rejects_path_through_obstacle() {
        let mut field = ObstacleField::new(2);
        field.mark_circle_blocked(
            GridPoint::new(2, 0),
            0,
            Expansion {
                track: 0,
                tight: 0,
                via: 0,
            },
        );
        let bad = vec![st(0, 0, 0), st(4, 0, 0)];
        assert!(self_check(&bad, &field).is_err());
        let lateral_via = vec![st(0, 0, 0), st(1, 0, 1)];
        assert!(self_check(&lateral_via, &field).is_err());
        let good = vec![st(0, 2, 0), st(4, 2, 0), st(4, 2, 1)];
        assert!(self_check(&good, &field).is_ok());
    }

    #[test]
    fn emitted_geometry_snaps_to_anchors_and_tags_vias() {
        let conv = GridConverter::new(0.1);
        let rules = RulesConfig::default();
        let path = vec![st(0, 0, 0), st(5, 0, 0), st(5, 0, 1), st(5, 3, 1)];
        let geometry = emit_geometry(
            &path,
            &conv,
            &rules,
            NetId::new(0),
            Some(Point::new(0.03, 0.02)),
            Some(Point::new(0.5, 0.33)),
        );
        assert_eq!(geometry.tracks.len(), 2);
        assert_eq!(geometry.vias.len(), 1);
        let first = &geometry.tracks[0];
        assert!((first.start.x - 0.03).abs() < 1e-9);
        assert!((first.start.y - 0.02).abs() < 1e-9);
        let last = &geometry.tracks[1];
        assert!((last.end.y - 0.33).abs() < 1e-9);
        let via = &geometry.vias[0];
        assert!((via.pos.x - 0.5).abs() < 1e-9);
        assert!((via.diameter - rules.via_diameter).abs() < 1e-9);
        assert!((via.drill - rules.via_drill).abs() < 1e-9);
    }

    #[test]
    fn distant_anchor_gets_a_stitch_segment() {
        let conv = GridConverter::new(0.1);
        let rules = RulesConfig::default();
        let path = vec![st(0, 0, 0), st(5, 0, 0)];
        // Anchor 0.2mm off the last waypoint, beyond snap range.
        let geometry = emit_geometry(
            &path,
            &conv,
            &rules,
            NetId::new(0),
            None,
            Some(Point::new(0.5, 0.2)),
        );
        assert_eq!(geometry.tracks.len(), 2);
        let stitch = &geometry.tracks[1];
        assert!((stitch.start.x - 0.5).abs() < 1e-9);
        assert!((stitch.end.y - 0.2).abs() < 1e-9);
    }
}

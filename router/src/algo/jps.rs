use crate::field::ObstacleField;
use crate::target::TargetSet;
use gridtrace_common::geom::coord::{GridPoint, GridState, cell_key};
use rustc_hash::FxHashSet;

/// How a directional scan ended. Only `Event` stops mark cells where the
/// search could branch profitably; `Plain` stops exist to bound scan length
/// and to leave a frontier cell next to walls for via placement.
enum Scan {
    None,
    Event(GridPoint),
    Plain(GridPoint),
}

/// Semantics at the cell a scan departs from; any cell along the scan where
/// one of these flips is an event.
#[derive(Clone, Copy)]
struct ScanStart {
    in_corridor: bool,
    via_open: bool,
}

pub struct JumpContext<'a> {
    pub field: &'a ObstacleField,
    pub targets: &'a TargetSet,
    pub max_jump: u32,
    pub corridor: Option<&'a FxHashSet<u64>>,
}

impl JumpContext<'_> {
    /// Scans from `from` along `dir`, returning the next cell worth putting
    /// on the open set, or None when the direction dead-ends immediately.
    pub fn jump(&self, from: GridPoint, dir: (i32, i32), layer: u8) -> Option<GridPoint> {
        let scan = if dir.0 != 0 && dir.1 != 0 {
            self.scan_diagonal(from, dir, layer)
        } else {
            self.scan_straight(from, dir, layer)
        };
        match scan {
            Scan::None => None,
            Scan::Event(c) | Scan::Plain(c) => Some(c),
        }
    }

    fn blocked(&self, x: i32, y: i32, layer: u8) -> bool {
        self.field.is_blocked(GridState::new(x, y, layer))
    }

    fn in_corridor(&self, c: GridPoint) -> bool {
        match self.corridor {
            Some(set) => set.contains(&cell_key(c.x, c.y)),
            None => true,
        }
    }

    /// Whether a layer change is available at `c`. Transitions of this
    /// predicate have to become jump points: vias are only attempted at
    /// popped states, so a route whose sole legal drill site sits strictly
    /// inside a jump would otherwise never be found.
    fn via_open(&self, c: GridPoint, layer: u8) -> bool {
        !self.field.is_via_blocked(c)
            && (0..self.field.num_layers() as u8)
                .any(|l| l != layer && !self.field.is_blocked(GridState::new(c.x, c.y, l)))
    }

    /// Cells where the cost terrain or clearance semantics change. Jumps may
    /// not skip these or the accumulated move cost would be wrong.
    fn terrain_event(&self, c: GridPoint, layer: u8, started: ScanStart) -> bool {
        self.field.proximity_cost(c) != 0
            || self.field.in_escape_zone(c)
            || self.in_corridor(c) != started.in_corridor
            || self.via_open(c, layer) != started.via_open
            || self.targets.hit(GridState::new(c.x, c.y, layer)).is_some()
    }

    fn scan_start(&self, from: GridPoint, layer: u8) -> ScanStart {
        ScanStart {
            in_corridor: self.in_corridor(from),
            via_open: self.via_open(from, layer),
        }
    }

    fn scan_straight(&self, from: GridPoint, dir: (i32, i32), layer: u8) -> Scan {
        let started = self.scan_start(from, layer);
        let (px, py) = if dir.0 != 0 { (0, 1) } else { (1, 0) };
        let mut cur = from;
        for _ in 0..self.max_jump {
            let next = GridPoint::new(cur.x + dir.0, cur.y + dir.1);
            if self.blocked(next.x, next.y, layer) {
                return if cur == from { Scan::None } else { Scan::Plain(cur) };
            }
            cur = next;
            if self.terrain_event(cur, layer, started) {
                return Scan::Event(cur);
            }
            // Forced neighbor: a side cell is walled here but open one step
            // ahead, so a shorter branch could pass through this cell.
            let forced = |sx: i32, sy: i32| {
                self.blocked(cur.x + sx, cur.y + sy, layer)
                    && !self.blocked(cur.x + sx + dir.0, cur.y + sy + dir.1, layer)
            };
            if forced(px, py) || forced(-px, -py) {
                return Scan::Event(cur);
            }
        }
        Scan::Plain(cur)
    }

    fn scan_diagonal(&self, from: GridPoint, dir: (i32, i32), layer: u8) -> Scan {
        let started = self.scan_start(from, layer);
        let mut cur = from;
        for _ in 0..self.max_jump {
            let next = GridPoint::new(cur.x + dir.0, cur.y + dir.1);
            if self.blocked(next.x, next.y, layer) {
                return if cur == from { Scan::None } else { Scan::Plain(cur) };
            }
            cur = next;
            if self.terrain_event(cur, layer, started) {
                return Scan::Event(cur);
            }
            let forced = (self.blocked(cur.x - dir.0, cur.y, layer)
                && !self.blocked(cur.x - dir.0, cur.y + dir.1, layer))
                || (self.blocked(cur.x, cur.y - dir.1, layer)
                    && !self.blocked(cur.x + dir.0, cur.y - dir.1, layer));
            if forced {
                return Scan::Event(cur);
            }
            // A real event on either orthogonal axis makes this cell the
            // branch point; plain sub-scan stops do not.
            if matches!(self.scan_straight(cur, (dir.0, 0), layer), Scan::Event(_))
                || matches!(self.scan_straight(cur, (0, dir.1), layer), Scan::Event(_))
            {
                return Scan::Event(cur);
            }
        }
        Scan::Plain(cur)
    }
}

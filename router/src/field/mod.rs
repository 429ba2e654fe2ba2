pub mod builder;

use gridtrace_common::geom::coord::{GridPoint, GridState, cell_key};
use rustc_hash::{FxHashMap, FxHashSet};

/// Axis-aligned hard-exclusion zone in grid coordinates, inclusive on all
/// sides. Blocks every layer unless a cell is allow-listed.
#[derive(Clone, Copy, Debug)]
pub struct GridRect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl GridRect {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn contains(&self, p: GridPoint) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

/// Cell radii, in grid units, that one obstacle adds to each mask. `track`
/// and `tight` go into the per-layer sets, `via` into the shared via set.
#[derive(Clone, Copy, Debug)]
pub struct Expansion {
    pub track: i32,
    pub tight: i32,
    pub via: i32,
}

#[derive(Clone, Default)]
struct LayerMasks {
    blocked: FxHashSet<u64>,
    // Rasterized with the escape clearance; consulted instead of `blocked`
    // inside escape zones.
    blocked_tight: FxHashSet<u64>,
}

/// Blocking and soft-cost oracle for one net-routing attempt. Built once per
/// net from everything that is not the net's own copper, then cloned and
/// extended per attempt (endpoint overrides, escape zones).
#[derive(Clone)]
pub struct ObstacleField {
    layers: Vec<LayerMasks>,
    via_blocked: FxHashSet<u64>,
    zones: Vec<GridRect>,
    allowed: FxHashSet<u64>,
    endpoints: FxHashSet<u64>,
    escape: FxHashSet<u64>,
    proximity: FxHashMap<u64, i64>,
}

impl ObstacleField {
    pub fn new(num_layers: usize) -> Self {
        Self {
            layers: vec![LayerMasks::default(); num_layers],
            via_blocked: FxHashSet::default(),
            zones: Vec::new(),
            allowed: FxHashSet::default(),
            endpoints: FxHashSet::default(),
            escape: FxHashSet::default(),
            proximity: FxHashMap::default(),
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn mark_segment_blocked(&mut self, a: GridPoint, b: GridPoint, layer: u8, exp: Expansion) {
        walk_cells(a, b, |c| self.mark_cell(c, layer, exp));
    }

    pub fn mark_circle_blocked(&mut self, center: GridPoint, layer: u8, exp: Expansion) {
        self.mark_cell(center, layer, exp);
    }

    fn mark_cell(&mut self, c: GridPoint, layer: u8, exp: Expansion) {
        let masks = &mut self.layers[layer as usize];
        stamp_disk(c, exp.track, |k| {
            masks.blocked.insert(k);
        });
        stamp_disk(c, exp.tight, |k| {
            masks.blocked_tight.insert(k);
        });
        stamp_disk(c, exp.via, |k| {
            self.via_blocked.insert(k);
        });
    }

    pub fn add_zone(&mut self, rect: GridRect) {
        self.zones.push(rect);
    }

    /// Punches a per-cell hole through exclusion zones, for legitimate
    /// endpoints sitting inside a footprint keepout.
    pub fn add_allowed_cell(&mut self, c: GridPoint) {
        self.allowed.insert(cell_key(c.x, c.y));
    }

    /// Endpoint cells stay enterable on their own layer even where clearance
    /// expansion of neighboring copper has swallowed them.
    pub fn add_source_target_cell(&mut self, c: GridPoint, layer: u8) {
        self.endpoints.insert(GridState::new(c.x, c.y, layer).key());
        self.allowed.insert(cell_key(c.x, c.y));
    }

    pub fn add_escape_zone(&mut self, center: GridPoint, radius: i32) {
        stamp_disk(center, radius, |k| {
            self.escape.insert(k);
        });
    }

    /// Linear falloff from `max_cost` at the center to zero at `radius`.
    /// Overlapping hotspots keep the larger cost.
    pub fn add_proximity_disk(&mut self, center: GridPoint, radius: i32, max_cost: i64) {
        if radius <= 0 || max_cost <= 0 {
            return;
        }
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                let dist_sq = dx * dx + dy * dy;
                if dist_sq > radius * radius {
                    continue;
                }
                let dist = f64::from(dist_sq).sqrt();
                let cost = (max_cost as f64 * (1.0 - dist / f64::from(radius))).round() as i64;
                if cost <= 0 {
                    continue;
                }
                let k = cell_key(center.x + dx, center.y + dy);
                let entry = self.proximity.entry(k).or_insert(0);
                if cost > *entry {
                    *entry = cost;
                }
            }
        }
    }

    pub fn proximity_cost(&self, c: GridPoint) -> i64 {
        self.proximity
            .get(&cell_key(c.x, c.y))
            .copied()
            .unwrap_or(0)
    }

    pub fn in_escape_zone(&self, c: GridPoint) -> bool {
        self.escape.contains(&cell_key(c.x, c.y))
    }

    fn zone_blocks(&self, c: GridPoint) -> bool {
        if self.zones.is_empty() {
            return false;
        }
        self.zones.iter().any(|z| z.contains(c)) && !self.allowed.contains(&cell_key(c.x, c.y))
    }

    pub fn is_blocked(&self, s: GridState) -> bool {
        let c = s.cell();
        if self.endpoints.contains(&s.key()) {
            return false;
        }
        if self.zone_blocks(c) {
            return true;
        }
        let masks = &self.layers[s.layer as usize];
        if self.escape.contains(&cell_key(c.x, c.y)) {
            masks.blocked_tight.contains(&cell_key(c.x, c.y))
        } else {
            masks.blocked.contains(&cell_key(c.x, c.y))
        }
    }

    /// Via clearance is never relaxed, not even in escape zones.
    pub fn is_via_blocked(&self, c: GridPoint) -> bool {
        self.via_blocked.contains(&cell_key(c.x, c.y)) || self.zone_blocks(c)
    }

    /// Checks every interpolated cell of a straight move, sampling at the
    /// Chebyshev distance so a jump cannot skip over a one-cell wall.
    pub fn is_move_blocked(&self, from: GridPoint, to: GridPoint, layer: u8) -> bool {
        let mut blocked = false;
        walk_cells(from, to, |c| {
            if self.is_blocked(GridState::new(c.x, c.y, layer)) {
                blocked = true;
            }
        });
        blocked
    }
}

/// Visits every interpolated cell from `a` to `b` inclusive; sample count is
/// the Chebyshev distance, so consecutive cells differ by at most one step
/// on each axis.
pub fn walk_cells(a: GridPoint, b: GridPoint, mut visit: impl FnMut(GridPoint)) {
    let steps = (b.x - a.x).abs().max((b.y - a.y).abs());
    if steps == 0 {
        visit(a);
        return;
    }
    for i in 0..=steps {
        let t = f64::from(i) / f64::from(steps);
        let x = (f64::from(a.x) + t * f64::from(b.x - a.x)).round() as i32;
        let y = (f64::from(a.y) + t * f64::from(b.y - a.y)).round() as i32;
        visit(GridPoint::new(x, y));
    }
}

fn stamp_disk(center: GridPoint, radius: i32, mut mark: impl FnMut(u64)) {
    if radius < 0 {
        return;
    }
    for dx in -radius..=radius {
        for dy in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                mark(cell_key(center.x + dx, center.y + dy));
            }
        }
    }
}

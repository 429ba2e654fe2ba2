use crate::algo::jps::JumpContext;
use crate::algo::state::{DIAG_COST, DIRECTIONS, ORTHO_COST, OpenEntry, octile_cost};
use crate::field::ObstacleField;
use crate::target::{GoalHit, TargetSet};
use gridtrace_common::geom::coord::{GridPoint, GridState, cell_key};
use gridtrace_common::util::config::SearchConfig;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BinaryHeap;

#[derive(Clone, Copy, Debug)]
pub struct SearchParams {
    pub via_cost: i64,
    /// Heuristic weight in fixed-point thousandths; 1000 is admissible A*.
    pub weight_milli: i64,
    pub max_iterations: u32,
    pub use_jps: bool,
    pub max_jump: u32,
    pub corridor_penalty: i64,
}

impl SearchParams {
    pub fn from_config(cfg: &SearchConfig) -> Self {
        Self {
            via_cost: cfg.via_cost,
            weight_milli: (cfg.heuristic_weight * 1000.0).round() as i64,
            max_iterations: cfg.max_iterations,
            use_jps: cfg.jps,
            max_jump: cfg.max_jump,
            corridor_penalty: cfg.corridor_penalty,
        }
    }
}

pub struct FoundPath {
    pub path: Vec<GridState>,
    pub iterations: u32,
    /// Index into the seed slice this branch descended from.
    pub source_index: usize,
    pub goal: GoalHit,
}

/// All three terminations are ordinary values; callers treat "no path" as a
/// routine outcome and decide whether to retry or give up on the net.
pub enum SearchOutcome {
    Found(FoundPath),
    Exhausted { iterations: u32 },
    BudgetExceeded { iterations: u32 },
}

impl SearchOutcome {
    pub fn iterations(&self) -> u32 {
        match self {
            SearchOutcome::Found(f) => f.iterations,
            SearchOutcome::Exhausted { iterations } => *iterations,
            SearchOutcome::BudgetExceeded { iterations } => *iterations,
        }
    }
}

/// Frontier and visited cells for a renderer between `step` calls. The
/// found-or-not flag and the best path travel in `SearchOutcome` instead.
#[derive(Clone, Debug, Default)]
pub struct SearchSnapshot {
    pub iterations: u32,
    pub open: Vec<GridState>,
    pub closed: Vec<GridState>,
}

/// Octilinear multi-layer A* over an obstacle field. Pop the cheapest open
/// state, discard stale duplicates, close it, test the goal, relax its
/// neighbors; via moves change layer in place. An optional corridor set
/// penalizes cells outside a coarse-pass guide.
pub struct Search<'a> {
    field: &'a ObstacleField,
    targets: &'a TargetSet,
    params: SearchParams,
    corridor: Option<&'a FxHashSet<u64>>,
    open: BinaryHeap<OpenEntry>,
    g_score: FxHashMap<u64, i64>,
    came_from: FxHashMap<u64, u64>,
    closed: FxHashSet<u64>,
    seeds: FxHashMap<u64, usize>,
    counter: u64,
    iterations: u32,
}

impl<'a> Search<'a> {
    pub fn new(
        field: &'a ObstacleField,
        targets: &'a TargetSet,
        sources: &[GridState],
        params: SearchParams,
        corridor: Option<&'a FxHashSet<u64>>,
    ) -> Self {
        let mut search = Self {
            field,
            targets,
            params,
            corridor,
            open: BinaryHeap::new(),
            g_score: FxHashMap::default(),
            came_from: FxHashMap::default(),
            closed: FxHashSet::default(),
            seeds: FxHashMap::default(),
            counter: 0,
            iterations: 0,
        };
        for (i, &s) in sources.iter().enumerate() {
            let key = s.key();
            if search.seeds.contains_key(&key) {
                continue;
            }
            search.seeds.insert(key, i);
            search.g_score.insert(key, 0);
            let h = search.targets.heuristic(s);
            search.open.push(OpenEntry {
                f_score: h * search.params.weight_milli / 1000,
                counter: search.counter,
                key,
            });
            search.counter += 1;
        }
        search
    }

    /// Runs up to `batch` iterations. `None` means still searching; callers
    /// may render or report progress between calls.
    pub fn step(&mut self, batch: u32) -> Option<SearchOutcome> {
        for _ in 0..batch {
            if self.iterations >= self.params.max_iterations {
                return Some(SearchOutcome::BudgetExceeded {
                    iterations: self.iterations,
                });
            }
            let Some(entry) = self.open.pop() else {
                return Some(SearchOutcome::Exhausted {
                    iterations: self.iterations,
                });
            };
            self.iterations += 1;
            if !self.closed.insert(entry.key) {
                continue;
            }
            let state = GridState::from_key(entry.key);
            if let Some(goal) = self.targets.hit(state) {
                return Some(SearchOutcome::Found(self.reconstruct(state, goal)));
            }
            self.expand(state, entry.key);
        }
        None
    }

    pub fn run(mut self) -> SearchOutcome {
        loop {
            if let Some(outcome) = self.step(1024) {
                return outcome;
            }
        }
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            iterations: self.iterations,
            // Stale duplicates (already closed) are not part of the frontier.
            open: self
                .open
                .iter()
                .filter(|e| !self.closed.contains(&e.key))
                .map(|e| GridState::from_key(e.key))
                .collect(),
            closed: self.closed.iter().map(|&k| GridState::from_key(k)).collect(),
        }
    }

    fn expand(&mut self, state: GridState, key: u64) {
        let cell = state.cell();
        let g = self.g_score[&key];

        // Inside escape zones every single-step neighbor matters, so jumps
        // are suppressed there.
        let jps_here = self.params.use_jps && !self.field.in_escape_zone(cell);

        for &dir in &DIRECTIONS {
            if jps_here {
                let ctx = JumpContext {
                    field: self.field,
                    targets: self.targets,
                    max_jump: self.params.max_jump,
                    corridor: self.corridor,
                };
                if let Some(to) = ctx.jump(cell, dir, state.layer) {
                    let to_state = GridState::new(to.x, to.y, state.layer);
                    let tentative = g + octile_cost(cell, to) + self.cell_costs(to);
                    self.relax(key, to_state, tentative);
                }
            } else {
                let to = GridPoint::new(cell.x + dir.0, cell.y + dir.1);
                let to_state = GridState::new(to.x, to.y, state.layer);
                if self.field.is_blocked(to_state) {
                    continue;
                }
                let move_cost = if dir.0 != 0 && dir.1 != 0 {
                    DIAG_COST
                } else {
                    ORTHO_COST
                };
                self.relax(key, to_state, g + move_cost + self.cell_costs(to));
            }
        }

        if self.field.num_layers() > 1 && !self.field.is_via_blocked(cell) {
            for layer in 0..self.field.num_layers() as u8 {
                if layer == state.layer {
                    continue;
                }
                let to_state = GridState::new(cell.x, cell.y, layer);
                if self.field.is_blocked(to_state) {
                    continue;
                }
                let tentative = g + self.params.via_cost + self.cell_costs(cell);
                self.relax(key, to_state, tentative);
            }
        }
    }

    #[inline(always)]
    fn cell_costs(&self, c: GridPoint) -> i64 {
        let mut cost = self.field.proximity_cost(c);
        if let Some(set) = self.corridor {
            if !set.contains(&cell_key(c.x, c.y)) {
                cost += self.params.corridor_penalty;
            }
        }
        cost
    }

    fn relax(&mut self, from_key: u64, to_state: GridState, tentative: i64) {
        let to_key = to_state.key();
        if self.closed.contains(&to_key) {
            return;
        }
        let improved = match self.g_score.get(&to_key) {
            Some(&old) => tentative < old,
            None => true,
        };
        if !improved {
            return;
        }
        self.g_score.insert(to_key, tentative);
        self.came_from.insert(to_key, from_key);
        let h = self.targets.heuristic(to_state);
        self.open.push(OpenEntry {
            f_score: tentative + h * self.params.weight_milli / 1000,
            counter: self.counter,
            key: to_key,
        });
        self.counter += 1;
    }

    fn reconstruct(&self, goal_state: GridState, goal: GoalHit) -> FoundPath {
        let mut rev = vec![goal_state];
        let mut key = goal_state.key();
        while let Some(&prev) = self.came_from.get(&key) {
            key = prev;
            rev.push(GridState::from_key(key));
        }
        rev.reverse();
        let source_index = match self.seeds.get(&rev[0].key()) {
            Some(&i) => i,
            None => {
                debug_assert!(false, "reconstructed path does not start at a seed");
                0
            }
        };
        FoundPath {
            path: rev,
            iterations: self.iterations,
            source_index,
            goal,
        }
    }
}

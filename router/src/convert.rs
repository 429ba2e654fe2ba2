use gridtrace_common::geom::coord::{GridPoint, GridState};
use gridtrace_common::geom::point::Point;

/// Maps between board millimeters and grid cells. The grid is uniform and
/// unbounded; cells are addressed by signed indices so boards need not sit
/// in the positive quadrant.
#[derive(Clone, Copy, Debug)]
pub struct GridConverter {
    pitch: f64,
}

impl GridConverter {
    pub fn new(pitch: f64) -> Self {
        Self { pitch }
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    /// Coarser converter covering `multiplier` fine cells per coarse cell.
    pub fn coarsened(&self, multiplier: u32) -> Self {
        Self {
            pitch: self.pitch * f64::from(multiplier),
        }
    }

    pub fn to_grid(&self, p: Point<f64>) -> GridPoint {
        GridPoint::new(
            (p.x / self.pitch).round() as i32,
            (p.y / self.pitch).round() as i32,
        )
    }

    pub fn to_state(&self, p: Point<f64>, layer: u8) -> GridState {
        let g = self.to_grid(p);
        GridState::new(g.x, g.y, layer)
    }

    pub fn to_float(&self, g: GridPoint) -> Point<f64> {
        Point::new(f64::from(g.x) * self.pitch, f64::from(g.y) * self.pitch)
    }

    pub fn state_to_float(&self, s: GridState) -> Point<f64> {
        self.to_float(s.cell())
    }

    /// Clearances shrink to zero cells only for non-positive inputs; any
    /// real distance covers at least one cell.
    pub fn to_grid_distance(&self, d: f64) -> i32 {
        if d <= 0.0 {
            return 0;
        }
        ((d / self.pitch).ceil() as i32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_stays_within_half_pitch() {
        let conv = GridConverter::new(0.1);
        let p = Point::new(3.27, -1.493);
        let back = conv.to_float(conv.to_grid(p));
        assert!((back.x - p.x).abs() <= 0.05 + 1e-9);
        assert!((back.y - p.y).abs() <= 0.05 + 1e-9);
    }

    #[test]
    fn negative_coordinates_map_to_negative_cells() {
        let conv = GridConverter::new(0.1);
        let g = conv.to_grid(Point::new(-0.26, -0.24));
        assert_eq!(g.x, -3);
        assert_eq!(g.y, -2);
    }

    #[test]
    fn distance_is_at_least_one_cell() {
        let conv = GridConverter::new(0.1);
        assert_eq!(conv.to_grid_distance(0.001), 1);
        assert_eq!(conv.to_grid_distance(0.0), 0);
        assert_eq!(conv.to_grid_distance(0.25), 3);
        assert_eq!(conv.to_grid_distance(-1.0), 0);
    }

    #[test]
    fn coarsened_pitch_scales_distances() {
        let conv = GridConverter::new(0.1).coarsened(4);
        assert_eq!(conv.to_grid_distance(0.5), 2);
        assert_eq!(conv.to_grid(Point::new(0.81, 0.0)).x, 2);
    }
}

use super::point::Point;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point<f64>,
    pub max: Point<f64>,
}

impl Rect {
    pub fn new(min: Point<f64>, max: Point<f64>) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Point<f64>, width: f64, height: f64) -> Self {
        Self {
            min: Point::new(center.x - width / 2.0, center.y - height / 2.0),
            max: Point::new(center.x + width / 2.0, center.y + height / 2.0),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
    pub fn center(&self) -> Point<f64> {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    /// Grow every side by `margin` (clearance inflation for keepouts and pads).
    pub fn expand(&self, margin: f64) -> Rect {
        Rect {
            min: Point::new(self.min.x - margin, self.min.y - margin),
            max: Point::new(self.max.x + margin, self.max.y + margin),
        }
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    pub fn contains(&self, p: Point<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Shortest distance from `p` to this rectangle, zero when inside.
    pub fn distance_to(&self, p: Point<f64>) -> f64 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        (dx * dx + dy * dy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_grows_all_sides() {
        let r = Rect::new(Point::new(1.0, 2.0), Point::new(3.0, 4.0));
        let e = r.expand(0.5);
        assert_eq!(e.min.x, 0.5);
        assert_eq!(e.min.y, 1.5);
        assert_eq!(e.max.x, 3.5);
        assert_eq!(e.max.y, 4.5);
    }

    #[test]
    fn distance_to_is_zero_inside() {
        let r = Rect::new(Point::new(0.0, 0.0), Point::new(2.0, 2.0));
        assert_eq!(r.distance_to(Point::new(1.0, 1.0)), 0.0);
        assert!((r.distance_to(Point::new(5.0, 1.0)) - 3.0).abs() < 1e-9);
    }
}

use super::point::Point;
use super::rect::Rect;
use rstar::{AABB, RTree};

/// R-tree over id-tagged rectangles. Used for endpoint snapping and for
/// pruning candidate pairs in the design-rule check.
pub struct SpatialIndex {
    tree: RTree<IndexedRect>,
}

struct IndexedRect {
    rect: Rect,
    id: usize,
}

impl rstar::RTreeObject for IndexedRect {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.rect.min.x, self.rect.min.y],
            [self.rect.max.x, self.rect.max.y],
        )
    }
}

impl rstar::PointDistance for IndexedRect {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = self.rect.distance_to(Point::new(point[0], point[1]));
        d * d
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn insert(&mut self, rect: Rect, id: usize) {
        self.tree.insert(IndexedRect { rect, id });
    }

    pub fn query(&self, rect: Rect) -> Vec<usize> {
        let aabb = AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y]);
        self.tree
            .locate_in_envelope_intersecting(&aabb)
            .map(|item| item.id)
            .collect()
    }

    /// Closest entry to `p`, with its distance, or None when the index is empty.
    pub fn nearest(&self, p: Point<f64>) -> Option<(usize, f64)> {
        self.tree
            .nearest_neighbor(&[p.x, p.y])
            .map(|item| (item.id, item.rect.distance_to(p)))
    }
}

use crate::convert::GridConverter;
use crate::field::{Expansion, GridRect, ObstacleField};
use gridtrace_common::board::indices::NetId;
use gridtrace_common::board::model::BoardModel;
use gridtrace_common::board::stubs;
use gridtrace_common::geom::point::Point;
use gridtrace_common::util::config::Config;

/// Copper features collapse to two kinds for rasterization; one match arm
/// each keeps the marking loop branch-predictable.
enum Obstacle {
    Segment {
        a: Point<f64>,
        b: Point<f64>,
        layer: u8,
        half_width: f64,
    },
    Disk {
        center: Point<f64>,
        layer: u8,
        radius: f64,
    },
}

pub struct FieldBuilder<'a> {
    board: &'a BoardModel,
    conv: GridConverter,
    config: &'a Config,
}

impl<'a> FieldBuilder<'a> {
    pub fn new(board: &'a BoardModel, conv: GridConverter, config: &'a Config) -> Self {
        Self {
            board,
            conv,
            config,
        }
    }

    /// Base field for routing the nets in `exclude`: all other copper is a
    /// hard obstacle, keepouts become zones, and every net still waiting in
    /// `unrouted` contributes a soft repulsion disk at each of its stub
    /// group centroids.
    pub fn base(&self, exclude: &[NetId], unrouted: &[NetId]) -> ObstacleField {
        self.base_with_margin(0.0, exclude, unrouted)
    }

    /// Same as `base` but with every obstacle grown by `margin` mm. The
    /// differential-pair centerline search uses this so both lanes of the
    /// pair fit beside the centerline.
    pub fn base_with_margin(
        &self,
        margin: f64,
        exclude: &[NetId],
        unrouted: &[NetId],
    ) -> ObstacleField {
        let mut field = ObstacleField::new(self.board.num_layers() as usize);

        for ob in self.collect_obstacles(exclude) {
            match ob {
                Obstacle::Segment {
                    a,
                    b,
                    layer,
                    half_width,
                } => field.mark_segment_blocked(
                    self.conv.to_grid(a),
                    self.conv.to_grid(b),
                    layer,
                    self.expansion(half_width + margin),
                ),
                Obstacle::Disk {
                    center,
                    layer,
                    radius,
                } => field.mark_circle_blocked(
                    self.conv.to_grid(center),
                    layer,
                    self.expansion(radius + margin),
                ),
            }
        }

        for k in &self.board.keepouts {
            let min = self.conv.to_grid(k.rect.min);
            let max = self.conv.to_grid(k.rect.max);
            field.add_zone(GridRect::new(min.x, min.y, max.x, max.y));
        }

        let radius = self
            .conv
            .to_grid_distance(self.config.search.proximity_radius);
        for &net in unrouted {
            if exclude.contains(&net) {
                continue;
            }
            for group in stubs::stub_groups(self.board, net) {
                field.add_proximity_disk(
                    self.conv.to_grid(group.centroid),
                    radius,
                    self.config.search.proximity_cost,
                );
            }
        }

        field
    }

    fn collect_obstacles(&self, exclude: &[NetId]) -> Vec<Obstacle> {
        let mut obstacles = Vec::new();
        let blocked_net = |net: Option<NetId>| match net {
            Some(id) => !exclude.contains(&id),
            // Copper without a net keeps everyone away.
            None => true,
        };

        for t in &self.board.tracks {
            if blocked_net(Some(t.net)) {
                obstacles.push(Obstacle::Segment {
                    a: t.start,
                    b: t.end,
                    layer: t.layer,
                    half_width: t.width / 2.0,
                });
            }
        }
        for v in &self.board.vias {
            if blocked_net(Some(v.net)) {
                for layer in 0..self.board.num_layers() {
                    obstacles.push(Obstacle::Disk {
                        center: v.pos,
                        layer,
                        radius: v.diameter / 2.0,
                    });
                }
            }
        }
        for p in &self.board.pads {
            if blocked_net(p.net) {
                for &layer in &p.layers {
                    obstacles.push(Obstacle::Disk {
                        center: p.pos,
                        layer,
                        radius: p.half_extent(),
                    });
                }
            }
        }
        obstacles
    }

    /// Expansion radii from an obstacle's own half-extent: the routed track
    /// centerline must stay (obstacle half + gap + new track half) away, a
    /// via drill needs the larger via gap plus its own annular radius.
    fn expansion(&self, obstacle_half: f64) -> Expansion {
        let rules = &self.config.rules;
        let route_half = rules.track_width / 2.0;
        let via_half = rules.via_diameter / 2.0;
        Expansion {
            track: self
                .conv
                .to_grid_distance(obstacle_half + rules.clearance + route_half),
            tight: self
                .conv
                .to_grid_distance(obstacle_half + rules.escape_clearance + route_half),
            via: self
                .conv
                .to_grid_distance(obstacle_half + rules.via_clearance + via_half),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridtrace_common::board::model::PadShape;
    use gridtrace_common::geom::coord::{GridPoint, GridState};
    use gridtrace_common::geom::rect::Rect;

    fn two_net_board() -> BoardModel {
        let mut board = BoardModel::new();
        board.add_layer("F.Cu");
        board.add_layer("B.Cu");
        let a = board.add_net("A");
        let b = board.add_net("B");
        board.add_track(a, 0, Point::new(0.0, 1.0), Point::new(5.0, 1.0), 0.25);
        board.add_via(b, Point::new(2.0, 3.0), 0.6, 0.3);
        board
    }

    #[test]
    fn own_net_copper_is_not_an_obstacle() {
        let board = two_net_board();
        let config = Config::default();
        let conv = GridConverter::new(config.grid.pitch);
        let builder = FieldBuilder::new(&board, conv, &config);

        let a = board.net_id("A").unwrap();
        let field = builder.base(&[a], &[]);
        // A's own track does not block it, B's via does, on both layers.
        assert!(!field.is_blocked(GridState::new(10, 10, 0)));
        assert!(field.is_blocked(GridState::new(20, 30, 0)));
        assert!(field.is_blocked(GridState::new(20, 30, 1)));
    }

    #[test]
    fn margin_grows_the_blocked_region() {
        let board = two_net_board();
        let config = Config::default();
        let conv = GridConverter::new(config.grid.pitch);
        let builder = FieldBuilder::new(&board, conv, &config);
        let b = board.net_id("B").unwrap();

        let plain = builder.base(&[b], &[]);
        let fat = builder.base_with_margin(0.5, &[b], &[]);
        // Just outside the plain expansion of A's track at y=1.0.
        let probe = GridState::new(10, 10 + plain_radius(&config, &conv, 0.125) + 1, 0);
        assert!(!plain.is_blocked(probe));
        assert!(fat.is_blocked(probe));
    }

    fn plain_radius(config: &Config, conv: &GridConverter, half_width: f64) -> i32 {
        conv.to_grid_distance(half_width + config.rules.clearance + config.rules.track_width / 2.0)
    }

    #[test]
    fn keepouts_become_zones_and_unrouted_nets_repel() {
        let mut board = two_net_board();
        board.add_keepout(Rect::new(Point::new(8.0, 8.0), Point::new(9.0, 9.0)));
        let config = Config::default();
        let conv = GridConverter::new(config.grid.pitch);
        let builder = FieldBuilder::new(&board, conv, &config);

        let a = board.net_id("A").unwrap();
        let b = board.net_id("B").unwrap();
        let field = builder.base(&[a], &[b]);
        assert!(field.is_blocked(GridState::new(85, 85, 1)));
        // B's via centroid repels without blocking.
        assert!(field.proximity_cost(GridPoint::new(20, 32)) > 0);
    }

    #[test]
    fn netless_pad_blocks_everyone() {
        let mut board = two_net_board();
        board.add_pad(
            None,
            Point::new(4.0, 4.0),
            PadShape::Circle,
            Point::new(1.0, 1.0),
            vec![0],
        );
        let config = Config::default();
        let conv = GridConverter::new(config.grid.pitch);
        let builder = FieldBuilder::new(&board, conv, &config);

        let a = board.net_id("A").unwrap();
        let field = builder.base(&[a], &[]);
        assert!(field.is_blocked(GridState::new(40, 40, 0)));
        assert!(!field.is_blocked(GridState::new(40, 40, 1)));
    }
}

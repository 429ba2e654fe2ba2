use crate::board::model::{BoardModel, PadShape};
use crate::geom::point::Point;
use crate::geom::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EDGE_MARGIN: f64 = 2.0;
const ROW_SPACING: f64 = 1.5;
const PAIR_GAP: f64 = 0.6;
const PAD_DIAMETER: f64 = 0.8;

/// Builds a synthetic two-layer board: single-ended nets spanning left to
/// right with shuffled endpoints (so orderings matter), a block of
/// differential pairs, and a few keepouts in the middle of the channel.
/// Seeded so repeated runs produce the same board.
pub fn generate_random_board(
    num_nets: usize,
    num_pairs: usize,
    num_keepouts: usize,
    seed: u64,
) -> BoardModel {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut board = BoardModel::new();
    board.add_layer("F.Cu");
    board.add_layer("B.Cu");

    let rows = num_nets + num_pairs;
    let height = ROW_SPACING * rows.max(4) as f64 + 2.0 * EDGE_MARGIN;
    let width = (height * 1.5).max(20.0);

    log::info!(
        "Generating board: {} nets, {} pairs, {} keepouts, {:.1}x{:.1} mm",
        num_nets,
        num_pairs,
        num_keepouts,
        width,
        height
    );

    // Shuffled right-side rows force crossings between nets.
    let mut right_rows: Vec<usize> = (0..rows).collect();
    for i in (1..right_rows.len()).rev() {
        let j = rng.gen_range(0..=i);
        right_rows.swap(i, j);
    }

    let row_y = |row: usize| EDGE_MARGIN + ROW_SPACING * row as f64;
    let mut next_row = 0;

    for i in 0..num_nets {
        let net = board.add_net(&format!("N{}", i));
        let left = row_y(next_row);
        let right = row_y(right_rows[next_row]);
        next_row += 1;

        // Odd nets land on the bottom layer so the route needs a via.
        let target_layer = if i % 2 == 1 { 1 } else { 0 };
        board.add_pad(
            Some(net),
            Point::new(EDGE_MARGIN, left),
            PadShape::Circle,
            Point::new(PAD_DIAMETER, PAD_DIAMETER),
            vec![0],
        );
        board.add_pad(
            Some(net),
            Point::new(width - EDGE_MARGIN, right),
            PadShape::Circle,
            Point::new(PAD_DIAMETER, PAD_DIAMETER),
            vec![target_layer],
        );
    }

    for i in 0..num_pairs {
        let p = board.add_net(&format!("P{}_P", i));
        let n = board.add_net(&format!("P{}_N", i));
        let left = row_y(next_row);
        let right = row_y(right_rows[next_row]);
        next_row += 1;

        for (net, offset) in [(p, PAIR_GAP / 2.0), (n, -PAIR_GAP / 2.0)] {
            board.add_pad(
                Some(net),
                Point::new(EDGE_MARGIN, left + offset),
                PadShape::Circle,
                Point::new(PAD_DIAMETER, PAD_DIAMETER),
                vec![0],
            );
            board.add_pad(
                Some(net),
                Point::new(width - EDGE_MARGIN, right + offset),
                PadShape::Circle,
                Point::new(PAD_DIAMETER, PAD_DIAMETER),
                vec![0],
            );
        }
    }

    for _ in 0..num_keepouts {
        let kw = rng.gen_range(1.0..3.0);
        let kh = rng.gen_range(1.0..3.0);
        let cx = rng.gen_range(width * 0.3..width * 0.7);
        let cy = rng.gen_range(EDGE_MARGIN..height - EDGE_MARGIN);
        board.add_keepout(Rect::from_center(Point::new(cx, cy), kw, kh));
    }

    board
}

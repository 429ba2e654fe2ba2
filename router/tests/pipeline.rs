//! End-to-end routing through the public crate surface: board in, routed
//! copper out, design rules verified on the result.

use gridtrace_common::board::model::{BoardModel, PadShape};
use gridtrace_common::board::stubs;
use gridtrace_common::geom::point::Point;
use gridtrace_common::geom::rect::Rect;
use gridtrace_common::util::check;
use gridtrace_common::util::config::Config;
use gridtrace_router::report::SilentSink;
use gridtrace_router::route_board;

fn two_layer_board() -> BoardModel {
    let mut board = BoardModel::new();
    board.add_layer("F.Cu");
    board.add_layer("B.Cu");
    board
}

fn add_pad_pair(board: &mut BoardModel, net: gridtrace_common::board::indices::NetId, y: f64) {
    for x in [1.0, 9.0] {
        board.add_pad(
            Some(net),
            Point::new(x, y),
            PadShape::Circle,
            Point::new(0.6, 0.6),
            vec![0],
        );
    }
}

#[test]
fn keepout_board_routes_around_and_passes_checks() {
    let mut board = two_layer_board();
    let nets: Vec<_> = (0..3)
        .map(|i| board.add_net(&format!("SIG{i}")))
        .collect();
    for (i, &net) in nets.iter().enumerate() {
        add_pad_pair(&mut board, net, 1.0 + i as f64 * 1.5);
    }
    // Keepout slab blocking the lower spans on every layer; the two bottom
    // nets have to climb over its top edge.
    board.add_keepout(Rect::new(Point::new(4.5, -50.0), Point::new(5.5, 3.0)));

    let config = Config::default();
    let report = route_board(&mut board, &config, &mut SilentSink).unwrap();

    assert_eq!(report.routed(), 3);
    assert_eq!(report.failed(), 0);
    for &net in &nets {
        assert_eq!(stubs::stub_groups(&board, net).len(), 1);
    }
    let detoured = board
        .tracks
        .iter()
        .filter(|t| t.net == nets[0])
        .any(|t| t.start.y > 3.0 || t.end.y > 3.0);
    assert!(detoured, "bottom net should clear the keepout's top edge");
    assert!(check::run(&board, &config.rules).is_ok());
}

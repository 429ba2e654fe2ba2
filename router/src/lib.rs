pub mod algo;
pub mod batch;
pub mod convert;
pub mod diffpair;
pub mod field;
pub mod ordering;
pub mod postprocess;
pub mod report;
pub mod target;

use gridtrace_common::util::config::ConfigError;
use thiserror::Error;

pub use batch::route_board;

/// Broken invariants only. An unroutable net is a reported outcome, not an
/// error; these mean the router itself produced something inconsistent.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("path crosses an obstacle at ({x}, {y}) on layer {layer}")]
    PathCrossesObstacle { x: i32, y: i32, layer: u8 },

    #[error("via at ({x}, {y}) changes position together with layer")]
    ViaMovesLaterally { x: i32, y: i32 },

    #[error("via at ({x}, {y}) lands on a blocked cell")]
    ViaOnBlockedCell { x: i32, y: i32 },

    #[error("pair lanes diverged to {actual:.4}mm at waypoint {index} (want {expected:.4}mm)")]
    PairSpacingViolated {
        index: usize,
        actual: f64,
        expected: f64,
    },

    #[error("pair lanes have mismatched shapes ({p_len} vs {n_len} waypoints)")]
    PairLaneMismatch { p_len: usize, n_len: usize },
}

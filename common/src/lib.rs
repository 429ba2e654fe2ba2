pub mod board;
pub mod geom;
pub mod util;

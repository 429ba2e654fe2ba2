pub mod astar;
pub mod jps;
pub mod state;

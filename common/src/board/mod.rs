pub mod indices;
pub mod model;
pub mod stubs;

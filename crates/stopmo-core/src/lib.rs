pub mod enhance;
pub mod extract;
pub mod pipeline;
pub mod sequence;
pub mod timing;
pub mod video;

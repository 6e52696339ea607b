pub mod background;
pub mod block_matcher;
pub mod color;
pub mod contour_finder;
pub mod difference;
pub mod downscale;
pub mod flow_field;
pub mod frame_arena;
pub mod osc;
pub mod utils;

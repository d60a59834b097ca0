pub mod app;
pub mod config;
pub mod prediction;
pub mod render;
pub mod upload;
pub mod view;

pub use app::start_app;
pub use prediction::SegmentationClient;

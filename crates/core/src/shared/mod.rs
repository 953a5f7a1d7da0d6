pub mod bounding_box;
pub mod constants;
pub mod frame;
pub mod sample_buffer;
pub mod video_metadata;

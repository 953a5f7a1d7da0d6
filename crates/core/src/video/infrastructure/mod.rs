pub mod ffmpeg_frame_source;
pub mod image_io;

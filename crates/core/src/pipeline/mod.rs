pub mod detector_session;
pub mod fps_counter;
pub mod live_frame_processor;

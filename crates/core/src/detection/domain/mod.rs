pub mod detection_result;
pub mod detector_error;
pub mod model_file_error;
pub mod nms;
pub mod object_detector;

pub mod darknet_config;
pub mod inference_backend;
pub mod letterbox;
pub mod model_resolver;
pub mod ort_backend;
pub mod yolo_detector;
pub mod yolo_output;

pub mod model_import;
pub mod model_store;
pub mod yolo_model;

use crate::shared::bounding_box::Size;

/// Minimum detection score reported by default.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// IoU above which overlapping boxes of the same class are suppressed.
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

/// Network input size when neither the config nor the model declares one.
pub const DEFAULT_INPUT_SIZE: Size = Size::new(416, 416);

pub const BUILT_IN_MODEL_NAME: &str = "yolov4-tiny-coco";
pub const BUILT_IN_MODEL_ID: &str = "00000000-0000-0000-0000-000000000000";
pub const BUILT_IN_CLASS_COUNT: usize = 80;

pub const BUILT_IN_WEIGHTS_FILE: &str = "yolov4-tiny.onnx";
pub const BUILT_IN_CONFIG_FILE: &str = "yolov4-tiny.cfg";
pub const BUILT_IN_NAMES_FILE: &str = "coco.names";

pub const BUILT_IN_CONFIG_URL: &str =
    "https://raw.githubusercontent.com/AlexeyAB/darknet/master/cfg/yolov4-tiny.cfg";
pub const BUILT_IN_NAMES_URL: &str =
    "https://raw.githubusercontent.com/AlexeyAB/darknet/master/data/coco.names";

/// Legacy id the built-in model was stored under before it had a UUID.
pub const LEGACY_BUILT_IN_ID: &str = "yolov4-tiny-coco";

/// Display name when no model could be loaded.
pub const NO_MODEL_NAME: &str = "No Model";

pub const APP_DIR_NAME: &str = "YoloDetector";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

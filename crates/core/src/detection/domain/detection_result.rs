use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::BoundingBox;

/// One detected object, in the coordinate space of the image it was found in.
///
/// Fields are fixed at construction; detectors create a fresh set per call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    class_id: usize,
    class_name: String,
    confidence: f32,
    bounding_box: BoundingBox,
}

impl DetectionResult {
    pub fn new(
        class_id: usize,
        class_name: impl Into<String>,
        confidence: f32,
        bounding_box: BoundingBox,
    ) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
            confidence,
            bounding_box,
        }
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    /// Confidence formatted for labels, e.g. `"87.5%"`.
    pub fn confidence_percentage(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }

    /// `"<class> <percentage>"`, the text drawn above a box.
    pub fn label(&self) -> String {
        format!("{} {}", self.class_name, self.confidence_percentage())
    }
}

/// Rolling numbers reported alongside live detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DetectionStats {
    /// Frames actually run through the detector during the last window.
    pub fps: f64,
    pub inference_time_ms: f64,
    pub detection_count: usize,
    /// Frames offered during the last window, dropped ones included.
    pub submitted_frames: usize,
}

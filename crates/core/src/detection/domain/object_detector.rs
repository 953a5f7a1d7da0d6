use std::time::Duration;

use image::RgbImage;

use crate::shared::bounding_box::Size;
use crate::shared::sample_buffer::SampleBuffer;

use super::detection_result::DetectionResult;
use super::detector_error::DetectorError;

/// Domain interface for single-shot object detection.
///
/// Both entry points record the latency of the call and keep a copy of the
/// network input for inspection, hence `&mut self`.
pub trait ObjectDetector: Send {
    /// Detects objects in a live video frame.
    fn detect_sample_buffer(
        &mut self,
        buffer: &SampleBuffer,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectionResult>, DetectorError>;

    /// Detects objects in a decoded still image.
    fn detect_image(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectionResult>, DetectorError>;

    /// Wall time of the most recent detection call; zero before the first.
    fn last_inference_time(&self) -> Duration;

    /// Spatial size the network expects.
    fn input_size(&self) -> Size;

    /// Letterboxed network input from the most recent call.
    fn last_preprocessed_image(&self) -> Option<&RgbImage>;
}

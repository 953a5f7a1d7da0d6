use std::time::Duration;

use image::RgbImage;
use uuid::Uuid;

use crate::config::settings::Settings;
use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::detector_error::DetectorError;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::detection::infrastructure::yolo_detector::YoloDetector;
use crate::models::model_store::{canonical_model_id, ModelStore, ModelStoreError};
use crate::models::yolo_model::YoloModel;
use crate::shared::bounding_box::Size;
use crate::shared::constants::{DEFAULT_INPUT_SIZE, NO_MODEL_NAME};
use crate::shared::sample_buffer::SampleBuffer;

/// The detector an application currently works with, if any.
///
/// Detection calls on an empty session succeed with no results so callers
/// can keep feeding frames while a model is being swapped.
pub struct DetectorSession {
    detector: Option<Box<dyn ObjectDetector>>,
    current_model: Option<YoloModel>,
    portrait_frames: bool,
}

impl Default for DetectorSession {
    fn default() -> Self {
        Self {
            detector: None,
            current_model: None,
            portrait_frames: true,
        }
    }
}

impl DetectorSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detector(detector: Box<dyn ObjectDetector>, model: YoloModel) -> Self {
        Self {
            detector: Some(detector),
            current_model: Some(model),
            ..Self::default()
        }
    }

    /// Whether detectors loaded from now on turn landscape buffers upright.
    pub fn with_portrait_frames(mut self, enabled: bool) -> Self {
        self.portrait_frames = enabled;
        self
    }

    pub fn portrait_frames(&self) -> bool {
        self.portrait_frames
    }

    /// Size of the frame that results from `buffer` refer to.
    pub fn frame_size(&self, buffer: &SampleBuffer) -> Size {
        if self.portrait_frames {
            buffer.portrait_size()
        } else {
            buffer.display_size()
        }
    }

    /// Loads the model named by `settings.selected_model_id`.
    ///
    /// Unknown ids fall back to the built-in model and the settings are
    /// updated to match. Returns whether a detector ended up loaded.
    pub fn load_selected(&mut self, store: &ModelStore, settings: &mut Settings) -> bool {
        settings.selected_model_id = canonical_model_id(&settings.selected_model_id);

        let selected = Uuid::parse_str(&settings.selected_model_id)
            .ok()
            .and_then(|id| store.find(&id));
        let model = match selected {
            Some(model) => model,
            None => {
                log::warn!(
                    "Model {} not found, using built-in model",
                    settings.selected_model_id
                );
                let built_in = store
                    .load_models()
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| YoloModel::built_in(Vec::new()));
                settings.selected_model_id = built_in.id.to_string();
                built_in
            }
        };

        self.load(store, model)
    }

    /// Swaps in `model`, dropping whatever was loaded before.
    pub fn load(&mut self, store: &ModelStore, model: YoloModel) -> bool {
        self.detector = None;
        match open_detector(store, &model, self.portrait_frames) {
            Ok(detector) => {
                log::info!("Model {} ready", model.display_name());
                self.detector = Some(Box::new(detector));
                self.current_model = Some(model);
                true
            }
            Err(e) => {
                log::error!("Failed to load model {}: {e}", model.display_name());
                self.current_model = None;
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.is_some()
    }

    pub fn current_model(&self) -> Option<&YoloModel> {
        self.current_model.as_ref()
    }

    pub fn current_model_name(&self) -> String {
        match (&self.detector, &self.current_model) {
            (Some(_), Some(model)) => model.display_name().to_string(),
            _ => NO_MODEL_NAME.to_string(),
        }
    }

    pub fn detect_sample_buffer(
        &mut self,
        buffer: &SampleBuffer,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectionResult>, DetectorError> {
        match self.detector.as_mut() {
            Some(d) => d.detect_sample_buffer(buffer, confidence_threshold, nms_threshold),
            None => Ok(Vec::new()),
        }
    }

    pub fn detect_image(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectionResult>, DetectorError> {
        match self.detector.as_mut() {
            Some(d) => d.detect_image(image, confidence_threshold, nms_threshold),
            None => Ok(Vec::new()),
        }
    }

    pub fn last_inference_time(&self) -> Duration {
        self.detector
            .as_ref()
            .map_or(Duration::ZERO, |d| d.last_inference_time())
    }

    pub fn input_size(&self) -> Size {
        self.detector
            .as_ref()
            .map_or(DEFAULT_INPUT_SIZE, |d| d.input_size())
    }

    pub fn last_preprocessed_image(&self) -> Option<&RgbImage> {
        self.detector.as_ref()?.last_preprocessed_image()
    }
}

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error(transparent)]
    Store(#[from] ModelStoreError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

fn open_detector(
    store: &ModelStore,
    model: &YoloModel,
    portrait_frames: bool,
) -> Result<YoloDetector, LoadError> {
    let paths = store.model_paths(model)?;
    let detector = YoloDetector::open(&paths.weights, &paths.config, &paths.names)?;
    Ok(detector.with_portrait_frames(portrait_frames))
}

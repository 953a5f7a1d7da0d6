/// YOLOv4 object detector: the entry point applications hold on to.
///
/// Loads a model/config/names triple, then runs letterbox preprocessing,
/// the network forward pass, output decoding, and per-class NMS for each
/// frame or image it is handed.
use std::path::Path;
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::detector_error::{check_threshold, DetectorError};
use crate::detection::domain::model_file_error::ModelFileError;
use crate::detection::domain::nms::non_max_suppression;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::bounding_box::Size;
use crate::shared::constants::DEFAULT_INPUT_SIZE;
use crate::shared::frame::Frame;
use crate::shared::sample_buffer::SampleBuffer;

use super::darknet_config::{check_input_size, parse_config, parse_names};
use super::inference_backend::InferenceBackend;
use super::letterbox::letterbox;
use super::ort_backend::OrtBackend;
use super::yolo_output;

pub struct YoloDetector {
    backend: Box<dyn InferenceBackend>,
    class_names: Vec<String>,
    input_size: Size,
    portrait_frames: bool,
    frames_seen: usize,
    last_inference_time: Duration,
    last_preprocessed_image: Option<RgbImage>,
}

impl YoloDetector {
    /// Loads an ONNX model plus its Darknet `.cfg` and `.names` files.
    ///
    /// The input size comes from the config's `[net]` section, then from the
    /// model's declared input shape, then [`DEFAULT_INPUT_SIZE`].
    pub fn open(
        model_path: &Path,
        config_path: &Path,
        names_path: &Path,
    ) -> Result<Self, DetectorError> {
        require_file("model", model_path)?;
        let config_text = read_text("config", config_path)?;
        let names_text = read_text("names", names_path)?;

        let class_names = parse_names(&names_text);
        if class_names.is_empty() {
            return Err(ModelFileError::NoClassNames.into());
        }

        let network = parse_config(&config_text);
        if let Some(declared) = network.as_ref().and_then(|n| n.class_count()) {
            if declared != class_names.len() {
                log::warn!(
                    "Config declares {declared} classes but {} has {}",
                    names_path.display(),
                    class_names.len()
                );
            }
        }

        if let Some(network) = &network {
            check_input_size(network.input_size())?;
        }

        let backend = OrtBackend::load(model_path)?;
        let input_size = match network {
            Some(network) => network.input_size(),
            None => {
                log::warn!(
                    "No [net] dimensions in {}, using model input shape",
                    config_path.display()
                );
                check_input_size(backend.input_size_hint().unwrap_or(DEFAULT_INPUT_SIZE))?
            }
        };

        log::info!(
            "Loaded {} ({} classes, input {input_size})",
            model_path.display(),
            class_names.len()
        );
        Ok(Self::with_backend(Box::new(backend), class_names, input_size))
    }

    /// Builds a detector around an already-loaded backend.
    pub fn with_backend(
        backend: Box<dyn InferenceBackend>,
        class_names: Vec<String>,
        input_size: Size,
    ) -> Self {
        Self {
            backend,
            class_names,
            input_size,
            portrait_frames: true,
            frames_seen: 0,
            last_inference_time: Duration::ZERO,
            last_preprocessed_image: None,
        }
    }

    /// Whether landscape sample buffers are turned upright before detection
    /// (the default), so results come back in portrait coordinates.
    pub fn with_portrait_frames(mut self, enabled: bool) -> Self {
        self.portrait_frames = enabled;
        self
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    fn run(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        nms_threshold: f32,
        started: Instant,
    ) -> Result<Vec<DetectionResult>, DetectorError> {
        // 1. Preprocess: letterbox + normalize → NCHW float32
        let prepared = letterbox(frame, self.input_size)?;
        let preprocessed_at = Instant::now();

        // 2. Inference
        let outputs = self.backend.run(prepared.tensor)?;
        let inferred_at = Instant::now();

        // 3. Decode, suppress, map back to frame coordinates
        let candidates = yolo_output::decode(
            &outputs,
            self.class_names.len(),
            self.input_size,
            confidence_threshold,
        )?;
        let kept = non_max_suppression(candidates, nms_threshold);
        let results: Vec<DetectionResult> = kept
            .into_iter()
            .map(|c| {
                DetectionResult::new(
                    c.class_id,
                    self.class_name(c.class_id),
                    c.confidence,
                    prepared.transform.to_source(&c.bbox),
                )
            })
            .collect();

        self.last_inference_time = started.elapsed();
        self.last_preprocessed_image = Some(prepared.image);
        log::debug!(
            "frame {}: preprocess {:.1}ms, inference {:.1}ms, total {:.1}ms, {} detections",
            frame.index(),
            ms(preprocessed_at - started),
            ms(inferred_at - preprocessed_at),
            ms(self.last_inference_time),
            results.len()
        );
        Ok(results)
    }

    fn next_index(&mut self) -> usize {
        let index = self.frames_seen;
        self.frames_seen += 1;
        index
    }
}

impl ObjectDetector for YoloDetector {
    fn detect_sample_buffer(
        &mut self,
        buffer: &SampleBuffer,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectionResult>, DetectorError> {
        let started = Instant::now();
        check_threshold("confidence", confidence_threshold)?;
        check_threshold("nms", nms_threshold)?;

        let index = self.next_index();
        let frame = if self.portrait_frames {
            buffer.to_portrait_frame(index)
        } else {
            buffer.to_frame(index)
        };
        self.run(&frame, confidence_threshold, nms_threshold, started)
    }

    fn detect_image(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<DetectionResult>, DetectorError> {
        let started = Instant::now();
        check_threshold("confidence", confidence_threshold)?;
        check_threshold("nms", nms_threshold)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectorError::InvalidFrame("empty image".into()));
        }

        let index = self.next_index();
        let frame = Frame::from_rgb_image(image, index);
        self.run(&frame, confidence_threshold, nms_threshold, started)
    }

    fn last_inference_time(&self) -> Duration {
        self.last_inference_time
    }

    fn input_size(&self) -> Size {
        self.input_size
    }

    fn last_preprocessed_image(&self) -> Option<&RgbImage> {
        self.last_preprocessed_image.as_ref()
    }
}

fn require_file(kind: &'static str, path: &Path) -> Result<(), DetectorError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(DetectorError::MissingFile {
            kind,
            path: path.to_path_buf(),
        })
    }
}

fn read_text(kind: &'static str, path: &Path) -> Result<String, DetectorError> {
    require_file(kind, path)?;
    std::fs::read_to_string(path).map_err(|source| DetectorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::sample_buffer::PixelFormat;
    use approx::assert_relative_eq;
    use ndarray::{Array4, ArrayD, IxDyn};
    use std::sync::{Arc, Mutex};

    /// Returns a fixed set of Darknet rows (`cx, cy, w, h, obj, classes...`)
    /// in network pixels and records the input shapes it saw.
    struct StubBackend {
        rows: Vec<Vec<f32>>,
        seen_shapes: Arc<Mutex<Vec<Vec<usize>>>>,
    }

    impl StubBackend {
        fn new(rows: Vec<Vec<f32>>) -> (Self, Arc<Mutex<Vec<Vec<usize>>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    rows,
                    seen_shapes: seen.clone(),
                },
                seen,
            )
        }
    }

    impl InferenceBackend for StubBackend {
        fn run(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, DetectorError> {
            self.seen_shapes.lock().unwrap().push(input.shape().to_vec());
            let cols = self.rows.first().map_or(7, |r| r.len());
            let data: Vec<f32> = self.rows.iter().flatten().copied().collect();
            let array = ArrayD::from_shape_vec(IxDyn(&[1, self.rows.len(), cols]), data)
                .map_err(DetectorError::runtime)?;
            Ok(vec![array])
        }
    }

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn run(&mut self, _input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, DetectorError> {
            Err(DetectorError::Runtime("boom".into()))
        }
    }

    fn names() -> Vec<String> {
        vec!["person".into(), "car".into()]
    }

    fn detector(rows: Vec<Vec<f32>>) -> YoloDetector {
        let (backend, _) = StubBackend::new(rows);
        YoloDetector::with_backend(Box::new(backend), names(), Size::new(416, 416))
    }

    fn gray_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb([90, 90, 90]))
    }

    #[test]
    fn test_zero_detections_yields_empty() {
        let mut det = detector(vec![vec![208.0, 208.0, 50.0, 50.0, 0.01, 0.5, 0.5]]);
        let results = det.detect_image(&gray_image(416, 416), 0.25, 0.45).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_detect_image_maps_boxes_to_source() {
        // 832x416 image: scale 0.5, content 416x208, pad_y 104
        let mut det = detector(vec![vec![208.0, 208.0, 100.0, 50.0, 0.9, 0.1, 0.9]]);
        let results = det.detect_image(&gray_image(832, 416), 0.25, 0.45).unwrap();

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.class_id(), 1);
        assert_eq!(r.class_name(), "car");
        assert_relative_eq!(r.confidence(), 0.81, epsilon = 1e-6);
        let b = r.bounding_box();
        assert_relative_eq!(b.x, 316.0, epsilon = 1e-3);
        assert_relative_eq!(b.y, 158.0, epsilon = 1e-3);
        assert_relative_eq!(b.width, 200.0, epsilon = 1e-3);
        assert_relative_eq!(b.height, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn test_overlapping_boxes_are_suppressed() {
        let mut det = detector(vec![
            vec![200.0, 200.0, 100.0, 100.0, 0.9, 0.9, 0.0],
            vec![205.0, 205.0, 100.0, 100.0, 0.8, 0.9, 0.0],
        ]);
        let results = det.detect_image(&gray_image(416, 416), 0.25, 0.45).unwrap();
        assert_eq!(results.len(), 1);
        assert_relative_eq!(results[0].confidence(), 0.81, epsilon = 1e-6);
    }

    #[test]
    fn test_inference_time_and_preprocessed_image_recorded() {
        let mut det = detector(vec![vec![208.0, 208.0, 50.0, 50.0, 0.9, 0.9, 0.0]]);
        assert_eq!(det.last_inference_time(), Duration::ZERO);
        assert!(det.last_preprocessed_image().is_none());

        det.detect_image(&gray_image(100, 50), 0.25, 0.45).unwrap();

        assert!(det.last_inference_time() >= Duration::ZERO);
        let pre = det.last_preprocessed_image().unwrap();
        assert_eq!(pre.dimensions(), (416, 416));
        assert_eq!(pre.get_pixel(0, 0).0, [114, 114, 114]);
    }

    #[test]
    fn test_sample_buffer_is_rotated_to_portrait() {
        let (backend, seen) = StubBackend::new(vec![vec![208.0, 208.0, 416.0, 416.0, 0.9, 0.9, 0.0]]);
        let mut det = YoloDetector::with_backend(Box::new(backend), names(), Size::new(416, 416));
        // Landscape 80x40 BGRA buffer
        let buffer = SampleBuffer::packed(vec![0u8; 80 * 40 * 4], 80, 40, PixelFormat::Bgra8).unwrap();

        let results = det.detect_sample_buffer(&buffer, 0.25, 0.45).unwrap();

        assert_eq!(seen.lock().unwrap()[0], vec![1, 3, 416, 416]);
        // Full-input box maps onto the whole upright 40x80 frame
        let b = results[0].bounding_box();
        assert_relative_eq!(b.width, 40.0, epsilon = 1e-3);
        assert_relative_eq!(b.height, 80.0, epsilon = 1e-3);
    }

    #[test]
    fn test_sample_buffer_keeps_orientation_when_disabled() {
        let mut det = detector(vec![vec![208.0, 208.0, 416.0, 416.0, 0.9, 0.9, 0.0]])
            .with_portrait_frames(false);
        let buffer = SampleBuffer::packed(vec![0u8; 80 * 40 * 4], 80, 40, PixelFormat::Bgra8).unwrap();

        let results = det.detect_sample_buffer(&buffer, 0.25, 0.45).unwrap();

        assert_eq!(results[0].bounding_box(), BoundingBox::new(0.0, 0.0, 80.0, 40.0));
    }

    #[test]
    fn test_unknown_class_id_gets_placeholder_name() {
        let det = detector(Vec::new());
        assert_eq!(det.class_name(0), "person");
        assert_eq!(det.class_name(7), "class_7");
    }

    #[test]
    fn test_invalid_threshold_rejected_before_inference() {
        let (backend, seen) = StubBackend::new(Vec::new());
        let mut det = YoloDetector::with_backend(Box::new(backend), names(), Size::new(416, 416));
        let err = det.detect_image(&gray_image(10, 10), 1.5, 0.45).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidThreshold { name: "confidence", .. }));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_backend_failure_keeps_previous_diagnostics() {
        let mut det =
            YoloDetector::with_backend(Box::new(FailingBackend), names(), Size::new(416, 416));
        assert!(det.detect_image(&gray_image(10, 10), 0.25, 0.45).is_err());
        assert_eq!(det.last_inference_time(), Duration::ZERO);
        assert!(det.last_preprocessed_image().is_none());
    }

    #[test]
    fn test_open_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = YoloDetector::open(
            &dir.path().join("missing.onnx"),
            &dir.path().join("net.cfg"),
            &dir.path().join("coco.names"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, DetectorError::MissingFile { kind: "model", .. }));
    }

    #[test]
    fn test_open_empty_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("net.onnx");
        let config = dir.path().join("net.cfg");
        let names = dir.path().join("coco.names");
        std::fs::write(&model, b"not really onnx").unwrap();
        std::fs::write(&config, "[net]\nwidth=416\nheight=416\n").unwrap();
        std::fs::write(&names, "\n\n").unwrap();

        let err = YoloDetector::open(&model, &config, &names).err().unwrap();
        assert!(matches!(
            err,
            DetectorError::InvalidModel(ModelFileError::NoClassNames)
        ));
    }

    #[test]
    fn test_open_rejects_zero_width_config() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("net.onnx");
        let config = dir.path().join("net.cfg");
        let names = dir.path().join("coco.names");
        std::fs::write(&model, b"not really onnx").unwrap();
        std::fs::write(&config, "[net]\nwidth=0\nheight=416\n").unwrap();
        std::fs::write(&names, "person\n").unwrap();

        let err = YoloDetector::open(&model, &config, &names).err().unwrap();
        assert!(matches!(
            err,
            DetectorError::InvalidModel(ModelFileError::InvalidDimensions {
                width: 0,
                height: 416
            })
        ));
    }

    #[test]
    fn test_empty_input_size_fails_instead_of_panicking() {
        let (backend, seen) = StubBackend::new(Vec::new());
        let mut det = YoloDetector::with_backend(Box::new(backend), names(), Size::new(0, 0));
        let err = det.detect_image(&gray_image(10, 10), 0.25, 0.45).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidFrame(_)));
        assert!(seen.lock().unwrap().is_empty());
    }
}

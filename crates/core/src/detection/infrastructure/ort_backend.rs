use std::path::Path;

use ndarray::{Array4, ArrayD};

use crate::detection::domain::detector_error::DetectorError;
use crate::shared::bounding_box::Size;

use ort::execution_providers::ExecutionProviderDispatch;

use super::inference_backend::InferenceBackend;

/// [`InferenceBackend`] backed by an ONNX Runtime session.
pub struct OrtBackend {
    session: ort::session::Session,
    input_size: Option<Size>,
}

impl OrtBackend {
    /// Loads an ONNX model, preferring the platform's accelerated provider.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()
            .map_err(DetectorError::runtime)?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(DetectorError::runtime)?
            .with_intra_threads(intra_threads)
            .map_err(DetectorError::runtime)?
            .with_execution_providers(accelerators())
            .map_err(DetectorError::runtime)?
            .commit_from_file(model_path)
            .map_err(DetectorError::runtime)?;

        // NCHW: [1, 3, H, W]; dynamic dimensions are reported as -1
        let input_size = session.inputs().first().and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                if shape.len() >= 4 && shape[2] > 0 && shape[3] > 0 {
                    Some(Size::new(shape[3] as u32, shape[2] as u32))
                } else {
                    None
                }
            } else {
                None
            }
        });

        log::debug!(
            "Loaded ONNX model {} (declared input {:?})",
            model_path.display(),
            input_size
        );

        Ok(Self {
            session,
            input_size,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn run(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, DetectorError> {
        let input_value = ort::value::Tensor::from_array(input).map_err(DetectorError::runtime)?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(DetectorError::runtime)?;

        let mut arrays = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let array = outputs[i]
                .try_extract_array::<f32>()
                .map_err(DetectorError::runtime)?;
            arrays.push(array.to_owned());
        }
        Ok(arrays)
    }

    fn input_size_hint(&self) -> Option<Size> {
        self.input_size
    }
}

/// CoreML on macOS, DirectML on Windows; elsewhere ONNX Runtime stays on
/// its CPU provider.
fn accelerators() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    let providers = vec![ort::execution_providers::CoreMLExecutionProvider::default().build()];
    #[cfg(target_os = "windows")]
    let providers = vec![ort::execution_providers::DirectMLExecutionProvider::default().build()];
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let providers = Vec::new();
    providers
}

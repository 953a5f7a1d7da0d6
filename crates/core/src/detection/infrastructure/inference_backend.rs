use ndarray::{Array4, ArrayD};

use crate::detection::domain::detector_error::DetectorError;
use crate::shared::bounding_box::Size;

/// Runs the network forward pass: one NCHW image tensor in, raw outputs out.
///
/// Separates the detector's pre/post-processing from the runtime that
/// executes the model, so either side can be swapped out.
pub trait InferenceBackend: Send {
    fn run(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, DetectorError>;

    /// Input size declared by the model itself, when it has a fixed one.
    fn input_size_hint(&self) -> Option<Size> {
        None
    }
}

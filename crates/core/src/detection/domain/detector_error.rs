use std::path::PathBuf;

use thiserror::Error;

use super::model_file_error::ModelFileError;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("{kind} file not found: {path}")]
    MissingFile { kind: &'static str, path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model files: {0}")]
    InvalidModel(#[from] ModelFileError),
    #[error("inference runtime error: {0}")]
    Runtime(String),
    #[error("unexpected network output: {0}")]
    UnexpectedOutput(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("{name} threshold must be within [0, 1], got {value}")]
    InvalidThreshold { name: &'static str, value: f32 },
}

impl DetectorError {
    /// Wraps an ONNX Runtime (or other backend) failure.
    pub fn runtime(err: impl std::fmt::Display) -> Self {
        DetectorError::Runtime(err.to_string())
    }
}

/// Rejects thresholds outside `[0, 1]` (including NaN).
pub fn check_threshold(name: &'static str, value: f32) -> Result<f32, DetectorError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(DetectorError::InvalidThreshold { name, value })
    }
}

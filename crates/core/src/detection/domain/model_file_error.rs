use thiserror::Error;

/// Reasons a weights/config/names triple is rejected before loading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelFileError {
    #[error("Weights file appears to be too small")]
    WeightsTooSmall,
    #[error("Config file appears to be too small")]
    ConfigTooSmall,
    #[error("Names file appears to be too small")]
    NamesTooSmall,
    #[error("Failed to parse network dimensions from config file")]
    MissingDimensions,
    #[error("Invalid network dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("No class names found in names file")]
    NoClassNames,
}

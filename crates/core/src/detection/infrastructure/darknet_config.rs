//! Parsing and validation of Darknet-style model files: the `.cfg` network
//! description and the `.names` class table.

use crate::detection::domain::model_file_error::ModelFileError;
use crate::shared::bounding_box::Size;

const MIN_WEIGHTS_BYTES: usize = 1000;
const MIN_CONFIG_BYTES: usize = 100;
const MIN_NAMES_BYTES: usize = 10;
const MIN_DIMENSION: u32 = 32;
const MAX_DIMENSION: u32 = 2048;

/// The parts of a `.cfg` file the detector cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub width: u32,
    pub height: u32,
    pub channels: Option<u32>,
    /// `classes=` from each `[yolo]` head, in file order.
    pub yolo_classes: Vec<usize>,
}

impl NetworkConfig {
    pub fn input_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Class count the detection heads agree on, if any head declares one.
    pub fn class_count(&self) -> Option<usize> {
        self.yolo_classes.first().copied()
    }
}

/// Reads network dimensions from the `[net]` section.
///
/// Returns `None` unless both `width=` and `height=` parse as integers there.
pub fn parse_config(text: &str) -> Option<NetworkConfig> {
    let mut width: Option<u32> = None;
    let mut height: Option<u32> = None;
    let mut channels: Option<u32> = None;
    let mut yolo_classes = Vec::new();
    let mut section = "";

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            section = line;
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        match (section, key) {
            ("[net]", "width") => width = value.parse().ok(),
            ("[net]", "height") => height = value.parse().ok(),
            ("[net]", "channels") => channels = value.parse().ok(),
            ("[yolo]", "classes") => {
                if let Ok(classes) = value.parse() {
                    yolo_classes.push(classes);
                }
            }
            _ => {}
        }
    }

    Some(NetworkConfig {
        width: width?,
        height: height?,
        channels,
        yolo_classes,
    })
}

/// One class label per non-blank line, whitespace trimmed.
pub fn parse_names(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Rejects network input sizes outside `32..=2048` on either side.
pub fn check_input_size(size: Size) -> Result<Size, ModelFileError> {
    let valid = MIN_DIMENSION..=MAX_DIMENSION;
    if valid.contains(&size.width) && valid.contains(&size.height) {
        Ok(size)
    } else {
        Err(ModelFileError::InvalidDimensions {
            width: size.width,
            height: size.height,
        })
    }
}

/// Sanity checks a weights/config/names triple before it is imported or loaded.
pub fn validate_model_files(
    weights: &[u8],
    config: &[u8],
    names: &[u8],
) -> Result<NetworkConfig, ModelFileError> {
    if weights.len() < MIN_WEIGHTS_BYTES {
        return Err(ModelFileError::WeightsTooSmall);
    }
    if config.len() < MIN_CONFIG_BYTES {
        return Err(ModelFileError::ConfigTooSmall);
    }
    if names.len() < MIN_NAMES_BYTES {
        return Err(ModelFileError::NamesTooSmall);
    }

    let network = std::str::from_utf8(config)
        .ok()
        .and_then(parse_config)
        .ok_or(ModelFileError::MissingDimensions)?;

    check_input_size(network.input_size())?;

    let class_names = std::str::from_utf8(names)
        .map(parse_names)
        .unwrap_or_default();
    if class_names.is_empty() {
        return Err(ModelFileError::NoClassNames);
    }

    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TINY_CFG: &str = "\
[net]
# Testing
batch=1
subdivisions=1
width=416
height=416
channels=3
momentum=0.9

[convolutional]
batch_normalize=1
filters=32
size=3
stride=2
width=999

[yolo]
mask = 3,4,5
classes=80
num=6

[yolo]
mask = 0,1,2
classes=80
";

    fn padded_cfg(width: u32, height: u32) -> String {
        format!("[net]\nwidth={width}\nheight={height}\n{}", "#".repeat(120))
    }

    #[test]
    fn test_parse_config_reads_net_section() {
        let cfg = parse_config(TINY_CFG).unwrap();
        assert_eq!(cfg.input_size(), Size::new(416, 416));
        assert_eq!(cfg.channels, Some(3));
        assert_eq!(cfg.yolo_classes, vec![80, 80]);
        assert_eq!(cfg.class_count(), Some(80));
    }

    #[test]
    fn test_parse_config_ignores_width_outside_net() {
        let cfg = parse_config("[convolutional]\nwidth=10\n[net]\nwidth=320\nheight=256\n").unwrap();
        assert_eq!((cfg.width, cfg.height), (320, 256));
    }

    #[test]
    fn test_parse_config_tolerates_whitespace() {
        let cfg = parse_config("  [net]  \n  width = 608 \n\theight=608\n").unwrap();
        assert_eq!(cfg.input_size(), Size::new(608, 608));
    }

    #[test]
    fn test_parse_config_missing_height() {
        assert_eq!(parse_config("[net]\nwidth=416\n"), None);
    }

    #[test]
    fn test_parse_config_non_numeric() {
        assert_eq!(parse_config("[net]\nwidth=big\nheight=416\n"), None);
    }

    #[test]
    fn test_parse_names_trims_and_skips_blank_lines() {
        let names = parse_names("person\n  bicycle \n\n\ncar\r\n");
        assert_eq!(names, vec!["person", "bicycle", "car"]);
    }

    #[test]
    fn test_validate_accepts_reasonable_files() {
        let network =
            validate_model_files(&[0u8; 2000], padded_cfg(416, 416).as_bytes(), b"person\ncar\n")
                .unwrap();
        assert_eq!(network.input_size(), Size::new(416, 416));
    }

    #[rstest]
    #[case(&[0u8; 999], TINY_CFG.as_bytes(), b"person\nbicycle\n", ModelFileError::WeightsTooSmall)]
    #[case(&[0u8; 2000], b"[net]\nwidth=416\n", b"person\nbicycle\n", ModelFileError::ConfigTooSmall)]
    #[case(&[0u8; 2000], TINY_CFG.as_bytes(), b"cat\n", ModelFileError::NamesTooSmall)]
    #[case(&[0u8; 2000], TINY_CFG.as_bytes(), b"\n\n  \n\n\n\n  \n", ModelFileError::NoClassNames)]
    fn test_validate_rejects(
        #[case] weights: &[u8],
        #[case] config: &[u8],
        #[case] names: &[u8],
        #[case] expected: ModelFileError,
    ) {
        assert_eq!(validate_model_files(weights, config, names).unwrap_err(), expected);
    }

    #[test]
    fn test_validate_rejects_missing_dimensions() {
        let cfg = format!("[net]\nbatch=1\n{}", "#".repeat(120));
        assert_eq!(
            validate_model_files(&[0u8; 2000], cfg.as_bytes(), b"person\ncar\n").unwrap_err(),
            ModelFileError::MissingDimensions
        );
    }

    #[rstest]
    #[case(16, 416)]
    #[case(416, 4096)]
    fn test_validate_rejects_out_of_range_dimensions(#[case] width: u32, #[case] height: u32) {
        let err = validate_model_files(
            &[0u8; 2000],
            padded_cfg(width, height).as_bytes(),
            b"person\ncar\n",
        )
        .unwrap_err();
        assert_eq!(err, ModelFileError::InvalidDimensions { width, height });
        assert_eq!(
            err.to_string(),
            format!("Invalid network dimensions: {width}x{height}")
        );
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::bounding_box::Size;
use crate::shared::constants::{
    BUILT_IN_CONFIG_FILE, BUILT_IN_MODEL_NAME, BUILT_IN_NAMES_FILE, BUILT_IN_WEIGHTS_FILE,
    DEFAULT_INPUT_SIZE,
};

/// Metadata for one installed detection model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YoloModel {
    pub id: Uuid,
    pub name: String,
    pub weights_file_name: String,
    pub config_file_name: String,
    pub names_file_name: String,
    pub input_width: u32,
    pub input_height: u32,
    pub class_count: usize,
    pub class_names: Vec<String>,
    pub date_imported: DateTime<Utc>,
}

impl YoloModel {
    /// The model shipped with the application, under its fixed nil id.
    pub fn built_in(class_names: Vec<String>) -> Self {
        Self {
            id: Uuid::nil(),
            name: BUILT_IN_MODEL_NAME.to_string(),
            weights_file_name: BUILT_IN_WEIGHTS_FILE.to_string(),
            config_file_name: BUILT_IN_CONFIG_FILE.to_string(),
            names_file_name: BUILT_IN_NAMES_FILE.to_string(),
            input_width: DEFAULT_INPUT_SIZE.width,
            input_height: DEFAULT_INPUT_SIZE.height,
            class_count: crate::shared::constants::BUILT_IN_CLASS_COUNT,
            class_names,
            date_imported: DateTime::from_timestamp(0, 0).unwrap_or_default(),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "Unnamed Model"
        } else {
            &self.name
        }
    }

    pub fn input_size(&self) -> Size {
        Size::new(self.input_width, self.input_height)
    }

    pub fn input_size_description(&self) -> String {
        self.input_size().to_string()
    }

    /// The built-in model is the one under the nil id, whatever its name.
    pub fn is_built_in(&self) -> bool {
        self.id.is_nil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(name: &str) -> YoloModel {
        YoloModel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            weights_file_name: "custom.onnx".into(),
            config_file_name: "custom.cfg".into(),
            names_file_name: "custom.names".into(),
            input_width: 608,
            input_height: 320,
            class_count: 2,
            class_names: vec!["cat".into(), "dog".into()],
            date_imported: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_falls_back_for_empty_name() {
        assert_eq!(custom("").display_name(), "Unnamed Model");
        assert_eq!(custom("pets").display_name(), "pets");
    }

    #[test]
    fn test_input_size_description() {
        assert_eq!(custom("pets").input_size_description(), "608x320");
    }

    #[test]
    fn test_built_in_identity() {
        let model = YoloModel::built_in(Vec::new());
        assert!(model.is_built_in());
        assert_eq!(model.id.to_string(), crate::shared::constants::BUILT_IN_MODEL_ID);
        assert_eq!(model.date_imported.timestamp(), 0);
        assert!(!custom("pets").is_built_in());
        assert!(!custom("yolov4-tiny-coco").is_built_in());
    }

    #[test]
    fn test_metadata_json_uses_camel_case() {
        let json = serde_json::to_value(custom("pets")).unwrap();
        assert_eq!(json["weightsFileName"], "custom.onnx");
        assert_eq!(json["inputWidth"], 608);
        let back: YoloModel = serde_json::from_value(json).unwrap();
        assert_eq!(back.name, "pets");
    }
}

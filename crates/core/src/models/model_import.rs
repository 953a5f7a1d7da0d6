use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::detection::domain::model_file_error::ModelFileError;
use crate::detection::infrastructure::darknet_config::{parse_names, validate_model_files};

use super::model_store::{ModelStore, ModelStoreError};
use super::yolo_model::YoloModel;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ModelFileError),
    #[error("Import failed: {0}")]
    Store(#[from] ModelStoreError),
}

/// Validates a weights/config/names triple and adds it to `store` under a
/// fresh id.
pub fn import_model(
    store: &ModelStore,
    name: &str,
    weights_path: &Path,
    config_path: &Path,
    names_path: &Path,
) -> Result<YoloModel, ImportError> {
    let weights = read(weights_path)?;
    let config = read(config_path)?;
    let names = read(names_path)?;

    let network = validate_model_files(&weights, &config, &names)?;
    let class_names = parse_names(&String::from_utf8_lossy(&names));

    let model = YoloModel {
        id: Uuid::new_v4(),
        name: name.to_string(),
        weights_file_name: file_name(weights_path),
        config_file_name: file_name(config_path),
        names_file_name: file_name(names_path),
        input_width: network.width,
        input_height: network.height,
        class_count: class_names.len(),
        class_names,
        date_imported: Utc::now(),
    };

    store.save_model(&model, &weights, &config, &names)?;
    Ok(model)
}

fn read(path: &Path) -> Result<Vec<u8>, ImportError> {
    fs::read(path).map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        store: ModelStore,
        weights: PathBuf,
        config: PathBuf,
        names: PathBuf,
    }

    fn fixture(weights_len: usize, names: &str) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        let weights = src.join("pets.onnx");
        let config = src.join("pets.cfg");
        let names_path = src.join("pets.names");
        fs::write(&weights, vec![7u8; weights_len]).unwrap();
        fs::write(
            &config,
            format!("[net]\nwidth=608\nheight=608\nchannels=3\n{}", "#".repeat(100)),
        )
        .unwrap();
        fs::write(&names_path, names).unwrap();
        let store = ModelStore::new(tmp.path().join("store"));
        Fixture {
            _tmp: tmp,
            store,
            weights,
            config,
            names: names_path,
        }
    }

    #[test]
    fn test_import_registers_model() {
        let f = fixture(4096, "cat\ndog\nhamster\n");
        let model = import_model(&f.store, "pets", &f.weights, &f.config, &f.names).unwrap();

        assert_eq!(model.name, "pets");
        assert_eq!(model.weights_file_name, "pets.onnx");
        assert_eq!(model.input_size_description(), "608x608");
        assert_eq!(model.class_count, 3);
        assert_eq!(model.class_names, vec!["cat", "dog", "hamster"]);
        assert_eq!(f.store.find(&model.id), Some(model.clone()));

        let paths = f.store.model_paths(&model).unwrap();
        assert_eq!(fs::read(paths.weights).unwrap().len(), 4096);
    }

    #[test]
    fn test_import_rejects_small_weights() {
        let f = fixture(10, "cat\ndog\nhamster\n");
        let err = import_model(&f.store, "pets", &f.weights, &f.config, &f.names).unwrap_err();
        assert!(matches!(err, ImportError::Invalid(ModelFileError::WeightsTooSmall)));
        assert_eq!(f.store.load_models().len(), 1);
    }

    #[test]
    fn test_import_missing_file() {
        let f = fixture(4096, "cat\ndog\nhamster\n");
        let missing = f.weights.with_file_name("nope.onnx");
        let err = import_model(&f.store, "pets", &missing, &f.config, &f.names).unwrap_err();
        assert!(matches!(err, ImportError::Read { .. }));
    }

    #[test]
    fn test_each_import_gets_a_new_id() {
        let f = fixture(4096, "cat\ndog\nhamster\n");
        let a = import_model(&f.store, "a", &f.weights, &f.config, &f.names).unwrap();
        let b = import_model(&f.store, "b", &f.weights, &f.config, &f.names).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(f.store.load_models().len(), 3);
    }
}

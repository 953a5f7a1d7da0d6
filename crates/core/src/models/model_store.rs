use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::detection::infrastructure::darknet_config::parse_names;
use crate::detection::infrastructure::model_resolver::{
    self, model_cache_dir, resolve_built_in, ModelPaths, ModelResolveError, ProgressFn,
};
use crate::shared::constants::{APP_DIR_NAME, BUILT_IN_NAMES_FILE, LEGACY_BUILT_IN_ID};

use super::yolo_model::YoloModel;

const METADATA_FILE: &str = "models.json";

#[derive(Error, Debug)]
pub enum ModelStoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode model metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Resolve(#[from] ModelResolveError),
    #[error("could not determine data directory")]
    NoDataDir,
    #[error("no model with id {0}")]
    NotFound(String),
}

/// On-disk registry of imported models.
///
/// Each custom model lives in `<root>/<uuid>/` next to a shared
/// `models.json` holding their metadata. The built-in model is never
/// written to the registry; it is prepended whenever models are listed.
pub struct ModelStore {
    root: PathBuf,
    bundled_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bundled_dir: None,
            cache_dir: None,
        }
    }

    /// Store under the platform data directory, e.g.
    /// `~/.local/share/YoloDetector/YOLOModels/`.
    pub fn open_default() -> Result<Self, ModelStoreError> {
        let root = dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME).join("YOLOModels"))
            .ok_or(ModelStoreError::NoDataDir)?;
        fs::create_dir_all(&root).map_err(|source| ModelStoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self::new(root))
    }

    /// Directory searched for the built-in model files before the cache.
    pub fn with_bundled_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundled_dir = Some(dir.into());
        self
    }

    /// Overrides the platform model cache used for the built-in files.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn cache_dir(&self) -> Result<PathBuf, ModelStoreError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(model_cache_dir()?),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    fn model_dir(&self, id: &Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Built-in model first, then custom models in import order.
    pub fn load_models(&self) -> Vec<YoloModel> {
        let mut models = vec![self.built_in_model()];
        models.extend(self.load_custom_models());
        models
    }

    pub fn find(&self, id: &Uuid) -> Option<YoloModel> {
        self.load_models().into_iter().find(|m| &m.id == id)
    }

    /// Looks a model up by its id as typed by a user, accepting the legacy
    /// built-in name.
    pub fn find_by_id(&self, id: &str) -> Result<YoloModel, ModelStoreError> {
        Uuid::parse_str(&canonical_model_id(id))
            .ok()
            .and_then(|uuid| self.find(&uuid))
            .ok_or_else(|| ModelStoreError::NotFound(id.to_string()))
    }

    /// Copies the model's files into its own directory and registers it.
    pub fn save_model(
        &self,
        model: &YoloModel,
        weights: &[u8],
        config: &[u8],
        names: &[u8],
    ) -> Result<(), ModelStoreError> {
        let dir = self.model_dir(&model.id);
        create_dir(&dir)?;
        write_file(&dir.join(&model.weights_file_name), weights)?;
        write_file(&dir.join(&model.config_file_name), config)?;
        write_file(&dir.join(&model.names_file_name), names)?;

        let mut models = self.load_custom_models();
        models.retain(|m| m.id != model.id);
        models.push(model.clone());
        self.save_custom_models(&models)?;
        log::info!("Saved model {} ({})", model.display_name(), model.id);
        Ok(())
    }

    /// Removes a custom model's files and metadata. The built-in model is
    /// left untouched.
    pub fn delete_model(&self, model: &YoloModel) -> Result<(), ModelStoreError> {
        if model.is_built_in() {
            return Ok(());
        }

        let dir = self.model_dir(&model.id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|source| ModelStoreError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        let mut models = self.load_custom_models();
        models.retain(|m| m.id != model.id);
        self.save_custom_models(&models)?;
        log::info!("Deleted model {} ({})", model.display_name(), model.id);
        Ok(())
    }

    /// Paths to the weights, config, and names files of `model`.
    ///
    /// Built-in files are resolved through the model cache and may be
    /// downloaded on first use.
    pub fn model_paths(&self, model: &YoloModel) -> Result<ModelPaths, ModelStoreError> {
        if model.is_built_in() {
            return self.resolve_built_in_files(None);
        }
        let dir = self.model_dir(&model.id);
        Ok(ModelPaths {
            weights: dir.join(&model.weights_file_name),
            config: dir.join(&model.config_file_name),
            names: dir.join(&model.names_file_name),
        })
    }

    /// Resolves the built-in files ahead of loading, downloading the
    /// config and names if needed and reporting progress as it goes.
    pub fn resolve_built_in_files(
        &self,
        progress: Option<ProgressFn>,
    ) -> Result<ModelPaths, ModelStoreError> {
        let cache_dir = self.cache_dir()?;
        Ok(resolve_built_in(&cache_dir, self.bundled_dir.as_deref(), progress)?)
    }

    fn built_in_model(&self) -> YoloModel {
        YoloModel::built_in(self.built_in_class_names())
    }

    /// Class names of the built-in model, if its names file is already local.
    fn built_in_class_names(&self) -> Vec<String> {
        let Ok(cache_dir) = self.cache_dir() else {
            return Vec::new();
        };
        model_resolver::resolve(
            BUILT_IN_NAMES_FILE,
            None,
            &cache_dir,
            self.bundled_dir.as_deref(),
            None,
        )
        .ok()
        .and_then(|path| fs::read_to_string(path).ok())
        .map(|text| parse_names(&text))
        .unwrap_or_default()
    }

    fn load_custom_models(&self) -> Vec<YoloModel> {
        let path = self.metadata_path();
        let Ok(json) = fs::read_to_string(&path) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<YoloModel>>(&json) {
            Ok(models) => models.into_iter().filter(|m| !m.is_built_in()).collect(),
            Err(e) => {
                log::warn!("Ignoring unreadable model metadata {}: {e}", path.display());
                Vec::new()
            }
        }
    }

    fn save_custom_models(&self, models: &[YoloModel]) -> Result<(), ModelStoreError> {
        let custom: Vec<&YoloModel> = models.iter().filter(|m| !m.is_built_in()).collect();
        let json = serde_json::to_string_pretty(&custom)?;
        create_dir(&self.root)?;
        write_file(&self.metadata_path(), json.as_bytes())
    }
}

/// Maps the pre-UUID built-in id onto the nil UUID; other ids pass through.
pub fn canonical_model_id(id: &str) -> String {
    if id == LEGACY_BUILT_IN_ID {
        Uuid::nil().to_string()
    } else {
        id.to_string()
    }
}

fn create_dir(path: &Path) -> Result<(), ModelStoreError> {
    fs::create_dir_all(path).map_err(|source| ModelStoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), ModelStoreError> {
    fs::write(path, data).map_err(|source| ModelStoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

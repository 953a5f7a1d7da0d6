use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{
    APP_DIR_NAME, BUILT_IN_CONFIG_FILE, BUILT_IN_CONFIG_URL, BUILT_IN_NAMES_FILE,
    BUILT_IN_NAMES_URL, BUILT_IN_WEIGHTS_FILE,
};

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} not found; place it in {}", .dir.display())]
    NotAvailable { name: String, dir: PathBuf },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

const CHUNK_SIZE: usize = 64 * 1024;

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where the built-in model's three files live on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPaths {
    pub weights: PathBuf,
    pub config: PathBuf,
    pub names: PathBuf,
}

/// Resolve a model file by name, checking local locations before downloading.
///
/// Resolution order:
/// 1. `cache_dir`
/// 2. Bundled path (for development / pre-packaged installs)
/// 3. Download from `url` into `cache_dir`, when a URL is known
pub fn resolve(
    name: &str,
    url: Option<&str>,
    cache_dir: &Path,
    bundled_dir: Option<&Path>,
    progress: Option<&ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    if let Some(dir) = bundled_dir {
        let bundled_path = dir.join(name);
        if bundled_path.exists() {
            return Ok(bundled_path);
        }
    }

    let Some(url) = url else {
        return Err(ModelResolveError::NotAvailable {
            name: name.to_string(),
            dir: cache_dir.to_path_buf(),
        });
    };
    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {name} from {url}");
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Resolves all three built-in model files.
///
/// The config and class names can be fetched on demand; the ONNX weights
/// must already be in the cache or bundled directory.
pub fn resolve_built_in(
    cache_dir: &Path,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<ModelPaths, ModelResolveError> {
    let progress = progress.as_ref();
    Ok(ModelPaths {
        weights: resolve(BUILT_IN_WEIGHTS_FILE, None, cache_dir, bundled_dir, progress)?,
        config: resolve(
            BUILT_IN_CONFIG_FILE,
            Some(BUILT_IN_CONFIG_URL),
            cache_dir,
            bundled_dir,
            progress,
        )?,
        names: resolve(
            BUILT_IN_NAMES_FILE,
            Some(BUILT_IN_NAMES_URL),
            cache_dir,
            bundled_dir,
            progress,
        )?,
    })
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/YoloDetector/models/`
/// - Linux: `$XDG_CACHE_HOME/YoloDetector/models/` or `~/.cache/YoloDetector/models/`
/// - Windows: `%LOCALAPPDATA%/YoloDetector/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME).join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join(APP_DIR_NAME).join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<&ProgressFn>) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|source| ModelResolveError::Download {
            url: url.to_string(),
            source,
        })?;

    let total = response.content_length().unwrap_or(0);
    write_atomically(&mut response, dest, total, progress)
}

/// Streams `reader` into `<dest>.part`, then renames it over `dest`.
///
/// The `.part` file is removed on any failure.
fn write_atomically(
    reader: &mut dyn Read,
    dest: &Path,
    total: u64,
    progress: Option<&ProgressFn>,
) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");
    let result = write_atomically_inner(reader, &temp_path, dest, total, progress);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_atomically_inner(
    reader: &mut dyn Read,
    temp_path: &Path,
    dest: &Path,
    total: u64,
    progress: Option<&ProgressFn>,
) -> Result<(), ModelResolveError> {
    let write_err = |source| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(temp_path).map_err(write_err)?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut downloaded: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(write_err(e)),
        };
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|source| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source,
    })
}

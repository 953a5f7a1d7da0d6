use std::path::Path;

use image::RgbImage;

use crate::shared::constants::IMAGE_EXTENSIONS;

/// Decodes any format the `image` crate understands into RGB.
pub fn read_image(path: &Path) -> Result<RgbImage, Box<dyn std::error::Error>> {
    Ok(image::open(path)?.to_rgb8())
}

/// Encodes `image` in the format implied by the extension of `path`.
pub fn write_image(path: &Path, image: &RgbImage) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save(path)?;
    Ok(())
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

use image::{Rgb, RgbImage};
use ndarray::Array4;

use crate::detection::domain::detector_error::DetectorError;
use crate::shared::bounding_box::{BoundingBox, Size};
use crate::shared::frame::Frame;

/// Padding value (YOLO convention).
const PAD_VALUE: u8 = 114;

/// How a source frame was placed inside the network input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub source: Size,
}

impl LetterboxTransform {
    /// Maps a box in network-input pixels back onto the source frame,
    /// clipped to the frame bounds.
    pub fn to_source(&self, bbox: &BoundingBox) -> BoundingBox {
        let x = (bbox.x - self.pad_x as f32) / self.scale;
        let y = (bbox.y - self.pad_y as f32) / self.scale;
        BoundingBox::new(x, y, bbox.width / self.scale, bbox.height / self.scale)
            .clamp_to(self.source.width as f32, self.source.height as f32)
    }
}

/// Output of [`letterbox`].
pub struct Letterboxed {
    /// NCHW float32 tensor in `[0, 1]`.
    pub tensor: Array4<f32>,
    pub transform: LetterboxTransform,
    /// The padded RGB image the tensor was built from.
    pub image: RgbImage,
}

/// Aspect-preserving resize of `frame` into `target`, centred on gray padding.
///
/// Fails when either the frame or the target has a zero dimension.
pub fn letterbox(frame: &Frame, target: Size) -> Result<Letterboxed, DetectorError> {
    if target.width == 0 || target.height == 0 {
        return Err(DetectorError::InvalidFrame(format!(
            "network input size {target} is empty"
        )));
    }
    if frame.width() == 0 || frame.height() == 0 {
        return Err(DetectorError::InvalidFrame("empty frame".into()));
    }

    let fw = frame.width() as f32;
    let fh = frame.height() as f32;

    let scale = (target.width as f32 / fw).min(target.height as f32 / fh);
    let new_w = ((fw * scale).round() as u32).clamp(1, target.width);
    let new_h = ((fh * scale).round() as u32).clamp(1, target.height);
    let pad_x = (target.width - new_w) / 2;
    let pad_y = (target.height - new_h) / 2;

    let mut image = RgbImage::from_pixel(
        target.width,
        target.height,
        Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]),
    );

    let src = frame.as_ndarray(); // [H, W, C]
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour resize into the padded region
    for y in 0..new_h {
        let src_y = ((y as f32 / scale) as usize).min(src_h - 1);
        for x in 0..new_w {
            let src_x = ((x as f32 / scale) as usize).min(src_w - 1);
            image.put_pixel(
                pad_x + x,
                pad_y + y,
                Rgb([
                    src[[src_y, src_x, 0]],
                    src[[src_y, src_x, 1]],
                    src[[src_y, src_x, 2]],
                ]),
            );
        }
    }

    let tensor = to_nchw(&image);
    Ok(Letterboxed {
        tensor,
        transform: LetterboxTransform {
            scale,
            pad_x,
            pad_y,
            source: Size::new(frame.width(), frame.height()),
        },
        image,
    })
}

fn to_nchw(image: &RgbImage) -> Array4<f32> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

use std::time::Duration;

use crate::detection::domain::detector_error::DetectorError;
use crate::shared::bounding_box::Size;
use crate::shared::frame::Frame;

/// Byte layout of a [`SampleBuffer`] pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit BGRA, the layout camera capture pipelines deliver.
    Bgra8,
    Rgba8,
    Rgb8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }

    fn to_rgb(self, px: &[u8]) -> [u8; 3] {
        match self {
            PixelFormat::Bgra8 => [px[2], px[1], px[0]],
            PixelFormat::Rgba8 | PixelFormat::Rgb8 => [px[0], px[1], px[2]],
        }
    }
}

/// Clockwise rotation needed to display a buffer upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    /// Maps an angle in degrees onto the nearest quarter turn.
    pub fn from_degrees(angle: i32) -> Self {
        match angle.rem_euclid(360) {
            45..=134 => Rotation::Clockwise90,
            135..=224 => Rotation::Clockwise180,
            225..=315 => Rotation::Clockwise270,
            _ => Rotation::None,
        }
    }

    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Clockwise90 | Rotation::Clockwise270)
    }
}

/// A raw video frame as delivered by a capture or decode pipeline.
///
/// Rows may carry padding (`bytes_per_row` > `width * bpp`). Nothing is
/// converted until [`SampleBuffer::to_frame`] is called.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    bytes_per_row: usize,
    format: PixelFormat,
    timestamp: Duration,
    rotation: Rotation,
}

impl SampleBuffer {
    /// Wraps raw pixel bytes, checking that the geometry fits the buffer.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        bytes_per_row: usize,
        format: PixelFormat,
    ) -> Result<Self, DetectorError> {
        let row_bytes = width as usize * format.bytes_per_pixel();
        if width == 0 || height == 0 {
            return Err(DetectorError::InvalidFrame(format!(
                "empty frame {width}x{height}"
            )));
        }
        if bytes_per_row < row_bytes {
            return Err(DetectorError::InvalidFrame(format!(
                "row stride {bytes_per_row} shorter than {row_bytes} bytes of pixels"
            )));
        }
        let needed = bytes_per_row * (height as usize - 1) + row_bytes;
        if data.len() < needed {
            return Err(DetectorError::InvalidFrame(format!(
                "buffer holds {} bytes, {needed} required for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            bytes_per_row,
            format,
            timestamp: Duration::ZERO,
            rotation: Rotation::None,
        })
    }

    /// Tightly packed buffer (no row padding).
    pub fn packed(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, DetectorError> {
        let stride = width as usize * format.bytes_per_pixel();
        Self::new(data, width, height, stride, format)
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Rotation that makes the frame portrait.
    ///
    /// An explicit rotation wins; otherwise landscape buffers are turned a
    /// quarter clockwise.
    pub fn portrait_rotation(&self) -> Rotation {
        if self.rotation != Rotation::None {
            self.rotation
        } else if self.width > self.height {
            Rotation::Clockwise90
        } else {
            Rotation::None
        }
    }

    /// Frame size after applying [`SampleBuffer::portrait_rotation`].
    pub fn portrait_size(&self) -> Size {
        rotated_size(self.width, self.height, self.portrait_rotation())
    }

    /// Frame size after applying the buffer's own rotation.
    pub fn display_size(&self) -> Size {
        rotated_size(self.width, self.height, self.rotation)
    }

    /// Converts to an RGB frame, applying the buffer's own rotation.
    pub fn to_frame(&self, index: usize) -> Frame {
        self.to_rotated_frame(self.rotation, index)
    }

    /// Converts to an RGB frame in portrait orientation.
    pub fn to_portrait_frame(&self, index: usize) -> Frame {
        self.to_rotated_frame(self.portrait_rotation(), index)
    }

    fn to_rotated_frame(&self, rotation: Rotation, index: usize) -> Frame {
        let (sw, sh) = (self.width as usize, self.height as usize);
        let Size {
            width: dw,
            height: dh,
        } = rotated_size(self.width, self.height, rotation);
        let bpp = self.format.bytes_per_pixel();

        let mut out = Vec::with_capacity(dw as usize * dh as usize * Frame::CHANNELS);
        for dy in 0..dh as usize {
            for dx in 0..dw as usize {
                let (sx, sy) = match rotation {
                    Rotation::None => (dx, dy),
                    Rotation::Clockwise90 => (dy, sh - 1 - dx),
                    Rotation::Clockwise180 => (sw - 1 - dx, sh - 1 - dy),
                    Rotation::Clockwise270 => (sw - 1 - dy, dx),
                };
                let offset = sy * self.bytes_per_row + sx * bpp;
                out.extend_from_slice(&self.format.to_rgb(&self.data[offset..offset + bpp]));
            }
        }
        Frame::new(out, dw, dh, index)
    }
}

fn rotated_size(width: u32, height: u32, rotation: Rotation) -> Size {
    if rotation.swaps_dimensions() {
        Size::new(height, width)
    } else {
        Size::new(width, height)
    }
}

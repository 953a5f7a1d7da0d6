use std::path::PathBuf;

use crate::shared::sample_buffer::Rotation;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
    pub rotation: Rotation,
}

impl VideoMetadata {
    /// Delay between frames when replaying at the native rate.
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        if self.fps > 0.0 {
            Some(std::time::Duration::from_secs_f64(1.0 / self.fps))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn metadata(fps: f64) -> VideoMetadata {
        VideoMetadata {
            width: 1920,
            height: 1080,
            fps,
            total_frames: 900,
            codec: "h264".to_string(),
            source_path: Some(PathBuf::from("/tmp/test.mp4")),
            rotation: Rotation::None,
        }
    }

    #[test]
    fn test_frame_interval_from_fps() {
        let interval = metadata(25.0).frame_interval().unwrap();
        assert_relative_eq!(interval.as_secs_f64(), 0.04, epsilon = 1e-9);
    }

    #[test]
    fn test_frame_interval_unknown_fps() {
        assert_eq!(metadata(0.0).frame_interval(), None);
    }
}

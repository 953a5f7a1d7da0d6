use std::path::Path;

use crate::shared::sample_buffer::SampleBuffer;
use crate::shared::video_metadata::VideoMetadata;

/// Produces raw sample buffers from a video file or capture device.
///
/// Buffers are handed out the way a camera delivers them: native pixel
/// layout, row padding intact, with the stream's rotation attached.
pub trait FrameSource: Send {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Iterates buffers in presentation order.
    fn buffers(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<SampleBuffer, Box<dyn std::error::Error>>> + '_>;

    fn close(&mut self);
}

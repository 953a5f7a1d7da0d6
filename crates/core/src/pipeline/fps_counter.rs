use std::time::{Duration, Instant};

use crate::detection::domain::detection_result::DetectionStats;

const WINDOW: Duration = Duration::from_secs(1);

/// Rolling one-second frame-rate window for live detection.
#[derive(Debug)]
pub struct FpsCounter {
    window_start: Instant,
    submitted: usize,
    processed: usize,
    last: DetectionStats,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            submitted: 0,
            processed: 0,
            last: DetectionStats::default(),
        }
    }

    /// Adds frames offered for detection, whether or not they get processed.
    pub fn frames_submitted(&mut self, count: usize) {
        self.submitted += count;
    }

    /// Records one processed frame. Returns fresh stats once the current
    /// window has lasted at least a second.
    pub fn frame_processed(
        &mut self,
        now: Instant,
        inference_time: Duration,
        detection_count: usize,
    ) -> Option<DetectionStats> {
        self.processed += 1;
        self.last.inference_time_ms = inference_time.as_secs_f64() * 1000.0;
        self.last.detection_count = detection_count;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < WINDOW {
            return None;
        }

        self.last.fps = self.processed as f64 / elapsed.as_secs_f64();
        self.last.submitted_frames = self.submitted;
        log::debug!(
            "{} of {} frames processed in {:.2}s",
            self.processed,
            self.submitted,
            elapsed.as_secs_f64()
        );
        self.window_start = now;
        self.submitted = 0;
        self.processed = 0;
        Some(self.last)
    }

    pub fn stats(&self) -> DetectionStats {
        self.last
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

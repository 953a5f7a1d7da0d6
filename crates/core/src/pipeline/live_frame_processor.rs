use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::detection::domain::detection_result::{DetectionResult, DetectionStats};
use crate::shared::bounding_box::Size;
use crate::shared::sample_buffer::SampleBuffer;

use super::detector_session::DetectorSession;
use super::fps_counter::FpsCounter;

/// Detections for one processed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOutcome {
    pub detections: Vec<DetectionResult>,
    /// Size of the frame the boxes refer to, after orientation correction.
    pub video_size: Size,
    pub timestamp: Duration,
}

pub enum ProcessorMessage {
    Frame(FrameOutcome),
    Stats(DetectionStats),
    Error(String),
}

#[derive(Clone, Copy)]
struct Thresholds {
    confidence: f32,
    nms: f32,
}

/// State shared between the submitting thread and the worker.
struct Shared {
    busy: AtomicBool,
    paused: AtomicBool,
    submitted: AtomicUsize,
    dropped: AtomicUsize,
    thresholds: Mutex<Thresholds>,
    stats: Mutex<DetectionStats>,
}

/// Runs detection on a background thread, one frame at a time.
///
/// Frames arriving while the worker is busy or paused are dropped rather
/// than queued, so results never lag behind a live source.
pub struct LiveFrameProcessor {
    frames: Option<Sender<SampleBuffer>>,
    messages: Receiver<ProcessorMessage>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<DetectorSession>>,
}

impl LiveFrameProcessor {
    pub fn spawn(session: DetectorSession, confidence_threshold: f32, nms_threshold: f32) -> Self {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<SampleBuffer>(1);
        let (msg_tx, msg_rx) = crossbeam_channel::unbounded::<ProcessorMessage>();
        let shared = Arc::new(Shared {
            busy: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            submitted: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            thresholds: Mutex::new(Thresholds {
                confidence: confidence_threshold,
                nms: nms_threshold,
            }),
            stats: Mutex::new(DetectionStats::default()),
        });

        let worker_shared = shared.clone();
        let handle = thread::spawn(move || run_worker(session, &frame_rx, &msg_tx, &worker_shared));

        Self {
            frames: Some(frame_tx),
            messages: msg_rx,
            shared,
            handle: Some(handle),
        }
    }

    /// Hands a frame to the worker. Returns `false` if it was dropped.
    pub fn submit(&self, buffer: SampleBuffer) -> bool {
        let Some(frames) = self.frames.as_ref() else {
            return false;
        };
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        if self.shared.paused.load(Ordering::Relaxed)
            || self.shared.busy.swap(true, Ordering::AcqRel)
        {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if frames.try_send(buffer).is_err() {
            self.shared.busy.store(false, Ordering::Release);
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    pub fn messages(&self) -> &Receiver<ProcessorMessage> {
        &self.messages
    }

    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    /// Thresholds apply from the next processed frame on.
    pub fn set_thresholds(&self, confidence_threshold: f32, nms_threshold: f32) {
        let mut t = self
            .shared
            .thresholds
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        t.confidence = confidence_threshold;
        t.nms = nms_threshold;
    }

    /// Most recent per-second statistics.
    pub fn stats(&self) -> DetectionStats {
        *self
            .shared
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dropped_frames(&self) -> usize {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stops the worker after any in-flight frame and hands the session back.
    pub fn shutdown(mut self) -> Option<DetectorSession> {
        self.stop()
    }

    fn stop(&mut self) -> Option<DetectorSession> {
        self.frames = None;
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(session) => Some(session),
            Err(_) => {
                log::error!("Detection worker panicked");
                None
            }
        }
    }
}

impl Drop for LiveFrameProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    mut session: DetectorSession,
    frames: &Receiver<SampleBuffer>,
    messages: &Sender<ProcessorMessage>,
    shared: &Shared,
) -> DetectorSession {
    let mut fps = FpsCounter::new();

    for buffer in frames.iter() {
        let t = *shared
            .thresholds
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let result = session.detect_sample_buffer(&buffer, t.confidence, t.nms);
        shared.busy.store(false, Ordering::Release);

        match result {
            Ok(detections) => {
                fps.frames_submitted(shared.submitted.swap(0, Ordering::Relaxed));
                let window = fps.frame_processed(
                    Instant::now(),
                    session.last_inference_time(),
                    detections.len(),
                );
                let _ = messages.send(ProcessorMessage::Frame(FrameOutcome {
                    detections,
                    video_size: session.frame_size(&buffer),
                    timestamp: buffer.timestamp(),
                }));
                if let Some(stats) = window {
                    *shared.stats.lock().unwrap_or_else(PoisonError::into_inner) = stats;
                    let _ = messages.send(ProcessorMessage::Stats(stats));
                }
            }
            Err(e) => {
                log::warn!("Detection failed: {e}");
                let _ = messages.send(ProcessorMessage::Error(e.to_string()));
            }
        }
    }

    log::debug!("Detection worker stopped");
    session
}

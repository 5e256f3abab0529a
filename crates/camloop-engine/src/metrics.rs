//! Metrics collection and reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use camloop_ipc::{SegmentReport, SessionMetrics};

/// Live pipeline counters sampled by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSample {
    pub frames_captured: u64,
    pub frames_shown: u64,
    pub display_drops: u64,
    pub recording_drops: u64,
}

/// Collects session metrics.
pub struct MetricsCollector {
    start_time: RwLock<Option<Instant>>,
    frames_captured: AtomicU64,
    frames_shown: AtomicU64,
    frames_recorded: AtomicU64,
    display_drops: AtomicU64,
    recording_drops: AtomicU64,
    segments_completed: AtomicU64,
    segments_failed: AtomicU64,
    last_report_time: RwLock<Instant>,
    last_frame_count: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: RwLock::new(None),
            frames_captured: AtomicU64::new(0),
            frames_shown: AtomicU64::new(0),
            frames_recorded: AtomicU64::new(0),
            display_drops: AtomicU64::new(0),
            recording_drops: AtomicU64::new(0),
            segments_completed: AtomicU64::new(0),
            segments_failed: AtomicU64::new(0),
            last_report_time: RwLock::new(Instant::now()),
            last_frame_count: AtomicU64::new(0),
        }
    }

    /// Start the uptime clock.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
        *self.last_report_time.write() = Instant::now();
    }

    /// Record the latest pipeline counters.
    pub fn update(&self, sample: PipelineSample) {
        self.frames_captured
            .store(sample.frames_captured, Ordering::Relaxed);
        self.frames_shown.store(sample.frames_shown, Ordering::Relaxed);
        self.display_drops
            .store(sample.display_drops, Ordering::Relaxed);
        self.recording_drops
            .store(sample.recording_drops, Ordering::Relaxed);
    }

    /// Record a stopped segment.
    pub fn record_segment(&self, report: &SegmentReport) {
        self.frames_recorded
            .fetch_add(report.frames_written, Ordering::Relaxed);
        if report.finalized && report.error.is_none() {
            self.segments_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.segments_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a segment whose writer never opened.
    pub fn record_segment_failed(&self) {
        self.segments_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> SessionMetrics {
        let now = Instant::now();

        let last_time = *self.last_report_time.read();
        let elapsed = now.duration_since(last_time).as_secs_f32();
        let current_frames = self.frames_captured.load(Ordering::Relaxed);
        let last_frames = self.last_frame_count.load(Ordering::Relaxed);

        let capture_fps = if elapsed > 0.0 {
            current_frames.saturating_sub(last_frames) as f32 / elapsed
        } else {
            0.0
        };

        let uptime_seconds = self
            .start_time
            .read()
            .map(|s| now.duration_since(s).as_secs())
            .unwrap_or(0);

        SessionMetrics {
            frames_captured: current_frames,
            frames_shown: self.frames_shown.load(Ordering::Relaxed),
            frames_recorded: self.frames_recorded.load(Ordering::Relaxed),
            display_drops: self.display_drops.load(Ordering::Relaxed),
            recording_drops: self.recording_drops.load(Ordering::Relaxed),
            segments_completed: self.segments_completed.load(Ordering::Relaxed),
            segments_failed: self.segments_failed.load(Ordering::Relaxed),
            capture_fps,
            uptime_seconds,
        }
    }

    /// Update last report time for FPS calculation.
    pub fn mark_reported(&self) {
        *self.last_report_time.write() = Instant::now();
        self.last_frame_count.store(
            self.frames_captured.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

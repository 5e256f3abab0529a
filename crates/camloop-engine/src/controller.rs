//! Session controller.
//!
//! Runs one capture/display/record session: pre-roll, a single capture and
//! display for the whole session, and a fresh recorder per segment bound to
//! the session-long recording subscription.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use camloop_capture::{
    CancelToken, Capture, CaptureBackend, DeviceDescriptor, FrameDispatcher, StatusReporter,
    Subscription,
};
use camloop_display::{Display, DisplayOptions, RenderSurface};
use camloop_encoder::{Recorder, RecorderOptions, SegmentSpec, WriterFactory};
use camloop_ipc::{
    ComponentKind, SegmentReport, SessionConfig, SessionEvent, SessionMetrics, SessionState,
    StopReason,
};

use crate::clock::SessionClock;
use crate::error::SessionError;
use crate::metrics::{MetricsCollector, PipelineSample};
use crate::naming;
use crate::SessionResult;

/// Longest the controller sleeps before checking whether the recorder quit.
const RECORDER_POLL: Duration = Duration::from_millis(50);

/// The collaborators a session runs against.
pub struct SessionBackends {
    /// Opens the camera.
    pub capture: Arc<dyn CaptureBackend>,

    /// Live preview surface. `None` runs without a display.
    pub surface: Option<Box<dyn RenderSurface>>,

    /// Opens one writer per segment.
    pub writer: Arc<dyn WriterFactory>,

    /// Schedules pre-roll and segment intervals.
    pub clock: Arc<dyn SessionClock>,
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Directory the segments were written to.
    pub directory: PathBuf,

    /// One report per segment index used, in order.
    pub segments: Vec<SegmentReport>,

    /// Why the session ended.
    pub reason: StopReason,

    /// Final counters.
    pub metrics: SessionMetrics,
}

impl SessionSummary {
    /// Segments that finished cleanly with at least one frame.
    pub fn completed(&self) -> impl Iterator<Item = &SegmentReport> {
        self.segments.iter().filter(|s| s.is_complete())
    }

    pub fn frames_recorded(&self) -> u64 {
        self.segments.iter().map(|s| s.frames_written).sum()
    }
}

/// Requests a graceful stop of a running session from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown: CancelToken,
    interrupt: CancelToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.cancel();
        self.interrupt.cancel();
    }
}

/// Components that live for the whole recording phase.
struct Pipeline {
    capture: Capture,
    display: Option<Display>,
    recording: Arc<Subscription>,
}

impl Pipeline {
    fn sample(&self) -> PipelineSample {
        PipelineSample {
            frames_captured: self.capture.frames_captured(),
            frames_shown: self.display.as_ref().map_or(0, Display::frames_shown),
            display_drops: self.display.as_ref().map_or(0, Display::frames_dropped),
            recording_drops: self.recording.dropped(),
        }
    }

    /// Stop display then capture, each with a bounded join.
    fn shutdown(&mut self) {
        if let Some(display) = self.display.as_mut() {
            if let Err(e) = display.stop() {
                error!("Failed to stop display: {}", e);
            }
        }
        if let Err(e) = self.capture.stop() {
            error!("Failed to stop capture: {}", e);
        }
    }
}

/// Orchestrates one session.
pub struct SessionController {
    config: SessionConfig,
    capture_backend: Arc<dyn CaptureBackend>,
    surface: Mutex<Option<Box<dyn RenderSurface>>>,
    writer_factory: Arc<dyn WriterFactory>,
    clock: Arc<dyn SessionClock>,
    event_tx: Option<Sender<SessionEvent>>,
    state: Arc<RwLock<SessionState>>,
    metrics: Arc<MetricsCollector>,
    shutdown: CancelToken,
    interrupt: CancelToken,
    ran: bool,
}

impl SessionController {
    pub fn new(config: SessionConfig, backends: SessionBackends) -> Self {
        Self {
            config,
            capture_backend: backends.capture,
            surface: Mutex::new(backends.surface),
            writer_factory: backends.writer,
            clock: backends.clock,
            event_tx: None,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            metrics: Arc::new(MetricsCollector::new()),
            shutdown: CancelToken::new(),
            interrupt: CancelToken::new(),
            ran: false,
        }
    }

    /// Publish session events on `event_tx`.
    pub fn with_events(mut self, event_tx: Sender<SessionEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
            interrupt: self.interrupt.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the session until shutdown, capture exit or the segment limit.
    #[instrument(name = "session_run", skip(self))]
    pub fn run(&mut self) -> SessionResult<SessionSummary> {
        if self.ran {
            return Err(SessionError::AlreadyRan);
        }
        self.ran = true;

        self.config.validate()?;
        info!("Session starting");
        self.metrics.start();

        let directory = naming::create_session_dir(&self.config.output_root, &Local::now())
            .map_err(|source| SessionError::OutputDirectory {
                path: self.config.output_root.clone(),
                source,
            })?;
        info!(dir = %directory.display(), "Writing segments");
        self.send_event(SessionEvent::OutputDirectory(directory.clone()));

        self.transition_to(SessionState::PreRoll);
        let pre_roll = self.config.pre_roll();
        if !pre_roll.is_zero() {
            info!(?pre_roll, "Waiting before capture starts");
        }
        if self.clock.sleep(pre_roll, &self.interrupt) {
            return Ok(self.finish(directory, Vec::new(), StopReason::ShutdownRequested, None));
        }

        let mut pipeline = match self.start_pipeline() {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("Session failed to start: {}", e);
                let reason = StopReason::CaptureFailed {
                    message: e.to_string(),
                };
                self.finish(directory, Vec::new(), reason, None);
                return Err(e);
            }
        };

        let mut segments = Vec::new();
        let mut index: u64 = 0;
        let reason = loop {
            if self.interrupt.is_cancelled() {
                break self.interrupt_reason(&pipeline.capture);
            }
            if self.config.max_segments.is_some_and(|max| index >= max) {
                info!(segments = index, "Segment limit reached");
                break StopReason::SegmentLimitReached;
            }

            let spec = self.segment_spec(index, &pipeline.capture, &directory);
            let report = self.record_segment(spec, &pipeline);
            segments.push(report);
            index += 1;
        };

        Ok(self.finish(directory, segments, reason, Some(&mut pipeline)))
    }

    fn start_pipeline(&self) -> SessionResult<Pipeline> {
        let descriptor = DeviceDescriptor::from_config(&self.config);
        let mut capture = Capture::open(self.capture_backend.as_ref(), descriptor)?
            .with_join_timeout(self.config.join_timeout());

        // Fresh buffers per session
        let dispatcher = FrameDispatcher::new();
        let recording = Arc::new(dispatcher.subscribe("recording", self.config.buffer_capacity));
        let display = self.start_display(&dispatcher);

        let reporter = self
            .reporter(ComponentKind::Capture)
            .wake_on_exit(self.interrupt.clone());
        if let Err(e) = capture.start(Arc::clone(&dispatcher), reporter) {
            if let Some(mut display) = display {
                let _ = display.stop();
            }
            return Err(e.into());
        }

        debug!(subscribers = ?dispatcher.subscriber_names(), "Pipeline running");
        Ok(Pipeline {
            capture,
            display,
            recording,
        })
    }

    fn start_display(&self, dispatcher: &Arc<FrameDispatcher>) -> Option<Display> {
        if !self.config.display_enabled {
            debug!("Display disabled");
            return None;
        }
        let Some(surface) = self.surface.lock().take() else {
            debug!("No render surface, running without display");
            return None;
        };

        let subscription = dispatcher.subscribe("display", self.config.buffer_capacity);
        let options = DisplayOptions::from_config(&self.config);
        let mut display = Display::new(surface, subscription, options);
        match display.start(self.reporter(ComponentKind::Display)) {
            Ok(()) => Some(display),
            Err(e) => {
                warn!("Display unavailable: {}", e);
                None
            }
        }
    }

    fn segment_spec(&self, index: u64, capture: &Capture, directory: &Path) -> SegmentSpec {
        let measured_fps = capture.measured_fps();
        let fps = self.config.fps_policy.segment_fps(measured_fps);
        let size = capture.measured_size();
        debug!(index, measured_fps, fps, %size, "Segment parameters");

        SegmentSpec {
            index,
            path: naming::segment_path(directory, index, self.writer_factory.extension()),
            codec: self.config.codec.clone(),
            fps,
            size,
        }
    }

    /// Open, run and stop one segment. The index is consumed either way.
    #[instrument(name = "record_segment", skip_all, fields(index = spec.index))]
    fn record_segment(&self, spec: SegmentSpec, pipeline: &Pipeline) -> SegmentReport {
        let index = spec.index;
        let path = spec.path.clone();

        let recorder_exit = CancelToken::new();
        let reporter = self
            .reporter(ComponentKind::Recorder)
            .wake_on_exit(recorder_exit.clone());

        let opened = Recorder::open(
            self.writer_factory.as_ref(),
            spec.clone(),
            Arc::clone(&pipeline.recording),
            RecorderOptions::from_config(&self.config),
        )
        .and_then(|mut recorder| match recorder.start(reporter) {
            Ok(()) => Ok(recorder),
            Err(e) => {
                drop(recorder);
                discard_segment(&path);
                Err(e)
            }
        });

        let mut recorder = match opened {
            Ok(recorder) => recorder,
            Err(e) => {
                warn!(path = %path.display(), "Skipping segment: {}", e);
                self.metrics.record_segment_failed();
                self.send_event(SessionEvent::SegmentFailed {
                    index,
                    path: path.clone(),
                    message: e.to_string(),
                });
                self.clock
                    .sleep(self.config.writer_retry_delay(), &self.interrupt);
                return SegmentReport {
                    index,
                    path,
                    frames_written: 0,
                    finalized: false,
                    error: Some(e.to_string()),
                };
            }
        };

        self.transition_to(SessionState::Recording { segment: index });
        self.send_event(SessionEvent::SegmentStarted {
            index,
            path: path.clone(),
            fps: spec.fps,
            size: spec.size,
        });

        self.wait_segment(pipeline, &recorder_exit);

        let report = match recorder.stop() {
            Ok(report) => report,
            Err(e) => {
                error!("Failed to stop recorder: {}", e);
                SegmentReport {
                    index,
                    path,
                    frames_written: recorder.frames_written(),
                    finalized: false,
                    error: Some(e.to_string()),
                }
            }
        };

        info!(
            frames = report.frames_written,
            finalized = report.finalized,
            "Segment finished"
        );
        self.metrics.record_segment(&report);
        self.send_event(SessionEvent::SegmentFinished(report.clone()));
        report
    }

    /// Sleep out the segment interval, reporting metrics along the way.
    ///
    /// Returns early on interrupt or when the recorder exits on its own, so a
    /// failed segment rotates straight into the next one.
    fn wait_segment(&self, pipeline: &Pipeline, recorder_exit: &CancelToken) {
        let deadline = self.clock.elapsed() + self.config.segment_duration();
        let interval = self.config.metrics_interval();
        let mut next_metrics = self.clock.elapsed() + interval;

        loop {
            if recorder_exit.is_cancelled() {
                warn!("Recorder exited before the segment ended, rotating");
                return;
            }
            let now = self.clock.elapsed();
            if now >= deadline {
                return;
            }
            let step = (deadline - now).min(RECORDER_POLL);
            if self.clock.sleep(step, &self.interrupt) {
                return;
            }
            if !interval.is_zero() && self.clock.elapsed() >= next_metrics {
                self.emit_metrics(pipeline);
                next_metrics += interval;
            }
        }
    }

    fn interrupt_reason(&self, capture: &Capture) -> StopReason {
        if self.shutdown.is_cancelled() {
            return StopReason::ShutdownRequested;
        }
        match capture.failure() {
            Some(message) => StopReason::CaptureFailed { message },
            None => StopReason::CaptureEnded,
        }
    }

    fn finish(
        &self,
        directory: PathBuf,
        segments: Vec<SegmentReport>,
        reason: StopReason,
        pipeline: Option<&mut Pipeline>,
    ) -> SessionSummary {
        info!(reason = %reason.message(), "Stopping session");
        self.transition_to(SessionState::Stopping {
            reason: reason.clone(),
        });

        if let Some(pipeline) = pipeline {
            pipeline.shutdown();
            self.metrics.update(pipeline.sample());
        }

        let metrics = self.metrics.snapshot();
        self.send_event(SessionEvent::Metrics(metrics.clone()));
        self.send_event(SessionEvent::SessionEnded {
            reason: reason.clone(),
        });
        self.transition_to(SessionState::Finished {
            reason: reason.clone(),
        });

        info!(
            segments = segments.len(),
            captured = metrics.frames_captured,
            recorded = metrics.frames_recorded,
            "Session finished"
        );

        SessionSummary {
            directory,
            segments,
            reason,
            metrics,
        }
    }

    fn emit_metrics(&self, pipeline: &Pipeline) {
        self.metrics.update(pipeline.sample());
        let metrics = self.metrics.snapshot();
        debug!(
            captured = metrics.frames_captured,
            shown = metrics.frames_shown,
            recording_drops = metrics.recording_drops,
            fps = metrics.capture_fps,
            "Session metrics"
        );
        self.send_event(SessionEvent::Metrics(metrics));
        self.metrics.mark_reported();
    }

    fn reporter(&self, component: ComponentKind) -> StatusReporter {
        StatusReporter::new(component, self.event_tx.clone())
    }

    fn transition_to(&self, new_state: SessionState) {
        let previous = {
            let mut state = self.state.write();
            let prev = state.clone();
            *state = new_state.clone();
            prev
        };

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.send_event(SessionEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        });
    }

    fn send_event(&self, event: SessionEvent) {
        if let Some(ref event_tx) = self.event_tx {
            if let Err(e) = event_tx.try_send(event) {
                warn!("Failed to send event: {}", e);
            }
        }
    }
}

/// Remove whatever a writer left behind for a segment that never ran.
fn discard_segment(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed partial segment"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove partial segment: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use bytes::Bytes;
    use camloop_capture::{
        CaptureDevice, CaptureError, CaptureResult, CaptureTimestamp, CapturedFrame, PixelFormat,
        TestPatternSource,
    };
    use camloop_display::HeadlessSurface;
    use camloop_encoder::{EncoderError, EncoderResult, SegmentWriter, Y4mWriterFactory};
    use camloop_ipc::{FrameSize, Geometry};

    use crate::clock::{SimulatedClock, SystemClock};

    const WIDTH: u32 = 8;
    const HEIGHT: u32 = 6;

    /// Camera that advances a simulated clock by one frame period per read.
    struct SimulatedCamera {
        clock: Arc<SimulatedClock>,
        fps: u32,
        frames: u64,
        fail_after: Option<u64>,
        sequence: u64,
        start: Instant,
    }

    impl CaptureDevice for SimulatedCamera {
        fn read(&mut self) -> CaptureResult<CapturedFrame> {
            if self.fail_after == Some(self.sequence) {
                return Err(CaptureError::ReadFailed("usb disconnected".to_string()));
            }
            if self.sequence >= self.frames {
                return Err(CaptureError::EndOfStream);
            }

            thread::sleep(Duration::from_millis(1));
            self.clock
                .advance(Duration::from_nanos(1_000_000_000 / self.fps as u64));

            let frame = CapturedFrame::new(
                Bytes::from(vec![0x55; (WIDTH * HEIGHT * 3) as usize]),
                WIDTH,
                HEIGHT,
                PixelFormat::Bgr24,
                CaptureTimestamp::now(self.start),
                self.sequence,
            );
            self.sequence += 1;
            Ok(frame)
        }

        fn measured_fps(&self) -> u32 {
            self.fps
        }

        fn measured_size(&self) -> FrameSize {
            FrameSize::new(WIDTH, HEIGHT)
        }
    }

    struct SimulatedBackend {
        clock: Arc<SimulatedClock>,
        frames: u64,
        fail_after: Option<u64>,
    }

    impl CaptureBackend for SimulatedBackend {
        fn open(&self, descriptor: &DeviceDescriptor) -> CaptureResult<Box<dyn CaptureDevice>> {
            Ok(Box::new(SimulatedCamera {
                clock: Arc::clone(&self.clock),
                fps: descriptor.framerate,
                frames: self.frames,
                fail_after: self.fail_after,
                sequence: 0,
                start: Instant::now(),
            }))
        }

        fn name(&self) -> &'static str {
            "simulated"
        }
    }

    #[derive(Debug, Clone, Default)]
    struct WrittenSegment {
        index: u64,
        frames: u64,
        finished: u64,
        fps: u32,
    }

    /// Writer factory that keeps segments in memory.
    #[derive(Default)]
    struct MemoryFactory {
        fail_index: Option<u64>,
        /// Segment index whose writer fails after this many frames.
        fail_write: Option<(u64, u64)>,
        segments: Arc<Mutex<Vec<WrittenSegment>>>,
        opened: AtomicU64,
    }

    struct MemoryWriter {
        slot: usize,
        fail_after: Option<u64>,
        segments: Arc<Mutex<Vec<WrittenSegment>>>,
    }

    impl SegmentWriter for MemoryWriter {
        fn write(&mut self, _frame: &CapturedFrame) -> EncoderResult<()> {
            let mut segments = self.segments.lock();
            if self.fail_after == Some(segments[self.slot].frames) {
                return Err(EncoderError::WriteFailed("disk full".to_string()));
            }
            segments[self.slot].frames += 1;
            Ok(())
        }

        fn finish(&mut self) -> EncoderResult<()> {
            self.segments.lock()[self.slot].finished += 1;
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.segments.lock()[self.slot].frames
        }
    }

    impl WriterFactory for MemoryFactory {
        fn open(&self, spec: &SegmentSpec) -> EncoderResult<Box<dyn SegmentWriter>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.fail_index == Some(spec.index) {
                return Err(EncoderError::WriterUnavailable {
                    path: spec.path.clone(),
                    message: "sink refused".to_string(),
                });
            }
            let mut segments = self.segments.lock();
            segments.push(WrittenSegment {
                index: spec.index,
                fps: spec.fps,
                ..Default::default()
            });
            let fail_after = self
                .fail_write
                .and_then(|(index, after)| (index == spec.index).then_some(after));
            Ok(Box::new(MemoryWriter {
                slot: segments.len() - 1,
                fail_after,
                segments: Arc::clone(&self.segments),
            }))
        }

        fn extension(&self) -> &'static str {
            "mem"
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }

    fn simulated_config(root: &Path) -> SessionConfig {
        SessionConfig {
            output_root: root.to_path_buf(),
            pre_roll_secs: 0,
            segment_duration_secs: 10,
            capture_width: WIDTH,
            capture_height: HEIGHT,
            framerate: 30,
            max_segments: Some(3),
            display_geometry: Geometry::at_origin(4, 3),
            ..SessionConfig::default()
        }
    }

    struct Harness {
        controller: SessionController,
        factory: Arc<MemoryFactory>,
        surface: Arc<camloop_display::SurfaceStats>,
    }

    fn simulated_session(
        root: &Path,
        fail_index: Option<u64>,
        fail_after: Option<u64>,
    ) -> Harness {
        let clock = Arc::new(SimulatedClock::new());
        let factory = Arc::new(MemoryFactory {
            fail_index,
            ..Default::default()
        });
        let surface = HeadlessSurface::new("Video Feed", Geometry::at_origin(4, 3));
        let stats = surface.stats();

        let backends = SessionBackends {
            capture: Arc::new(SimulatedBackend {
                clock: Arc::clone(&clock),
                frames: 900,
                fail_after,
            }),
            surface: Some(Box::new(surface)),
            writer: Arc::clone(&factory) as Arc<dyn WriterFactory>,
            clock,
        };

        Harness {
            controller: SessionController::new(simulated_config(root), backends),
            factory,
            surface: stats,
        }
    }

    #[test]
    fn test_three_rotations_with_simulated_capture() {
        let root = tempfile::tempdir().unwrap();
        let mut harness = simulated_session(root.path(), None, None);

        let summary = harness.controller.run().unwrap();

        let indices: Vec<u64> = summary.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(summary.completed().count(), 3);
        for (i, report) in summary.segments.iter().enumerate() {
            assert!(report.frames_written > 0);
            assert_eq!(
                report.path,
                summary.directory.join(format!("video_{i}.mem"))
            );
        }

        let written = harness.factory.segments.lock().clone();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|s| s.finished == 1));
        assert!(written.iter().all(|s| s.fps == 12));

        let produced = summary.metrics.frames_captured;
        assert!(produced > 0 && produced <= 900);
        assert!(summary.frames_recorded() <= produced);
        assert!(summary.metrics.frames_shown <= produced);
        assert_eq!(summary.metrics.frames_shown, harness.surface.shown());
        assert!(harness.surface.is_closed());
        assert!(harness.controller.state().is_finished());
    }

    #[test]
    fn test_writer_open_failure_consumes_index() {
        let root = tempfile::tempdir().unwrap();
        let mut harness = simulated_session(root.path(), Some(1), None);
        let (tx, rx) = crossbeam_channel::bounded(1024);
        harness.controller = harness.controller.with_events(tx);

        let summary = harness.controller.run().unwrap();

        assert_eq!(summary.reason, StopReason::SegmentLimitReached);
        assert_eq!(summary.segments.len(), 3);
        assert!(summary.segments[0].is_complete());
        assert!(!summary.segments[1].finalized);
        assert!(summary.segments[1].error.is_some());
        assert!(summary.segments[2].is_complete());
        assert_eq!(summary.metrics.segments_completed, 2);
        assert_eq!(summary.metrics.segments_failed, 1);

        let written: Vec<u64> = harness
            .factory
            .segments
            .lock()
            .iter()
            .map(|s| s.index)
            .collect();
        assert_eq!(written, vec![0, 2]);
        assert_eq!(harness.factory.opened.load(Ordering::SeqCst), 3);

        let events: Vec<SessionEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::SegmentFailed { index: 1, .. }
        )));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::StateChanged { current, .. })
                if matches!(**current, SessionState::Finished { .. })
        ));
    }

    #[test]
    fn test_write_failure_rotates_immediately() {
        let root = tempfile::tempdir().unwrap();
        let clock = Arc::new(SimulatedClock::new());
        let factory = Arc::new(MemoryFactory {
            fail_write: Some((0, 1)),
            ..Default::default()
        });
        let mut config = simulated_config(root.path());
        config.max_segments = Some(2);
        let mut controller = SessionController::new(
            config,
            SessionBackends {
                capture: Arc::new(SimulatedBackend {
                    clock: Arc::clone(&clock),
                    frames: 900,
                    fail_after: None,
                }),
                surface: None,
                writer: Arc::clone(&factory) as Arc<dyn WriterFactory>,
                clock,
            },
        );

        let summary = controller.run().unwrap();

        assert_eq!(summary.reason, StopReason::SegmentLimitReached);
        let failed = &summary.segments[0];
        assert_eq!(failed.frames_written, 1);
        assert!(failed.finalized);
        assert!(failed.error.is_some());
        assert!(summary.segments[1].is_complete());

        // Segment 1 starts right after the failure, not a full interval later
        assert!(
            summary.metrics.frames_captured < 450,
            "captured {}",
            summary.metrics.frames_captured
        );
        let written = factory.segments.lock().clone();
        assert!(written.iter().all(|s| s.finished == 1));
    }

    #[test]
    fn test_discard_segment_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video_4.y4m");
        std::fs::write(&path, b"YUV4MPEG2 W8 H6 F12:1 Ip A1:1 C420jpeg\n").unwrap();

        discard_segment(&path);
        assert!(!path.exists());

        // Already gone is fine
        discard_segment(&path);
    }

    #[test]
    fn test_capture_failure_ends_session_after_segment() {
        let root = tempfile::tempdir().unwrap();
        let mut harness = simulated_session(root.path(), None, Some(60));

        let summary = harness.controller.run().unwrap();

        assert!(matches!(summary.reason, StopReason::CaptureFailed { .. }));
        assert_eq!(summary.segments.len(), 1);
        assert!(summary.segments[0].finalized);
        assert!(summary.segments[0].frames_written > 0);
        assert_eq!(summary.metrics.frames_captured, 60);
    }

    #[test]
    fn test_capture_open_failure_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            output_root: root.path().to_path_buf(),
            pre_roll_secs: 0,
            device_index: 4,
            ..SessionConfig::default()
        };
        let mut controller = SessionController::new(
            config,
            SessionBackends {
                capture: Arc::new(TestPatternSource::new()),
                surface: None,
                writer: Arc::new(Y4mWriterFactory::new()),
                clock: Arc::new(SystemClock::new()),
            },
        );

        let err = controller.run().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Capture(CaptureError::DeviceUnavailable { device: 4, .. })
        ));
        assert!(matches!(
            controller.state(),
            SessionState::Finished {
                reason: StopReason::CaptureFailed { .. }
            }
        ));
        assert!(matches!(controller.run(), Err(SessionError::AlreadyRan)));
    }

    #[test]
    fn test_shutdown_during_segment_finalizes_y4m() {
        let root = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            output_root: root.path().to_path_buf(),
            pre_roll_secs: 0,
            segment_duration_secs: 600,
            capture_width: 64,
            capture_height: 48,
            display_geometry: Geometry::at_origin(32, 24),
            ..SessionConfig::default()
        };
        let mut controller = SessionController::new(
            config,
            SessionBackends {
                capture: Arc::new(TestPatternSource::new()),
                surface: Some(Box::new(HeadlessSurface::new(
                    "Video Feed",
                    Geometry::at_origin(32, 24),
                ))),
                writer: Arc::new(Y4mWriterFactory::new()),
                clock: Arc::new(SystemClock::new()),
            },
        );
        let handle = controller.shutdown_handle();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            handle.shutdown();
        });
        let started = Instant::now();
        let summary = controller.run().unwrap();
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(summary.reason, StopReason::ShutdownRequested);
        assert_eq!(summary.segments.len(), 1);

        let segment = &summary.segments[0];
        assert!(segment.finalized);
        let bytes = std::fs::read(&segment.path).unwrap();
        assert!(bytes.starts_with(b"YUV4MPEG2 W64 H48 F12:1"));
        let frame_len = b"FRAME\n".len() + 64 * 48 * 3 / 2;
        let header_len = bytes.iter().position(|&b| b == b'\n').unwrap() + 1;
        assert_eq!(
            (bytes.len() - header_len) as u64,
            segment.frames_written * frame_len as u64
        );
    }

    #[test]
    fn test_shutdown_during_pre_roll() {
        let root = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            output_root: root.path().to_path_buf(),
            pre_roll_secs: 3600,
            ..SessionConfig::default()
        };
        let mut controller = SessionController::new(
            config,
            SessionBackends {
                capture: Arc::new(TestPatternSource::new()),
                surface: None,
                writer: Arc::new(Y4mWriterFactory::new()),
                clock: Arc::new(SystemClock::new()),
            },
        );
        controller.shutdown_handle().shutdown();

        let summary = controller.run().unwrap();
        assert_eq!(summary.reason, StopReason::ShutdownRequested);
        assert!(summary.segments.is_empty());
        assert!(summary.directory.is_dir());
        assert_eq!(summary.directory.parent(), Some(root.path()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            segment_duration_secs: 0,
            ..SessionConfig::default()
        };
        let mut controller = SessionController::new(
            config,
            SessionBackends {
                capture: Arc::new(TestPatternSource::new()),
                surface: None,
                writer: Arc::new(Y4mWriterFactory::new()),
                clock: Arc::new(SystemClock::new()),
            },
        );
        assert!(matches!(controller.run(), Err(SessionError::Config(_))));
    }
}

//! Per-segment recorder.
//!
//! One `Recorder` writes exactly one segment and is never reused. The
//! recording subscription outlives every recorder, so frames produced after
//! one segment's stop wait in the buffer for the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, trace};

use camloop_capture::{
    catch_worker_panic, CancelToken, StateCell, StatusReporter, Subscription, WorkerHandle,
    DEFAULT_JOIN_TIMEOUT,
};
use camloop_ipc::{ComponentState, SegmentReport, SessionConfig};

use crate::error::EncoderError;
use crate::{EncoderResult, SegmentSpec, SegmentWriter, WriterFactory};

/// Timing knobs for the recorder loop.
#[derive(Debug, Clone, Copy)]
pub struct RecorderOptions {
    /// How long to wait for a frame before checking for cancellation.
    pub idle_backoff: Duration,

    /// Bound on joining the recorder thread.
    pub join_timeout: Duration,
}

impl RecorderOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            idle_backoff: config.idle_backoff(),
            join_timeout: config.join_timeout(),
        }
    }
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(5),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// Records one segment from the shared recording subscription.
pub struct Recorder {
    spec: SegmentSpec,
    writer: Option<Box<dyn SegmentWriter>>,
    subscription: Arc<Subscription>,
    options: RecorderOptions,
    state: StateCell,
    cancel: CancelToken,
    worker: Option<WorkerHandle>,
    frames_written: Arc<AtomicU64>,
    report: Arc<Mutex<Option<SegmentReport>>>,
}

impl Recorder {
    /// Open the segment's writer. Nothing is started on failure.
    #[instrument(name = "recorder_open", skip_all, fields(index = spec.index, factory = factory.name()))]
    pub fn open(
        factory: &dyn WriterFactory,
        spec: SegmentSpec,
        subscription: Arc<Subscription>,
        options: RecorderOptions,
    ) -> EncoderResult<Self> {
        let writer = factory.open(&spec)?;
        debug!(path = %spec.path.display(), fps = spec.fps, size = %spec.size, "Segment writer opened");

        Ok(Self {
            spec,
            writer: Some(writer),
            subscription,
            options,
            state: StateCell::new(ComponentState::Stopped),
            cancel: CancelToken::new(),
            worker: None,
            frames_written: Arc::new(AtomicU64::new(0)),
            report: Arc::new(Mutex::new(None)),
        })
    }

    /// Start draining the subscription into the writer.
    #[instrument(name = "recorder_start", skip_all, fields(index = self.spec.index))]
    pub fn start(&mut self, reporter: StatusReporter) -> EncoderResult<()> {
        if self.worker.is_some() {
            return Err(EncoderError::AlreadyStarted);
        }
        let writer = self.writer.take().ok_or(EncoderError::AlreadyStarted)?;

        let ctx = RecordLoop {
            spec: self.spec.clone(),
            writer,
            subscription: Arc::clone(&self.subscription),
            idle_backoff: self.options.idle_backoff,
            cancel: self.cancel.clone(),
            state: self.state.clone(),
            frames_written: Arc::clone(&self.frames_written),
            report: Arc::clone(&self.report),
            reporter: reporter.clone(),
        };

        self.state.set(ComponentState::Running);
        reporter.state_changed(ComponentState::Running);

        match WorkerHandle::spawn("recorder", move || ctx.run()) {
            Ok(worker) => {
                self.worker = Some(worker);
                info!(path = %self.spec.path.display(), "Recording segment");
                Ok(())
            }
            Err(e) => {
                self.state.set(ComponentState::Failed);
                Err(EncoderError::ThreadSpawn(e))
            }
        }
    }

    /// Stop recording, finalize the file and return the segment outcome.
    #[instrument(name = "recorder_stop", skip(self), fields(index = self.spec.index))]
    pub fn stop(&mut self) -> EncoderResult<SegmentReport> {
        self.cancel.cancel();

        if let Some(mut worker) = self.worker.take() {
            self.state
                .transition(ComponentState::Running, ComponentState::Stopping);
            worker.join_timeout(self.options.join_timeout)?;
            self.state
                .transition(ComponentState::Stopping, ComponentState::Stopped);
        } else if let Some(mut writer) = self.writer.take() {
            // Never started: finalize the empty segment here
            let report = finalize(&self.spec, writer.as_mut(), None);
            *self.report.lock() = Some(report);
        }

        let report = self
            .report
            .lock()
            .clone()
            .ok_or_else(|| EncoderError::WriteFailed("segment report missing".to_string()))?;

        info!(
            frames = report.frames_written,
            finalized = report.finalized,
            "Segment stopped"
        );
        Ok(report)
    }

    pub fn spec(&self) -> &SegmentSpec {
        &self.spec
    }

    pub fn state(&self) -> ComponentState {
        self.state.get()
    }

    /// Frames written to this segment so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.worker.is_some() || self.writer.is_some() {
            let _ = self.stop();
        }
    }
}

struct RecordLoop {
    spec: SegmentSpec,
    writer: Box<dyn SegmentWriter>,
    subscription: Arc<Subscription>,
    idle_backoff: Duration,
    cancel: CancelToken,
    state: StateCell,
    frames_written: Arc<AtomicU64>,
    report: Arc<Mutex<Option<SegmentReport>>>,
    reporter: StatusReporter,
}

impl RecordLoop {
    fn run(mut self) {
        debug!(index = self.spec.index, "Recorder loop starting");
        let failure = catch_worker_panic("recorder", || self.record_until_cancelled())
            .unwrap_or_else(Some);

        let report = finalize(&self.spec, self.writer.as_mut(), failure);
        let final_state = if report.error.is_some() {
            ComponentState::Failed
        } else {
            ComponentState::Stopped
        };
        let error = report.error.clone();
        *self.report.lock() = Some(report);

        self.state.set(final_state);
        self.reporter.state_changed(final_state);
        self.reporter.exited(error);
    }

    /// Write frames until cancelled, then drain the boundary snapshot.
    /// Returns the write error that ended the segment early, if any.
    fn record_until_cancelled(&mut self) -> Option<String> {
        while !self.cancel.is_cancelled() {
            let Some(frame) = self.subscription.pop_timeout(self.idle_backoff) else {
                continue;
            };
            if let Err(e) = self.write(&frame) {
                return Some(e.to_string());
            }
        }

        // Only what was buffered at the boundary belongs to this segment
        let pending = self.subscription.len();
        for _ in 0..pending {
            let Some(frame) = self.subscription.pop_front() else {
                break;
            };
            if let Err(e) = self.write(&frame) {
                return Some(e.to_string());
            }
        }
        debug!(drained = pending, "Recorder drained");
        None
    }

    fn write(&mut self, frame: &camloop_capture::CapturedFrame) -> EncoderResult<()> {
        match self.writer.write(frame) {
            Ok(()) => {
                self.frames_written.fetch_add(1, Ordering::Relaxed);
                trace!(sequence = frame.sequence, "Frame recorded");
                Ok(())
            }
            Err(e) => {
                error!(index = self.spec.index, "Failed to write frame: {}", e);
                Err(e)
            }
        }
    }
}

/// Finish the writer once and describe the segment.
fn finalize(
    spec: &SegmentSpec,
    writer: &mut dyn SegmentWriter,
    failure: Option<String>,
) -> SegmentReport {
    let (finalized, error) = match writer.finish() {
        Ok(()) => (true, failure),
        Err(e) => {
            error!(index = spec.index, "Failed to finalize segment: {}", e);
            (false, failure.or_else(|| Some(e.to_string())))
        }
    };

    SegmentReport {
        index: spec.index,
        path: spec.path.clone(),
        frames_written: writer.frames_written(),
        finalized,
        error,
    }
}

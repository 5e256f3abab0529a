//! Capture component: owns the camera and feeds the fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, trace};

use camloop_ipc::{ComponentState, FrameSize};

use crate::error::CaptureError;
use crate::fanout::FrameDispatcher;
use crate::lifecycle::{catch_worker_panic, CancelToken, StateCell, StatusReporter, WorkerHandle};
use crate::source::{CaptureBackend, CaptureDevice, DeviceDescriptor};
use crate::CaptureResult;

/// Default bound on joining the capture thread.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running (or ready to run) camera capture.
pub struct Capture {
    descriptor: DeviceDescriptor,
    device: Option<Box<dyn CaptureDevice>>,
    measured_fps: u32,
    measured_size: FrameSize,
    state: StateCell,
    cancel: CancelToken,
    worker: Option<WorkerHandle>,
    frames_captured: Arc<AtomicU64>,
    failure: Arc<Mutex<Option<String>>>,
    join_timeout: Duration,
}

impl Capture {
    /// Open the camera described by `descriptor`.
    ///
    /// The measured rate and size are read once here, so they stay
    /// available after the device is released.
    #[instrument(name = "capture_open", skip(backend), fields(backend = backend.name()))]
    pub fn open(backend: &dyn CaptureBackend, descriptor: DeviceDescriptor) -> CaptureResult<Self> {
        let device = backend.open(&descriptor)?;
        let measured_fps = device.measured_fps();
        let measured_size = device.measured_size();

        info!(
            device = descriptor.device_index,
            requested = %descriptor.requested_size(),
            measured = %measured_size,
            measured_fps,
            "Camera opened"
        );

        Ok(Self {
            descriptor,
            device: Some(device),
            measured_fps,
            measured_size,
            state: StateCell::new(ComponentState::Stopped),
            cancel: CancelToken::new(),
            worker: None,
            frames_captured: Arc::new(AtomicU64::new(0)),
            failure: Arc::new(Mutex::new(None)),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        })
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Start the capture loop, publishing every frame to `dispatcher`.
    #[instrument(name = "capture_start", skip_all)]
    pub fn start(
        &mut self,
        dispatcher: Arc<FrameDispatcher>,
        reporter: StatusReporter,
    ) -> CaptureResult<()> {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let device = self.device.take().ok_or(CaptureError::DeviceReleased)?;

        let cancel = self.cancel.clone();
        let state = self.state.clone();
        let frames = Arc::clone(&self.frames_captured);
        let failure = Arc::clone(&self.failure);

        state.set(ComponentState::Running);
        reporter.state_changed(ComponentState::Running);

        let worker = WorkerHandle::spawn("capture", move || {
            capture_loop(device, dispatcher, cancel, state, frames, failure, reporter);
        });

        match worker {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.state.set(ComponentState::Failed);
                Err(CaptureError::ThreadSpawn(e))
            }
        }
    }

    /// Signal the loop to stop and wait (bounded) for it to exit.
    #[instrument(name = "capture_stop", skip(self))]
    pub fn stop(&mut self) -> CaptureResult<()> {
        self.cancel.cancel();

        let Some(mut worker) = self.worker.take() else {
            // Never started: release the device here
            if let Some(mut device) = self.device.take() {
                device.close();
            }
            return Ok(());
        };

        self.state
            .transition(ComponentState::Running, ComponentState::Stopping);

        info!("Stopping capture");
        worker.join_timeout(self.join_timeout)?;

        self.state
            .transition(ComponentState::Stopping, ComponentState::Stopped);
        info!(frames = self.frames_captured(), "Capture stopped");
        Ok(())
    }

    pub fn state(&self) -> ComponentState {
        self.state.get()
    }

    /// Returns true while the capture loop is producing frames.
    pub fn is_running(&self) -> bool {
        self.state.get().is_running()
    }

    /// Error that ended the capture loop, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Frame rate measured when the device was opened.
    pub fn measured_fps(&self) -> u32 {
        self.measured_fps
    }

    /// Frame size measured when the device was opened.
    pub fn measured_size(&self) -> FrameSize {
        self.measured_size
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    dispatcher: Arc<FrameDispatcher>,
    cancel: CancelToken,
    state: StateCell,
    frames: Arc<AtomicU64>,
    failure: Arc<Mutex<Option<String>>>,
    reporter: StatusReporter,
) {
    debug!("Capture loop starting");
    let error = catch_worker_panic("capture", || {
        read_frames(device.as_mut(), &dispatcher, &cancel, &frames)
    })
    .unwrap_or_else(Some);

    device.close();
    drop(device);

    let final_state = if error.is_some() {
        ComponentState::Failed
    } else {
        ComponentState::Stopped
    };
    *failure.lock() = error.clone();
    state.set(final_state);
    reporter.state_changed(final_state);
    reporter.exited(error);

    debug!(frames = frames.load(Ordering::Relaxed), "Capture loop exited");
}

/// Read until cancelled or the device ends. Returns the fatal error, if any.
fn read_frames(
    device: &mut dyn CaptureDevice,
    dispatcher: &FrameDispatcher,
    cancel: &CancelToken,
    frames: &AtomicU64,
) -> Option<String> {
    while !cancel.is_cancelled() {
        match device.read() {
            Ok(frame) => {
                let sequence = frame.sequence;
                frames.fetch_add(1, Ordering::Relaxed);
                let delivered = dispatcher.publish(Arc::new(frame));
                trace!(sequence, delivered, "Frame published");
            }
            Err(CaptureError::EndOfStream) => {
                info!("Camera stream ended");
                return None;
            }
            Err(e) => {
                error!("Failed to capture video frame: {}", e);
                return Some(e.to_string());
            }
        }
    }
    None
}

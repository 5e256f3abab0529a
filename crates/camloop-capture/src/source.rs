//! Capture backend seam.

use camloop_ipc::{FrameSize, SessionConfig};

use crate::frame::CapturedFrame;
use crate::CaptureResult;

/// What to open: which camera and the requested mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Camera device index.
    pub device_index: u32,

    /// Requested frame width.
    pub width: u32,

    /// Requested frame height.
    pub height: u32,

    /// Requested frames per second.
    pub framerate: u32,
}

impl DeviceDescriptor {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            device_index: config.device_index,
            width: config.capture_width,
            height: config.capture_height,
            framerate: config.framerate,
        }
    }

    pub fn requested_size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

/// An opened camera.
///
/// The backend may not honour the requested mode exactly, so the measured
/// values are queried after open.
pub trait CaptureDevice: Send {
    /// Block until the next frame is available.
    fn read(&mut self) -> CaptureResult<CapturedFrame>;

    /// Frame rate the device actually delivers.
    fn measured_fps(&self) -> u32;

    /// Frame size the device actually delivers.
    fn measured_size(&self) -> FrameSize;

    /// Release the device. Called once when the capture loop exits.
    fn close(&mut self) {}
}

/// Factory for capture devices.
pub trait CaptureBackend: Send + Sync {
    /// Open the source described by `descriptor`.
    ///
    /// Returns `CaptureError::DeviceUnavailable` if it cannot be opened.
    fn open(&self, descriptor: &DeviceDescriptor) -> CaptureResult<Box<dyn CaptureDevice>>;

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;
}

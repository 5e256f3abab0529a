//! Synthetic camera producing a moving test pattern.

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, instrument};

use camloop_ipc::FrameSize;

use crate::error::CaptureError;
use crate::frame::{CaptureTimestamp, CapturedFrame, PixelFormat};
use crate::source::{CaptureBackend, CaptureDevice, DeviceDescriptor};
use crate::CaptureResult;

/// Backend that opens [`TestPatternDevice`]s.
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    devices: u32,
    frame_limit: Option<u64>,
    paced: bool,
}

impl TestPatternSource {
    /// One device, unlimited frames, paced to the requested framerate.
    pub fn new() -> Self {
        Self {
            devices: 1,
            frame_limit: None,
            paced: true,
        }
    }

    /// Number of device indices that can be opened.
    pub fn with_devices(mut self, devices: u32) -> Self {
        self.devices = devices;
        self
    }

    /// End the stream after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Deliver frames as fast as they are read.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for TestPatternSource {
    #[instrument(name = "test_pattern_open", skip(self))]
    fn open(&self, descriptor: &DeviceDescriptor) -> CaptureResult<Box<dyn CaptureDevice>> {
        if descriptor.device_index >= self.devices {
            return Err(CaptureError::DeviceUnavailable {
                device: descriptor.device_index,
                message: format!("no such device (have {})", self.devices),
            });
        }
        // Planar chroma wants even dimensions of at least two
        if descriptor.framerate == 0 || descriptor.width < 2 || descriptor.height < 2 {
            return Err(CaptureError::DeviceUnavailable {
                device: descriptor.device_index,
                message: "unsupported mode".to_string(),
            });
        }

        let size = FrameSize::new(descriptor.width & !1, descriptor.height & !1);
        debug!(%size, fps = descriptor.framerate, "Test pattern opened");

        Ok(Box::new(TestPatternDevice::new(
            size,
            descriptor.framerate,
            self.frame_limit,
            self.paced,
        )))
    }

    fn name(&self) -> &'static str {
        "test-pattern"
    }
}

/// Produces BGR frames with a bar sweeping left to right.
pub struct TestPatternDevice {
    size: FrameSize,
    fps: u32,
    frame_limit: Option<u64>,
    paced: bool,
    sequence: u64,
    start_time: Instant,
    closed: bool,
}

impl TestPatternDevice {
    fn new(size: FrameSize, fps: u32, frame_limit: Option<u64>, paced: bool) -> Self {
        Self {
            size,
            fps,
            frame_limit,
            paced,
            sequence: 0,
            start_time: Instant::now(),
            closed: false,
        }
    }

    fn render(&self) -> Vec<u8> {
        let w = self.size.width as usize;
        let h = self.size.height as usize;
        let bar_width = (w / 16).max(1);
        let bar_start = (self.sequence as usize * 8) % w;

        let mut data = vec![0x40u8; w * h * 3];
        for row in data.chunks_exact_mut(w * 3) {
            for x in bar_start..(bar_start + bar_width).min(w) {
                row[x * 3..x * 3 + 3].copy_from_slice(&[0xF0, 0xF0, 0xF0]);
            }
        }
        data
    }
}

impl CaptureDevice for TestPatternDevice {
    fn read(&mut self) -> CaptureResult<CapturedFrame> {
        if self.closed {
            return Err(CaptureError::ReadFailed("device closed".to_string()));
        }
        if self.frame_limit.is_some_and(|limit| self.sequence >= limit) {
            return Err(CaptureError::EndOfStream);
        }

        if self.paced {
            let due = self.start_time
                + Duration::from_nanos(1_000_000_000 * self.sequence / self.fps as u64);
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }

        let frame = CapturedFrame::new(
            Bytes::from(self.render()),
            self.size.width,
            self.size.height,
            PixelFormat::Bgr24,
            CaptureTimestamp::now(self.start_time),
            self.sequence,
        );
        self.sequence += 1;
        Ok(frame)
    }

    fn measured_fps(&self) -> u32 {
        self.fps
    }

    fn measured_size(&self) -> FrameSize {
        self.size
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

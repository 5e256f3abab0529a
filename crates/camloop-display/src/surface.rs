//! Render surface seam.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use camloop_capture::CapturedFrame;
use camloop_ipc::{FrameSize, Geometry};

use crate::error::DisplayError;
use crate::DisplayResult;

/// A single on-screen surface.
///
/// Frames arrive already scaled to `geometry`.
pub trait RenderSurface: Send {
    /// Present `frame` at `geometry`.
    fn show(&mut self, frame: &CapturedFrame, geometry: Geometry) -> DisplayResult<()>;

    /// Where frames should be placed and how large.
    fn target_geometry(&self) -> Geometry;

    /// Release the surface. Called once when the display loop exits.
    fn close(&mut self) {}

    /// Surface name for diagnostics.
    fn name(&self) -> &str;
}

/// Counters shared between a [`HeadlessSurface`] and its observers.
#[derive(Debug, Default)]
pub struct SurfaceStats {
    shown: AtomicU64,
    closed: AtomicBool,
    last_size: Mutex<Option<FrameSize>>,
}

impl SurfaceStats {
    pub fn shown(&self) -> u64 {
        self.shown.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Size of the most recently shown frame.
    pub fn last_size(&self) -> Option<FrameSize> {
        *self.last_size.lock()
    }
}

/// Surface that accepts frames without opening a window.
pub struct HeadlessSurface {
    name: String,
    geometry: Geometry,
    stats: Arc<SurfaceStats>,
}

impl HeadlessSurface {
    pub fn new(name: &str, geometry: Geometry) -> Self {
        debug!(
            surface = name,
            width = geometry.width,
            height = geometry.height,
            "Headless surface created"
        );
        Self {
            name: name.to_string(),
            geometry,
            stats: Arc::new(SurfaceStats::default()),
        }
    }

    /// Handle for reading counters after the surface moved into a display.
    pub fn stats(&self) -> Arc<SurfaceStats> {
        Arc::clone(&self.stats)
    }
}

impl RenderSurface for HeadlessSurface {
    fn show(&mut self, frame: &CapturedFrame, _geometry: Geometry) -> DisplayResult<()> {
        if self.stats.is_closed() {
            return Err(DisplayError::RenderFailed("surface closed".to_string()));
        }
        if !frame.is_valid() {
            return Err(DisplayError::RenderFailed(format!(
                "frame {} has {} bytes for {} {}",
                frame.sequence,
                frame.data.len(),
                frame.size(),
                frame.format.name()
            )));
        }

        self.stats.shown.fetch_add(1, Ordering::Relaxed);
        *self.stats.last_size.lock() = Some(frame.size());
        Ok(())
    }

    fn target_geometry(&self) -> Geometry {
        self.geometry
    }

    fn close(&mut self) {
        self.stats.closed.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

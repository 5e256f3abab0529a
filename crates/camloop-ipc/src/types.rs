//! Common value types used across the pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Create a new frame size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by this size.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns true if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Placement of a surface on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// Horizontal offset of the top-left corner.
    pub x: i32,

    /// Vertical offset of the top-left corner.
    pub y: i32,

    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,
}

impl Geometry {
    /// A geometry anchored at the screen origin.
    pub const fn at_origin(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// The size part of this geometry.
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::at_origin(1920, 1080)
    }
}

/// Outcome of one recording segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentReport {
    /// Ordinal index of the segment (0-based).
    pub index: u64,

    /// Output file path.
    pub path: PathBuf,

    /// Frames handed to the writer successfully.
    pub frames_written: u64,

    /// Whether the writer was finalized (file complete and playable).
    pub finalized: bool,

    /// Error that ended the segment early, if any.
    pub error: Option<String>,
}

impl SegmentReport {
    /// Returns true if the segment finished cleanly with at least one frame.
    pub fn is_complete(&self) -> bool {
        self.finalized && self.error.is_none() && self.frames_written > 0
    }
}

/// Point-in-time session metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Frames read from the camera.
    pub frames_captured: u64,

    /// Frames rendered by the display.
    pub frames_shown: u64,

    /// Frames written across all segments.
    pub frames_recorded: u64,

    /// Frames rejected by the display buffer.
    pub display_drops: u64,

    /// Frames rejected by the recording buffer.
    pub recording_drops: u64,

    /// Segments finalized.
    pub segments_completed: u64,

    /// Segments that could not be opened or ended with an error.
    pub segments_failed: u64,

    /// Observed capture rate over the last reporting window.
    pub capture_fps: f32,

    /// Session uptime in seconds.
    pub uptime_seconds: u64,
}

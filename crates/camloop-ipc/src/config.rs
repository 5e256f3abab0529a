//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{FrameSize, Geometry};

/// How the segment frame rate is derived from the measured camera rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FpsPolicy {
    /// `floor(measured / 2) - margin`. The default keeps a margin of 3.
    HalfMinusMargin { margin: u32 },

    /// Record at the measured camera rate.
    Measured,

    /// Record at a fixed rate regardless of the camera.
    Fixed { fps: u32 },
}

impl FpsPolicy {
    /// Margin subtracted by the default policy.
    pub const DEFAULT_MARGIN: u32 = 3;

    /// Segment frame rate for a measured camera rate. Never below 1.
    pub fn segment_fps(self, measured_fps: u32) -> u32 {
        let fps = match self {
            Self::HalfMinusMargin { margin } => (measured_fps / 2).saturating_sub(margin),
            Self::Measured => measured_fps,
            Self::Fixed { fps } => fps,
        };
        fps.max(1)
    }
}

impl Default for FpsPolicy {
    fn default() -> Self {
        Self::HalfMinusMargin {
            margin: Self::DEFAULT_MARGIN,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("segment duration must be non-zero")]
    ZeroSegmentDuration,

    #[error("frame buffer capacity must be non-zero")]
    ZeroBufferCapacity,

    #[error("invalid capture size {0}")]
    InvalidCaptureSize(FrameSize),

    #[error("capture framerate must be non-zero")]
    ZeroFramerate,

    #[error("invalid display geometry {width}x{height}")]
    InvalidDisplayGeometry { width: u32, height: u32 },

    #[error("codec identifier must not be empty")]
    EmptyCodec,
}

/// Configuration for one capture/display/record session.
///
/// Every tunable of the pipeline lives here; the defaults reproduce the
/// behaviour of a fixed installation (camera 0 at 1280x960 @ 30, 30 s
/// settle time, 30 s segments).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory under which the timestamped session directory is created.
    pub output_root: PathBuf,

    /// Delay before capture starts, letting auto-exposure settle.
    pub pre_roll_secs: u64,

    /// Length of each recording segment.
    pub segment_duration_secs: u64,

    /// Camera device index.
    pub device_index: u32,

    /// Requested capture width.
    pub capture_width: u32,

    /// Requested capture height.
    pub capture_height: u32,

    /// Requested capture framerate.
    pub framerate: u32,

    /// Codec identifier passed to the segment writer.
    pub codec: String,

    /// Capacity of each subscriber frame buffer.
    pub buffer_capacity: usize,

    /// Whether the live display runs.
    pub display_enabled: bool,

    /// Target placement of the display surface.
    pub display_geometry: Geometry,

    /// How long an idle consumer waits for a frame before re-checking.
    pub idle_backoff_ms: u64,

    /// Upper bound on joining a worker thread during stop.
    pub join_timeout_ms: u64,

    /// Wait after a segment writer failed to open.
    pub writer_retry_delay_ms: u64,

    /// Stop after this many segment indices have been used.
    pub max_segments: Option<u64>,

    /// Segment frame rate derivation.
    pub fps_policy: FpsPolicy,

    /// Interval between metrics events.
    pub metrics_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            pre_roll_secs: 30,
            segment_duration_secs: 30,
            device_index: 0,
            capture_width: 1280,
            capture_height: 960,
            framerate: 30,
            codec: "I420".to_string(),
            buffer_capacity: 10,
            display_enabled: true,
            display_geometry: Geometry::default(),
            idle_backoff_ms: 5,
            join_timeout_ms: 5_000,
            writer_retry_delay_ms: 1_000,
            max_segments: None,
            fps_policy: FpsPolicy::default(),
            metrics_interval_secs: 5,
        }
    }
}

impl SessionConfig {
    pub fn pre_roll(&self) -> Duration {
        Duration::from_secs(self.pre_roll_secs)
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_duration_secs)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn writer_retry_delay(&self) -> Duration {
        Duration::from_millis(self.writer_retry_delay_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    /// Requested capture size.
    pub fn capture_size(&self) -> FrameSize {
        FrameSize::new(self.capture_width, self.capture_height)
    }

    /// Check the values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_duration_secs == 0 {
            return Err(ConfigError::ZeroSegmentDuration);
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }
        if self.capture_size().is_empty() {
            return Err(ConfigError::InvalidCaptureSize(self.capture_size()));
        }
        if self.framerate == 0 {
            return Err(ConfigError::ZeroFramerate);
        }
        if self.display_enabled && self.display_geometry.size().is_empty() {
            return Err(ConfigError::InvalidDisplayGeometry {
                width: self.display_geometry.width,
                height: self.display_geometry.height,
            });
        }
        if self.codec.trim().is_empty() {
            return Err(ConfigError::EmptyCodec);
        }
        Ok(())
    }
}

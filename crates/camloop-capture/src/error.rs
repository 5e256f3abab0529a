//! Error types for the capture module.

use thiserror::Error;

use crate::lifecycle::JoinError;

/// Errors that can occur during capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture source could not be opened.
    #[error("Camera device {device} unavailable: {message}")]
    DeviceUnavailable { device: u32, message: String },

    /// A single read from the camera failed.
    #[error("Failed to read frame: {0}")]
    ReadFailed(String),

    /// The source has no more frames.
    #[error("Capture stream ended")]
    EndOfStream,

    /// Capture already started.
    #[error("Capture already started")]
    AlreadyStarted,

    /// The device was already handed to a capture loop.
    #[error("Capture device already released")]
    DeviceReleased,

    /// The capture thread could not be spawned.
    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The capture thread did not stop cleanly.
    #[error(transparent)]
    Join(#[from] JoinError),
}

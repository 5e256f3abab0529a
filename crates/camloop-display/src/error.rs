//! Error types for the display module.

use thiserror::Error;

use camloop_capture::JoinError;

/// Errors that can occur while presenting frames.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// A single frame could not be shown.
    #[error("Render failed: {0}")]
    RenderFailed(String),

    /// The surface was already handed to a display loop.
    #[error("Display already started")]
    AlreadyStarted,

    /// The display thread could not be spawned.
    #[error("Failed to spawn display thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The display thread did not stop cleanly.
    #[error(transparent)]
    Join(#[from] JoinError),
}

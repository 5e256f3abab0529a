//! Error types for the encoder module.

use std::path::PathBuf;

use thiserror::Error;

use camloop_capture::JoinError;

/// Errors that can occur while writing segments.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The output sink for a segment could not be opened.
    #[error("Writer unavailable for {path}: {message}")]
    WriterUnavailable { path: PathBuf, message: String },

    /// Writing or finalizing a segment failed.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Invalid input data.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    /// The recorder was already started or stopped.
    #[error("Recorder already started")]
    AlreadyStarted,

    /// The recorder thread could not be spawned.
    #[error("Failed to spawn recorder thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The recorder thread did not stop cleanly.
    #[error(transparent)]
    Join(#[from] JoinError),
}

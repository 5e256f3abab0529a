//! Error types for the session controller.

use std::path::PathBuf;

use thiserror::Error;

use camloop_capture::CaptureError;
use camloop_ipc::ConfigError;

/// Errors that end a session before or while it starts.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configuration cannot be run.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The session directory could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The camera could not be opened or started.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The session was already run.
    #[error("Session already ran")]
    AlreadyRan,
}

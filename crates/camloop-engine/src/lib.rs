//! Session controller for the camloop pipeline.
//!
//! This crate wires capture, display and segment recording into one
//! session: output directory, pre-roll, segment rotation and ordered
//! shutdown.

mod clock;
mod controller;
mod error;
mod metrics;
pub mod naming;

pub use clock::{SessionClock, SimulatedClock, SystemClock};
pub use controller::{SessionBackends, SessionController, SessionSummary, ShutdownHandle};
pub use error::SessionError;
pub use metrics::{MetricsCollector, PipelineSample};

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

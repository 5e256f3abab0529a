//! Camera capture and frame distribution.
//!
//! This crate owns the producer side of the pipeline: the capture backend
//! seam, the capture loop, the bounded frame buffers and the fan-out that
//! hands every frame to each consumer.

mod buffer;
mod error;
mod fanout;
mod frame;
mod lifecycle;
mod pattern;
mod session;
mod source;

pub use buffer::{FrameBuffer, FRAME_BUFFER_CAPACITY};
pub use error::CaptureError;
pub use fanout::{FrameDispatcher, Subscription};
pub use frame::{chroma_dims, CaptureTimestamp, CapturedFrame, PixelFormat, SharedFrame};
pub use lifecycle::{
    catch_worker_panic, CancelToken, JoinError, StateCell, StatusReporter, WorkerHandle,
};
pub use pattern::{TestPatternDevice, TestPatternSource};
pub use session::{Capture, DEFAULT_JOIN_TIMEOUT};
pub use source::{CaptureBackend, CaptureDevice, DeviceDescriptor};

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

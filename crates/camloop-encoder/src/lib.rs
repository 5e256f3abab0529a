//! Segment encoding.
//!
//! A [`Recorder`] drains the recording subscription into one segment file
//! through a [`SegmentWriter`]. Writers come from a [`WriterFactory`] so the
//! session can open one per rotation interval.

mod convert;
mod error;
mod recorder;
mod y4m;

pub use convert::to_i420;
pub use error::EncoderError;
pub use recorder::{Recorder, RecorderOptions};
pub use y4m::{Y4mWriter, Y4mWriterFactory};

use std::path::PathBuf;

use camloop_capture::CapturedFrame;
use camloop_ipc::FrameSize;

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// One output segment: where it goes and what it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSpec {
    /// Ordinal index of the segment (0-based).
    pub index: u64,

    /// Output file path.
    pub path: PathBuf,

    /// Codec identifier.
    pub codec: String,

    /// Target frames per second.
    pub fps: u32,

    /// Target frame size.
    pub size: FrameSize,
}

/// An open segment file.
pub trait SegmentWriter: Send {
    /// Append a frame. Size and format conversion is the writer's job.
    fn write(&mut self, frame: &CapturedFrame) -> EncoderResult<()>;

    /// Flush and close. The file is complete and playable afterwards.
    fn finish(&mut self) -> EncoderResult<()>;

    /// Frames written so far.
    fn frames_written(&self) -> u64;
}

/// Opens segment writers.
pub trait WriterFactory: Send + Sync {
    /// Open a writer for `spec`.
    ///
    /// Returns `EncoderError::WriterUnavailable` if no sink could be opened.
    fn open(&self, spec: &SegmentSpec) -> EncoderResult<Box<dyn SegmentWriter>>;

    /// File extension for segment files, without the dot.
    fn extension(&self) -> &'static str;

    /// Factory name for diagnostics.
    fn name(&self) -> &'static str;
}

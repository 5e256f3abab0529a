//! YUV4MPEG2 segment writer.
//!
//! Frames are stored uncompressed as I420, so a closed file is complete and
//! independently playable by standard players.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, trace, warn};

use camloop_capture::CapturedFrame;
use camloop_ipc::FrameSize;

use crate::convert::to_i420;
use crate::error::EncoderError;
use crate::{EncoderResult, SegmentSpec, SegmentWriter, WriterFactory};

/// Codec identifiers accepted by the Y4M writer.
const SUPPORTED_CODECS: &[&str] = &["I420", "YV12", "RAW"];

/// Opens [`Y4mWriter`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Y4mWriterFactory;

impl Y4mWriterFactory {
    pub fn new() -> Self {
        Self
    }
}

impl WriterFactory for Y4mWriterFactory {
    fn open(&self, spec: &SegmentSpec) -> EncoderResult<Box<dyn SegmentWriter>> {
        Ok(Box::new(Y4mWriter::create(spec)?))
    }

    fn extension(&self) -> &'static str {
        "y4m"
    }

    fn name(&self) -> &'static str {
        "y4m"
    }
}

/// Writes one segment as a YUV4MPEG2 stream.
pub struct Y4mWriter {
    path: PathBuf,
    size: FrameSize,
    out: Option<BufWriter<File>>,
    frames_written: u64,
}

impl Y4mWriter {
    /// Create the file and write the stream header.
    ///
    /// No file is left behind if this fails.
    #[instrument(name = "y4m_create", skip(spec), fields(index = spec.index, path = %spec.path.display()))]
    pub fn create(spec: &SegmentSpec) -> EncoderResult<Self> {
        let unavailable = |message: String| EncoderError::WriterUnavailable {
            path: spec.path.clone(),
            message,
        };

        if !SUPPORTED_CODECS
            .iter()
            .any(|codec| codec.eq_ignore_ascii_case(&spec.codec))
        {
            return Err(unavailable(format!("unsupported codec {:?}", spec.codec)));
        }
        if spec.fps == 0 || spec.size.is_empty() {
            return Err(unavailable(format!(
                "invalid stream {} @ {} fps",
                spec.size, spec.fps
            )));
        }

        let file = File::create(&spec.path).map_err(|e| unavailable(e.to_string()))?;
        let mut out = BufWriter::new(file);

        let header = format!(
            "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 C420jpeg\n",
            spec.size.width, spec.size.height, spec.fps
        );
        if let Err(e) = out.write_all(header.as_bytes()).and_then(|_| out.flush()) {
            drop(out);
            remove_partial(&spec.path);
            return Err(unavailable(e.to_string()));
        }

        debug!(size = %spec.size, fps = spec.fps, "Segment file opened");

        Ok(Self {
            path: spec.path.clone(),
            size: spec.size,
            out: Some(out),
            frames_written: 0,
        })
    }
}

impl SegmentWriter for Y4mWriter {
    fn write(&mut self, frame: &CapturedFrame) -> EncoderResult<()> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| EncoderError::WriteFailed("writer already finished".to_string()))?;

        let planes = if frame.size() == self.size {
            to_i420(frame)?
        } else {
            to_i420(&frame.scaled(self.size))?
        };

        out.write_all(b"FRAME\n")
            .and_then(|_| out.write_all(&planes))
            .map_err(|e| EncoderError::WriteFailed(e.to_string()))?;

        self.frames_written += 1;
        trace!(sequence = frame.sequence, frames = self.frames_written, "Frame written");
        Ok(())
    }

    fn finish(&mut self) -> EncoderResult<()> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };

        out.flush()
            .map_err(|e| EncoderError::WriteFailed(e.to_string()))?;
        out.get_ref()
            .sync_all()
            .map_err(|e| EncoderError::WriteFailed(e.to_string()))?;

        debug!(path = %self.path.display(), frames = self.frames_written, "Segment file closed");
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for Y4mWriter {
    fn drop(&mut self) {
        if self.out.is_some() {
            warn!(path = %self.path.display(), "Segment writer dropped without finish");
            let _ = self.finish();
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), "Failed to remove partial segment: {}", e);
    }
}

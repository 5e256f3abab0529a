//! Captured frame types.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb};

use camloop_ipc::FrameSize;

/// Filter used when a frame is rescaled for preview or recording.
const SCALE_FILTER: FilterType = FilterType::Triangle;

/// Frame reference handed through buffers. Fan-out clones the `Arc`,
/// never the pixels.
pub type SharedFrame = Arc<CapturedFrame>;

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed 8-bit blue, green, red.
    Bgr24,

    /// Packed 8-bit red, green, blue.
    Rgb24,

    /// Single 8-bit luma plane.
    Gray8,

    /// Planar Y, U, V with 2x2 chroma subsampling.
    I420,
}

impl PixelFormat {
    /// Expected buffer size for the given dimensions.
    pub fn buffer_size(self, size: FrameSize) -> usize {
        match self {
            Self::Bgr24 | Self::Rgb24 => size.area() * 3,
            Self::Gray8 => size.area(),
            Self::I420 => {
                let (cw, ch) = chroma_dims(size.width as usize, size.height as usize);
                size.area() + 2 * cw * ch
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bgr24 => "BGR24",
            Self::Rgb24 => "RGB24",
            Self::Gray8 => "GRAY8",
            Self::I420 => "I420",
        }
    }
}

/// Chroma plane dimensions for 4:2:0 subsampling.
pub fn chroma_dims(width: usize, height: usize) -> (usize, usize) {
    (width.div_ceil(2), height.div_ceil(2))
}

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Frame presentation timestamp in 100ns units since capture start.
    pub pts_100ns: u64,
}

impl CaptureTimestamp {
    /// Create a new capture timestamp.
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        let elapsed = capture_time.duration_since(start_time);
        let pts_100ns = elapsed.as_nanos() as u64 / 100;

        Self {
            capture_time,
            pts_100ns,
        }
    }
}

/// A captured video frame. Immutable once produced.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Pixel data laid out according to `format`.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Pixel layout.
    pub format: PixelFormat,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number.
    pub sequence: u64,
}

impl CapturedFrame {
    /// Create a new captured frame.
    pub fn new(
        data: Bytes,
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp,
            sequence,
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Validate that the frame data matches its declared dimensions.
    pub fn is_valid(&self) -> bool {
        self.data.len() == self.format.buffer_size(self.size())
    }

    /// Rescale to `target`. Returns a cheap clone when the size already
    /// matches or the buffer does not fit its declared dimensions.
    pub fn scaled(&self, target: FrameSize) -> CapturedFrame {
        if target == self.size() || target.is_empty() || !self.is_valid() {
            return self.clone();
        }

        let resized = match self.format {
            // Channel order does not matter to the filter
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => {
                resize_plane::<Rgb<u8>>(&self.data, self.size(), target)
            }
            PixelFormat::Gray8 => resize_plane::<Luma<u8>>(&self.data, self.size(), target),
            PixelFormat::I420 => resize_i420(&self.data, self.size(), target),
        };
        let Some(data) = resized else {
            return self.clone();
        };

        CapturedFrame {
            data: Bytes::from(data),
            width: target.width,
            height: target.height,
            format: self.format,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }
}

fn resize_plane<P>(src: &[u8], from: FrameSize, to: FrameSize) -> Option<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let image = ImageBuffer::<P, &[u8]>::from_raw(from.width, from.height, src)?;
    Some(imageops::resize(&image, to.width, to.height, SCALE_FILTER).into_raw())
}

fn resize_i420(src: &[u8], from: FrameSize, to: FrameSize) -> Option<Vec<u8>> {
    let (scw, sch) = chroma_dims(from.width as usize, from.height as usize);
    let (tcw, tch) = chroma_dims(to.width as usize, to.height as usize);
    let chroma_from = FrameSize::new(scw as u32, sch as u32);
    let chroma_to = FrameSize::new(tcw as u32, tch as u32);

    let (y, rest) = src.split_at(from.area());
    let (u, v) = rest.split_at(scw * sch);

    let mut out = resize_plane::<Luma<u8>>(y, from, to)?;
    out.extend(resize_plane::<Luma<u8>>(u, chroma_from, chroma_to)?);
    out.extend(resize_plane::<Luma<u8>>(v, chroma_from, chroma_to)?);
    Some(out)
}

//! Pixel format conversion to planar I420.

use camloop_capture::{chroma_dims, CapturedFrame, PixelFormat};

use crate::error::EncoderError;
use crate::EncoderResult;

/// Convert `frame` to I420 (Y plane, then U, then V).
pub fn to_i420(frame: &CapturedFrame) -> EncoderResult<Vec<u8>> {
    if !frame.is_valid() {
        return Err(EncoderError::InvalidInput(format!(
            "Expected {} bytes ({} {}), got {}",
            frame.format.buffer_size(frame.size()),
            frame.size(),
            frame.format.name(),
            frame.data.len()
        )));
    }

    let w = frame.width as usize;
    let h = frame.height as usize;

    Ok(match frame.format {
        PixelFormat::I420 => frame.data.to_vec(),
        PixelFormat::Gray8 => {
            let (cw, ch) = chroma_dims(w, h);
            let mut out = Vec::with_capacity(w * h + 2 * cw * ch);
            out.extend_from_slice(&frame.data);
            out.resize(w * h + 2 * cw * ch, 128);
            out
        }
        PixelFormat::Bgr24 => packed_to_i420(&frame.data, w, h, [2, 1, 0]),
        PixelFormat::Rgb24 => packed_to_i420(&frame.data, w, h, [0, 1, 2]),
    })
}

/// `order` gives the byte offsets of red, green and blue within a pixel.
fn packed_to_i420(packed: &[u8], w: usize, h: usize, order: [usize; 3]) -> Vec<u8> {
    let [ri, gi, bi] = order;
    let (cw, ch) = chroma_dims(w, h);
    let y_size = w * h;
    let mut i420 = vec![0u8; y_size + 2 * cw * ch];

    let rgb = |offset: usize| {
        (
            packed[offset + ri] as f32,
            packed[offset + gi] as f32,
            packed[offset + bi] as f32,
        )
    };

    // Y plane
    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = rgb((y * w + x) * 3);

            // BT.601 conversion
            i420[y * w + x] = (0.299 * r + 0.587 * g + 0.114 * b) as u8;
        }
    }

    // U and V planes (subsampled 2x2, top-left sample)
    let u_offset = y_size;
    let v_offset = y_size + cw * ch;
    for cy in 0..ch {
        for cx in 0..cw {
            let (r, g, b) = rgb((cy * 2 * w + cx * 2) * 3);

            let u = ((-0.169 * r - 0.331 * g + 0.500 * b) + 128.0).clamp(0.0, 255.0) as u8;
            let v = ((0.500 * r - 0.419 * g - 0.081 * b) + 128.0).clamp(0.0, 255.0) as u8;

            i420[u_offset + cy * cw + cx] = u;
            i420[v_offset + cy * cw + cx] = v;
        }
    }

    i420
}

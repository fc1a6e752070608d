// Pixel-format conversion — pure, stateless routines over caller-supplied
// buffers with explicit per-plane strides.

mod mjpeg;
mod yuv;

pub use mjpeg::mjpeg_to_i420;
pub use yuv::{yuyv_to_i420, yuyv_to_nv12};

use thiserror::Error;

/// Conversion failures. All are per-frame and fail closed — a destination
/// buffer is never partially written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("dimensions must be even and non-zero for 4:2:0 output, got {width}x{height}")]
    BadDimensions { width: u32, height: u32 },

    #[error("source buffer holds {available} bytes, {needed} required")]
    SourceTruncated { needed: usize, available: usize },

    #[error("destination {plane} plane holds {available} bytes, {needed} required")]
    DestinationTooSmall {
        plane: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("frame is {got_width}x{got_height}, expected {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("jpeg decode failed: {0}")]
    Decode(String),

    #[error("unsupported chroma subsampling in source frame")]
    UnsupportedSubsampling,
}

/// A mutable destination plane with its row stride in bytes.
pub struct PlaneMut<'a> {
    pub data: &'a mut [u8],
    pub stride: usize,
}

impl<'a> PlaneMut<'a> {
    pub fn new(data: &'a mut [u8], stride: usize) -> Self {
        Self { data, stride }
    }

    /// Verify the plane can hold `rows` rows of `width` bytes.
    fn check(&self, plane: &'static str, width: usize, rows: usize) -> Result<(), ConvertError> {
        let needed = self.stride * rows;
        if self.stride < width || self.data.len() < needed {
            return Err(ConvertError::DestinationTooSmall {
                plane,
                needed: needed.max(width * rows),
                available: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Total bytes for a planar 4:2:0 buffer with the given luma stride.
/// Chroma strides are `y_stride / 2`.
pub fn i420_buffer_len(y_stride: usize, height: usize) -> usize {
    y_stride * height + 2 * ((y_stride / 2) * (height / 2))
}

/// Total bytes for a semi-planar 4:2:0 buffer with the given luma stride.
/// The interleaved UV plane shares the luma stride.
pub fn nv12_buffer_len(y_stride: usize, height: usize) -> usize {
    y_stride * height + y_stride * (height / 2)
}

/// Validate even, non-zero dimensions for 4:2:0 output.
fn check_dimensions(width: u32, height: u32) -> Result<(), ConvertError> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(ConvertError::BadDimensions { width, height });
    }
    Ok(())
}

/// Strided row-by-row plane copy. Callers must have validated that both
/// buffers hold `rows` rows at their respective strides.
fn copy_plane(src: &[u8], src_stride: usize, dst: &mut [u8], dst_stride: usize, width: usize) {
    for (src_row, dst_row) in src.chunks(src_stride).zip(dst.chunks_mut(dst_stride)) {
        dst_row[..width].copy_from_slice(&src_row[..width]);
    }
}

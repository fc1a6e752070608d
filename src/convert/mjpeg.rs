//! MJPEG to planar 4:2:0 conversion.
//!
//! Pixel decode is delegated to turbojpeg, which produces planar YUV in the
//! JPEG's native chroma subsampling; the planes are then copied into the
//! destination with explicit strides. UVC cameras commonly emit 4:2:2
//! JPEGs, so the chroma fold to 4:2:0 happens during the copy.

use turbojpeg::{Decompressor, Subsamp, YuvImage};

use crate::convert::{check_dimensions, copy_plane, ConvertError, PlaneMut};

/// Decode an MJPEG frame and write it as planar I420. The frame must match
/// the expected dimensions exactly. Destination planes are untouched on
/// error.
pub fn mjpeg_to_i420(
    jpeg: &[u8],
    width: u32,
    height: u32,
    y: &mut PlaneMut<'_>,
    u: &mut PlaneMut<'_>,
    v: &mut PlaneMut<'_>,
) -> Result<(), ConvertError> {
    check_dimensions(width, height)?;
    let (w, h) = (width as usize, height as usize);
    y.check("y", w, h)?;
    u.check("u", w / 2, h / 2)?;
    v.check("v", w / 2, h / 2)?;

    let mut decompressor = Decompressor::new().map_err(|e| ConvertError::Decode(e.to_string()))?;
    let header = decompressor
        .read_header(jpeg)
        .map_err(|e| ConvertError::Decode(e.to_string()))?;
    if header.width != w || header.height != h {
        return Err(ConvertError::DimensionMismatch {
            width,
            height,
            got_width: header.width as u32,
            got_height: header.height as u32,
        });
    }

    let (chroma_w, chroma_h) = match header.subsamp {
        Subsamp::Sub2x2 => (w / 2, h / 2),
        Subsamp::Sub2x1 => (w / 2, h),
        Subsamp::Gray => (0, 0),
        _ => return Err(ConvertError::UnsupportedSubsampling),
    };

    // Tightly packed scratch planes in the JPEG's own subsampling.
    let scratch_len = turbojpeg::yuv_pixels_len(w, 1, h, header.subsamp)
        .map_err(|e| ConvertError::Decode(e.to_string()))?;
    let mut scratch = vec![0u8; scratch_len];
    let yuv = YuvImage {
        pixels: scratch.as_mut_slice(),
        width: w,
        align: 1,
        height: h,
        subsamp: header.subsamp,
    };
    decompressor
        .decompress_to_yuv(jpeg, yuv)
        .map_err(|e| ConvertError::Decode(e.to_string()))?;

    let (src_y, src_chroma) = scratch.split_at(w * h);
    copy_plane(src_y, w, y.data, y.stride, w);

    match header.subsamp {
        Subsamp::Sub2x2 => {
            let (src_u, src_v) = src_chroma.split_at(chroma_w * chroma_h);
            copy_plane(src_u, chroma_w, u.data, u.stride, chroma_w);
            copy_plane(src_v, chroma_w, v.data, v.stride, chroma_w);
        }
        Subsamp::Sub2x1 => {
            let (src_u, src_v) = src_chroma.split_at(chroma_w * chroma_h);
            fold_chroma_rows(src_u, chroma_w, u.data, u.stride, h / 2);
            fold_chroma_rows(src_v, chroma_w, v.data, v.stride, h / 2);
        }
        Subsamp::Gray => {
            fill_plane(u.data, u.stride, w / 2, h / 2, 128);
            fill_plane(v.data, v.stride, w / 2, h / 2, 128);
        }
        _ => unreachable!("rejected above"),
    }
    Ok(())
}

/// Vertically fold a full-height 4:2:2 chroma plane to half height by
/// averaging each row pair.
fn fold_chroma_rows(src: &[u8], src_width: usize, dst: &mut [u8], dst_stride: usize, out_rows: usize) {
    for (pair, dst_row) in dst.chunks_mut(dst_stride).take(out_rows).enumerate() {
        let top = &src[2 * pair * src_width..][..src_width];
        let bottom = &src[(2 * pair + 1) * src_width..][..src_width];
        for ((d, &a), &b) in dst_row[..src_width].iter_mut().zip(top).zip(bottom) {
            *d = ((a as u16 + b as u16 + 1) >> 1) as u8;
        }
    }
}

/// Fill a strided plane with a constant sample (neutral chroma for
/// grayscale sources).
fn fill_plane(dst: &mut [u8], stride: usize, width: usize, rows: usize, value: u8) {
    for row in dst.chunks_mut(stride).take(rows) {
        row[..width].fill(value);
    }
}

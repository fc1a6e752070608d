use crate::camera::error::{CameraError, Result};
use crate::camera::source::VideoSource;
use crate::camera::types::{FormatDescriptor, SourcePixelFormat};

/// Minimal valid JPEG — a 1x1 red pixel.
///
/// Generated from a standard JFIF structure.
pub fn test_frame_jpeg() -> Vec<u8> {
    // Minimal 1x1 red pixel JPEG
    vec![
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00,
        0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xDB, 0x00, 0x43, 0x00, 0x08, 0x06, 0x06, 0x07, 0x06,
        0x05, 0x08, 0x07, 0x07, 0x07, 0x09, 0x09, 0x08, 0x0A, 0x0C, 0x14, 0x0D, 0x0C, 0x0B, 0x0B,
        0x0C, 0x19, 0x12, 0x13, 0x0F, 0x14, 0x1D, 0x1A, 0x1F, 0x1E, 0x1D, 0x1A, 0x1C, 0x1C, 0x20,
        0x24, 0x2E, 0x27, 0x20, 0x22, 0x2C, 0x23, 0x1C, 0x1C, 0x28, 0x37, 0x29, 0x2C, 0x30, 0x31,
        0x34, 0x34, 0x34, 0x1F, 0x27, 0x39, 0x3D, 0x38, 0x32, 0x3C, 0x2E, 0x33, 0x34, 0x32, 0xFF,
        0xC0, 0x00, 0x0B, 0x08, 0x00, 0x01, 0x00, 0x01, 0x01, 0x01, 0x11, 0x00, 0xFF, 0xC4, 0x00,
        0x1F, 0x00, 0x00, 0x01, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
        0xFF, 0xC4, 0x00, 0xB5, 0x10, 0x00, 0x02, 0x01, 0x03, 0x03, 0x02, 0x04, 0x03, 0x05, 0x05,
        0x04, 0x04, 0x00, 0x00, 0x01, 0x7D, 0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21,
        0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08,
        0x23, 0x42, 0xB1, 0xC1, 0x15, 0x52, 0xD1, 0xF0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A,
        0x16, 0x17, 0x18, 0x19, 0x1A, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x34, 0x35, 0x36, 0x37,
        0x38, 0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56,
        0x57, 0x58, 0x59, 0x5A, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75,
        0x76, 0x77, 0x78, 0x79, 0x7A, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93,
        0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9,
        0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6,
        0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1, 0xE2,
        0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7,
        0xF8, 0xF9, 0xFA, 0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, 0x7B, 0x94,
        0x11, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xD9,
    ]
}

/// Uniform packed-YUYV test pattern at the given dimensions.
pub fn yuyv_test_pattern(width: u32, height: u32, luma: u8, u: u8, v: u8) -> Vec<u8> {
    let pairs = (width as usize * height as usize) / 2;
    let mut data = Vec::with_capacity(pairs * 4);
    for _ in 0..pairs {
        data.extend_from_slice(&[luma, u, luma, v]);
    }
    data
}

/// A simulated video source for testing without real hardware.
///
/// Advertises YUYV and MJPEG at 640x480 and 1280x720 and accepts any
/// negotiation matching those entries. Enable by registering it in place of
/// a driver-backed source.
pub struct DummySource {
    formats: Vec<FormatDescriptor>,
}

impl DummySource {
    pub fn new() -> Self {
        let mut formats = Vec::new();
        for (width, height) in [(640u32, 480u32), (1280, 720)] {
            for pixel_format in [SourcePixelFormat::Yuyv, SourcePixelFormat::Mjpeg] {
                formats.push(FormatDescriptor {
                    pixel_format,
                    width,
                    height,
                    frame_rates: vec![15.0, 30.0],
                });
            }
        }
        Self { formats }
    }

    /// A source that advertises nothing — for exercising the device error
    /// path.
    pub fn without_formats() -> Self {
        Self { formats: vec![] }
    }
}

impl Default for DummySource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for DummySource {
    fn enumerate_formats(&self) -> Result<Vec<FormatDescriptor>> {
        Ok(self.formats.clone())
    }

    fn negotiate_format(&self, format: SourcePixelFormat, width: u32, height: u32) -> Result<()> {
        if self
            .formats
            .iter()
            .any(|f| f.pixel_format == format && f.width == width && f.height == height)
        {
            Ok(())
        } else {
            Err(CameraError::Unsupported(format!(
                "{} {width}x{height} not advertised",
                format.fourcc()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_source_advertises_both_encodings_at_both_sizes() {
        let source = DummySource::new();
        let formats = source.enumerate_formats().unwrap();
        assert_eq!(formats.len(), 4);
        assert!(formats
            .iter()
            .any(|f| f.pixel_format == SourcePixelFormat::Yuyv && f.width == 640));
        assert!(formats
            .iter()
            .any(|f| f.pixel_format == SourcePixelFormat::Mjpeg && f.width == 1280));
    }

    #[test]
    fn dummy_source_negotiates_advertised_formats_only() {
        let source = DummySource::new();
        assert!(source
            .negotiate_format(SourcePixelFormat::Yuyv, 640, 480)
            .is_ok());
        assert!(source
            .negotiate_format(SourcePixelFormat::Yuyv, 320, 240)
            .is_err());
    }

    #[test]
    fn test_frame_is_valid_jpeg() {
        let frame = test_frame_jpeg();
        // JPEG files start with FF D8 and end with FF D9
        assert!(frame.len() > 4);
        assert_eq!(frame[0], 0xFF);
        assert_eq!(frame[1], 0xD8);
        assert_eq!(frame[frame.len() - 2], 0xFF);
        assert_eq!(frame[frame.len() - 1], 0xD9);
    }

    #[test]
    fn yuyv_test_pattern_has_packed_length() {
        let pattern = yuyv_test_pattern(640, 480, 200, 90, 160);
        assert_eq!(pattern.len(), 640 * 480 * 2);
        assert_eq!(&pattern[..4], &[200, 90, 200, 160]);
    }
}

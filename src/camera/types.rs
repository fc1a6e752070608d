use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable camera identifier (bus path, or any unique string the
/// registration layer assigns).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new `DeviceId` from a raw string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the inner string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel encoding delivered by the video source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePixelFormat {
    /// Packed 4:2:2 (Y0 U Y1 V byte order).
    Yuyv,
    /// Motion-JPEG compressed frames.
    Mjpeg,
}

impl SourcePixelFormat {
    /// FourCC string as reported by the wire format negotiation.
    pub fn fourcc(self) -> &'static str {
        match self {
            Self::Yuyv => "YUYV",
            Self::Mjpeg => "MJPG",
        }
    }
}

/// Pixel encoding the session writes into output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPixelFormat {
    /// Planar 4:2:0 — Y plane, then U, then V, each with its own stride.
    I420,
    /// Semi-planar 4:2:0 — Y plane, then interleaved UV.
    Nv12,
}

/// One format the video source can deliver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDescriptor {
    pub pixel_format: SourcePixelFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rates: Vec<f32>,
}

impl Eq for FormatDescriptor {}

impl PartialOrd for FormatDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FormatDescriptor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by total pixels descending, then by peak frame rate descending
        let self_pixels = self.width * self.height;
        let other_pixels = other.width * other.height;
        other_pixels
            .cmp(&self_pixels)
            .then_with(|| {
                let self_peak = self.frame_rates.iter().cloned().fold(0.0f32, f32::max);
                let other_peak = other.frame_rates.iter().cloned().fold(0.0f32, f32::max);
                other_peak
                    .partial_cmp(&self_peak)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| self.pixel_format.fourcc().cmp(other.pixel_format.fourcc()))
    }
}

/// A raw frame as handed over by the video source.
///
/// Producer-owned until pushed; the session queue takes ownership and the
/// frame is dropped after conversion or on overflow.
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: SourcePixelFormat,
    /// Arrival timestamp in microseconds since the Unix epoch.
    pub timestamp_us: u64,
}

impl RawFrame {
    /// Wrap source bytes, stamping the arrival time.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: SourcePixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp_us: now_micros(),
        }
    }

    /// Same as [`RawFrame::new`] but with an explicit arrival timestamp.
    pub fn with_timestamp(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: SourcePixelFormat,
        timestamp_us: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp_us,
        }
    }
}

/// Whether a requested stream produces or consumes frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Output,
    Input,
}

/// A stream as requested by the consumer in `configure_streams`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub id: i32,
    pub stream_type: StreamType,
    pub width: u32,
    pub height: u32,
    pub format: TargetPixelFormat,
}

/// The negotiated output contract — exactly one active per session, or none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub stream_id: i32,
    pub width: u32,
    pub height: u32,
    pub format: TargetPixelFormat,
    pub buffer_count: usize,
}

/// Buffer usage bits carried on every pool buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageFlags(u32);

impl UsageFlags {
    pub const CPU_WRITE: UsageFlags = UsageFlags(1);
    pub const CAMERA_WRITE: UsageFlags = UsageFlags(1 << 1);
    pub const GPU_SAMPLED: UsageFlags = UsageFlags(1 << 2);

    /// Whether all bits of `other` are set in `self`.
    pub fn contains(self, other: UsageFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for UsageFlags {
    type Output = UsageFlags;

    fn bitor(self, rhs: UsageFlags) -> UsageFlags {
        UsageFlags(self.0 | rhs.0)
    }
}

/// A consumer-issued request for one frame of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Consumer-assigned sequence number, echoed in the shutter event and
    /// the eventual capture result.
    pub sequence: u64,
    /// Stream ids the result should be produced for. Must be non-empty;
    /// this bridge serves a single output stream, so one entry is expected.
    pub stream_ids: Vec<i32>,
}

impl CaptureRequest {
    /// Request one frame from the given stream.
    pub fn new(sequence: u64, stream_id: i32) -> Self {
        Self {
            sequence,
            stream_ids: vec![stream_id],
        }
    }
}

/// Delivery status of a capture result buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStatus {
    Ok,
    Error,
}

/// Microseconds since the Unix epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

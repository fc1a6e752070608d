use crate::camera::error::Result;
use crate::camera::types::{FormatDescriptor, SourcePixelFormat};

/// Abstraction over the raw video device.
///
/// Implemented per driver stack (V4L2 on Linux, a vendor SDK elsewhere).
/// Covers format enumeration and negotiation only — frame delivery happens
/// out-of-band through [`CameraSession::push_new_frame`], driven by the
/// device's own capture loop.
///
/// [`CameraSession::push_new_frame`]: crate::camera::session::CameraSession::push_new_frame
pub trait VideoSource: Send + Sync {
    /// Enumerate every format the device can deliver.
    fn enumerate_formats(&self) -> Result<Vec<FormatDescriptor>>;

    /// Ask the device to switch its wire format. Called during stream
    /// configuration before buffers are allocated.
    fn negotiate_format(&self, format: SourcePixelFormat, width: u32, height: u32) -> Result<()>;
}

// UVC frame bridge — device/session state machines, frame pipeline, format conversion.

pub mod camera;
pub mod config;
pub mod convert;
pub mod diagnostics;

#[cfg(test)]
mod integration;

pub use camera::device::{CameraDevice, DeviceState};
pub use camera::error::{CameraError, Result};
pub use camera::events::SessionEvent;
pub use camera::registry::{AvailabilityEvent, CameraRegistry};
pub use camera::session::CameraSession;
pub use config::BridgeConfig;

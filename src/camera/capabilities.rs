use serde::{Deserialize, Serialize};

use crate::camera::types::{
    FormatDescriptor, SourcePixelFormat, StreamConfig, StreamType, TargetPixelFormat,
};

/// Which way the camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LensFacing {
    Front,
    Back,
    External,
}

/// One advertised output configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCapability {
    pub format: TargetPixelFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rates: Vec<f32>,
}

/// Capability table consumed by the registration layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub facing: LensFacing,
    pub streams: Vec<StreamCapability>,
    pub fixed_focus: bool,
    /// Frames that can be in flight through the pipeline at once.
    pub pipeline_depth: u8,
}

impl Capabilities {
    /// Derive the advertised output table from the source's wire formats.
    ///
    /// Every source size becomes a planar 4:2:0 entry (both packed and
    /// compressed wire formats convert to it); semi-planar entries are
    /// listed only for sizes the source delivers as packed 4:2:2, since no
    /// compressed-to-semi-planar path exists.
    pub fn from_formats(
        facing: LensFacing,
        fixed_focus: bool,
        pipeline_depth: u8,
        formats: &[FormatDescriptor],
    ) -> Self {
        let mut streams: Vec<StreamCapability> = Vec::new();
        let mut add_unique = |format, descriptor: &FormatDescriptor| {
            let exists = streams.iter().any(|s| {
                s.format == format && s.width == descriptor.width && s.height == descriptor.height
            });
            if !exists {
                streams.push(StreamCapability {
                    format,
                    width: descriptor.width,
                    height: descriptor.height,
                    frame_rates: descriptor.frame_rates.clone(),
                });
            }
        };

        for descriptor in formats {
            add_unique(TargetPixelFormat::I420, descriptor);
            if descriptor.pixel_format == SourcePixelFormat::Yuyv {
                add_unique(TargetPixelFormat::Nv12, descriptor);
            }
        }

        Self {
            facing,
            streams,
            fixed_focus,
            pipeline_depth,
        }
    }

    /// Whether a candidate stream matches an advertised entry.
    pub fn supports(&self, config: &StreamConfig) -> bool {
        config.stream_type == StreamType::Output
            && self.streams.iter().any(|s| {
                s.format == config.format
                    && s.width == config.width
                    && s.height == config.height
            })
    }
}

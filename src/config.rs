use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::camera::capabilities::LensFacing;

/// Bridge configuration — pool sizing and the fixed capability flags the
/// registration layer reports for every bridged camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Output buffers allocated per configured stream.
    pub stream_buffer_count: usize,
    /// Frame queue depth as a multiple of the buffer count.
    pub queue_depth_factor: usize,
    pub lens_facing: LensFacing,
    pub fixed_focus: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            stream_buffer_count: 4,
            queue_depth_factor: 2,
            lens_facing: LensFacing::External,
            fixed_focus: true,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON file, returning defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&contents).map_err(|e| e.to_string())
    }

    /// Save configuration to disk atomically (write .tmp then rename).
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp_path, path).map_err(|e| e.to_string())?;

        Ok(())
    }

    /// Frame queue capacity derived from the buffer count.
    pub fn queue_capacity(&self) -> usize {
        self.stream_buffer_count * self.queue_depth_factor
    }

    /// Pipeline depth reported in the capability table — never below the
    /// minimum a consumer can pipeline against.
    pub fn pipeline_depth(&self) -> u8 {
        self.stream_buffer_count.clamp(3, u8::MAX as usize) as u8
    }
}

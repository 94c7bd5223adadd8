//! User-facing conversion options and their validation.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Perceptual quality preference, only meaningful for constant-quality
/// encodes. When a target size is set the planner works in bitrate mode and
/// this value is advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

/// Output container. The codec pair follows from the container:
/// MP4 carries H.264 + AAC, WebM carries VP9 + Opus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Webm,
}

impl OutputFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
        }
    }

    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Webm => "video/webm",
        }
    }
}

/// Options for one conversion request. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Desired output size in bytes. When set, the planner runs in bitrate
    /// mode with the adaptive degradation ladder; when unset it runs a
    /// single constant-quality attempt.
    pub target_size_bytes: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub maintain_aspect_ratio: bool,
    pub quality: Quality,
    pub output_format: OutputFormat,
    pub strip_audio: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            target_size_bytes: None,
            width: None,
            height: None,
            maintain_aspect_ratio: true,
            quality: Quality::Medium,
            output_format: OutputFormat::Mp4,
            strip_audio: false,
        }
    }
}

impl ConversionOptions {
    /// Checks the option set before a conversion starts.
    pub fn validate(&self) -> CoreResult<()> {
        if self.target_size_bytes == Some(0) {
            return Err(CoreError::InvalidOptions(
                "target size must be positive".to_string(),
            ));
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(CoreError::InvalidOptions(
                "output dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

//! Media metadata extraction.
//!
//! Probes a selected source file for duration, dimensions and aspect ratio
//! before any conversion starts. A file the probe cannot decode fails the
//! request immediately; there is no retry at this stage.

use crate::SourceFile;
use crate::error::{CoreError, CoreResult};
use log::debug;
use serde::Serialize;
use std::io::Write;

/// Probed properties of a selected source file.
#[derive(Debug, Clone, Serialize)]
pub struct MediaMetadata {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
}

/// Source of media metadata for a byte-bearing file handle.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, source: &SourceFile) -> CoreResult<MediaMetadata>;
}

/// ffprobe-backed extractor. The source bytes are spooled to a scoped
/// temporary file which is removed when probing finishes, on success and
/// failure paths alike.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeMetadataExtractor;

impl MetadataExtractor for FfprobeMetadataExtractor {
    fn extract(&self, source: &SourceFile) -> CoreResult<MediaMetadata> {
        let mut probe_file = tempfile::Builder::new()
            .prefix("vidsqueeze-probe-")
            .suffix(&source.extension())
            .tempfile()?;
        probe_file.write_all(&source.bytes)?;
        probe_file.flush()?;

        debug!(
            "probing {} ({} bytes) via {}",
            source.name,
            source.bytes.len(),
            probe_file.path().display()
        );

        let probe = ffprobe::ffprobe(probe_file.path()).map_err(|e| {
            CoreError::UnreadableMedia(format!("ffprobe failed for {}: {e:?}", source.name))
        })?;

        let duration_seconds = probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| {
                CoreError::UnreadableMedia(format!("no parsable duration in {}", source.name))
            })?;
        if duration_seconds <= 0.0 {
            return Err(CoreError::UnreadableMedia(format!(
                "non-positive duration in {}",
                source.name
            )));
        }

        let video_stream = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| {
                CoreError::UnreadableMedia(format!("no video stream in {}", source.name))
            })?;

        let width = video_stream.width.unwrap_or(0);
        let height = video_stream.height.unwrap_or(0);
        if width <= 0 || height <= 0 {
            return Err(CoreError::UnreadableMedia(format!(
                "invalid dimensions {width}x{height} in {}",
                source.name
            )));
        }

        Ok(MediaMetadata {
            name: source.name.clone(),
            size_bytes: source.bytes.len() as u64,
            mime_type: mime_for_extension(&source.extension()).to_string(),
            duration_seconds,
            width: width as u32,
            height: height as u32,
            aspect_ratio: width as f64 / height as f64,
        })
    }
}

/// MIME guess for the common container extensions the front end accepts.
pub(crate) fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        ".mp4" | ".m4v" => "video/mp4",
        ".mov" => "video/quicktime",
        ".webm" => "video/webm",
        ".mkv" => "video/x-matroska",
        ".avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

//! Bitrate/resolution planning.
//!
//! Pure mapping from (options, duration, attempt index) to concrete encode
//! parameters. Two modes exist per request: bitrate mode when a target size
//! is given (a five-step degradation ladder), and constant-quality mode
//! otherwise (a single attempt, no retries).
//!
//! Ladder steps are cumulative and strictly monotonic in aggressiveness:
//! each one sheds a specific resource: fps for CPU, resolution for memory,
//! the audio reservation for the bitrate budget. Dimensions never increase from
//! one attempt to the next.

use crate::metadata::MediaMetadata;
use crate::options::{ConversionOptions, OutputFormat, Quality};

/// Kilobits per megabyte of target size.
const KBITS_PER_MB: f64 = 8192.0;
/// Audio reservation (kbps) while audio is kept.
const AUDIO_BITRATE_KBPS: u32 = 96;
/// Video bitrate floor (kbps). Prevents degenerate near-zero bitrates on
/// very long inputs with small targets.
const MIN_VIDEO_BITRATE_KBPS: u32 = 250;
/// Long-edge clamp applied by the final ladder step.
const FINAL_ATTEMPT_LONG_EDGE: u32 = 640;
const BASELINE_FPS: u32 = 24;
const REDUCED_FPS: u32 = 20;
const RESOLUTION_SCALE_STEP: f64 = 0.7;
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;

/// Rate control selected once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Target size given: bitrate ladder with degradation steps.
    Bitrate,
    /// No target size: one constant-quality attempt.
    ConstantQuality,
}

impl PlanMode {
    #[must_use]
    pub fn for_request(options: &ConversionOptions, duration_seconds: f64) -> Self {
        if options.target_size_bytes.is_some() && duration_seconds > 0.0 {
            PlanMode::Bitrate
        } else {
            PlanMode::ConstantQuality
        }
    }

    #[must_use]
    pub fn ladder_len(self) -> u32 {
        match self {
            PlanMode::Bitrate => 5,
            PlanMode::ConstantQuality => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateControl {
    Bitrate { kbps: u32 },
    ConstantQuality { crf: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Vp9,
}

impl VideoCodec {
    #[must_use]
    pub fn encoder_name(self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Vp9 => "libvpx-vp9",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
    Opus,
}

impl AudioCodec {
    #[must_use]
    pub fn encoder_name(self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Opus => "libopus",
        }
    }
}

/// Concrete encode parameters for one attempt. Created per retry and
/// discarded after use.
#[derive(Debug, Clone)]
pub struct AttemptPlan {
    pub attempt_index: u32,
    pub label: &'static str,
    pub rate: RateControl,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    /// 0 disables audio entirely.
    pub audio_bitrate_kbps: u32,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub container: OutputFormat,
}

impl AttemptPlan {
    #[must_use]
    pub fn audio_enabled(&self) -> bool {
        self.audio_bitrate_kbps > 0
    }
}

fn crf_for_quality(quality: Quality) -> u32 {
    match quality {
        Quality::Low => 28,
        Quality::Medium => 23,
        Quality::High => 18,
    }
}

fn strategy_label(attempt_index: u32) -> &'static str {
    match attempt_index {
        1 => "Optimizing quality",
        2 => "Reducing frame rate (20 fps)",
        3 => "Scaling down resolution (70%)",
        4 => "Safe mode: audio removed",
        _ => "Critical mode: minimum resolution (640 px)",
    }
}

/// Truncates to the nearest even value, never rounding up, so a derived
/// dimension can never exceed the one it was derived from. Floors at 2 to
/// keep the scale filter well-formed.
fn even_floor(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Fills unset target dimensions from the probed source, deriving the
/// missing edge from the source aspect ratio when requested.
#[must_use]
pub fn fill_dimensions_from_source(
    mut options: ConversionOptions,
    metadata: &MediaMetadata,
) -> ConversionOptions {
    match (options.width, options.height) {
        (None, None) => {
            options.width = Some(metadata.width);
            options.height = Some(metadata.height);
        }
        (Some(w), None) if options.maintain_aspect_ratio && metadata.aspect_ratio > 0.0 => {
            options.height = Some((f64::from(w) / metadata.aspect_ratio).round() as u32);
        }
        (None, Some(h)) if options.maintain_aspect_ratio && metadata.aspect_ratio > 0.0 => {
            options.width = Some((f64::from(h) * metadata.aspect_ratio).round() as u32);
        }
        _ => {}
    }
    options
}

/// Computes the encode parameters for one attempt. Pure and deterministic.
#[must_use]
pub fn plan(
    options: &ConversionOptions,
    duration_seconds: f64,
    attempt_index: u32,
    mode: PlanMode,
) -> AttemptPlan {
    let (video_codec, audio_codec) = match options.output_format {
        OutputFormat::Mp4 => (VideoCodec::H264, AudioCodec::Aac),
        OutputFormat::Webm => (VideoCodec::Vp9, AudioCodec::Opus),
    };

    let frame_rate = if mode == PlanMode::Bitrate && attempt_index >= 2 {
        REDUCED_FPS
    } else {
        BASELINE_FPS
    };

    let mut width = f64::from(options.width.unwrap_or(DEFAULT_WIDTH));
    let mut height = f64::from(options.height.unwrap_or(DEFAULT_HEIGHT));
    if mode == PlanMode::Bitrate {
        if attempt_index >= 3 {
            width *= RESOLUTION_SCALE_STEP;
            height *= RESOLUTION_SCALE_STEP;
        }
        if attempt_index >= 5 {
            let long_edge = width.max(height);
            if long_edge > f64::from(FINAL_ATTEMPT_LONG_EDGE) {
                let scale = f64::from(FINAL_ATTEMPT_LONG_EDGE) / long_edge;
                width *= scale;
                height *= scale;
            }
        }
    }
    let width = even_floor(width.round() as u32);
    let height = even_floor(height.round() as u32);

    let audio_bitrate_kbps =
        if options.strip_audio || (mode == PlanMode::Bitrate && attempt_index >= 4) {
            0
        } else {
            AUDIO_BITRATE_KBPS
        };

    let rate = match mode {
        PlanMode::ConstantQuality => RateControl::ConstantQuality {
            crf: crf_for_quality(options.quality),
        },
        PlanMode::Bitrate => {
            let target_mb =
                options.target_size_bytes.unwrap_or(0) as f64 / (1024.0 * 1024.0);
            let total_kbps = target_mb * KBITS_PER_MB / duration_seconds;
            let video_kbps = (total_kbps - f64::from(audio_bitrate_kbps))
                .max(f64::from(MIN_VIDEO_BITRATE_KBPS));
            RateControl::Bitrate {
                kbps: video_kbps.round() as u32,
            }
        }
    };

    AttemptPlan {
        attempt_index,
        label: strategy_label(attempt_index),
        rate,
        frame_rate,
        width,
        height,
        audio_bitrate_kbps,
        video_codec,
        audio_codec,
        container: options.output_format,
    }
}

/// Builds the full attempt ladder for a request: five entries in bitrate
/// mode, one in constant-quality mode.
#[must_use]
pub fn build_ladder(
    options: &ConversionOptions,
    duration_seconds: f64,
    mode: PlanMode,
) -> Vec<AttemptPlan> {
    (1..=mode.ladder_len())
        .map(|attempt_index| plan(options, duration_seconds, attempt_index, mode))
        .collect()
}

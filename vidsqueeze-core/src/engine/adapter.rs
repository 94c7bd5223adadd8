//! Single-attempt encode session over one engine instance.
//!
//! Writes the input under a synthetic name preserving its extension, builds
//! the argument list from the attempt plan, executes, reads the output back
//! and cleans up the virtual files. Cancellation is checked before the
//! execute and before the result read; an in-flight execute can only be
//! aborted through the engine's terminator handle.

use crate::SourceFile;
use crate::controller::CancellationToken;
use crate::engine::{Engine, EngineEvent};
use crate::error::{CoreError, CoreResult};
use crate::planning::{AttemptPlan, RateControl, VideoCodec};
use log::debug;

/// Runs one encode attempt to completion and returns the output bytes.
///
/// Engine failures (including out-of-memory conditions inside the engine)
/// surface as [`CoreError::EncodeAttemptFailed`] with the cause preserved;
/// cancellation passes through untouched.
pub fn run_attempt(
    engine: &mut dyn Engine,
    source: &SourceFile,
    plan: &AttemptPlan,
    duration_seconds: f64,
    cancel: &CancellationToken,
    on_event: &mut dyn FnMut(EngineEvent),
) -> CoreResult<Vec<u8>> {
    let input_name = format!("input{}", source.extension());
    let output_name = format!("output.{}", plan.container.extension());

    engine
        .write_file(&input_name, &source.bytes)
        .map_err(|e| attempt_failed(plan, e))?;

    let args = build_args(plan, &input_name, &output_name);
    cancel.check()?;
    engine
        .exec(&args, Some(duration_seconds), on_event)
        .map_err(|e| attempt_failed(plan, e))?;

    cancel.check()?;
    let output = engine
        .read_file(&output_name)
        .map_err(|e| attempt_failed(plan, e))?;

    for name in [&input_name, &output_name] {
        if let Err(e) = engine.delete_file(name) {
            debug!("cleanup of {name} failed: {e}");
        }
    }

    Ok(output)
}

fn attempt_failed(plan: &AttemptPlan, cause: CoreError) -> CoreError {
    match cause {
        CoreError::Cancelled => CoreError::Cancelled,
        other => CoreError::EncodeAttemptFailed {
            attempt: plan.attempt_index,
            cause: other.to_string(),
        },
    }
}

/// Builds the engine argument list for one attempt plan.
pub fn build_args(plan: &AttemptPlan, input_name: &str, output_name: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut push = |parts: &[&str]| args.extend(parts.iter().map(|s| (*s).to_string()));

    // Timestamp regeneration keeps fragmented QuickTime captures decodable.
    if input_name.ends_with(".mov") {
        push(&["-fflags", "+genpts"]);
    }
    push(&["-i", input_name]);

    match plan.rate {
        RateControl::Bitrate { kbps } => {
            push(&["-b:v", &format!("{kbps}k")]);
            if plan.audio_enabled() {
                push(&["-b:a", &format!("{}k", plan.audio_bitrate_kbps)]);
            }
        }
        RateControl::ConstantQuality { crf } => {
            push(&["-crf", &crf.to_string()]);
        }
    }

    push(&[
        "-vf",
        &format!(
            "scale={}:{},fps={}",
            plan.width, plan.height, plan.frame_rate
        ),
    ]);

    push(&["-c:v", plan.video_codec.encoder_name()]);
    match plan.video_codec {
        VideoCodec::H264 => {
            push(&["-preset", "ultrafast", "-tune", "fastdecode"]);
        }
        VideoCodec::Vp9 => {
            push(&["-deadline", "realtime", "-cpu-used", "5"]);
        }
    }
    push(&["-pix_fmt", "yuv420p"]);

    if plan.audio_enabled() {
        push(&["-c:a", plan.audio_codec.encoder_name()]);
    } else {
        push(&["-an"]);
    }

    push(&[output_name]);
    args
}

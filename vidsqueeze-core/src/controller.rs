//! Conversion controller and retry state machine.
//!
//! Owns the overall request lifecycle: it decides the planning mode once,
//! walks the attempt ladder in order, acquires a fresh engine instance per
//! attempt and guarantees its release on every exit path, whether that is
//! success, failure or cancellation. A successful attempt is final; a
//! failed one advances the ladder after a short pause; exhausting the
//! ladder surfaces one user-facing message chosen by the active mode.

use crate::engine::{EngineEvent, EngineProvider, EngineTerminator, adapter};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{MediaMetadata, MetadataExtractor};
use crate::options::ConversionOptions;
use crate::planning::{self, AttemptPlan, PlanMode};
use crate::progress::{NullProgressCallback, ProgressCallback, ProgressSnapshot, ProgressTracker};
use crate::utils::{format_bytes, format_duration};
use crate::{ConversionOutput, SourceFile};
use log::{info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Pause between failed attempts. Gives the host a moment to reclaim the
/// previous engine instance's memory before the next one spins up.
const DEFAULT_ATTEMPT_BACKOFF: Duration = Duration::from_secs(1);

const TARGET_SIZE_FAILURE_MESSAGE: &str = "The requested target size is too aggressive for this \
     video. Raise the target size or lower the output resolution and try again.";
const QUALITY_FAILURE_MESSAGE: &str = "The conversion failed unexpectedly. Try a lower quality \
     setting or a smaller output resolution.";
const ENGINE_LOAD_FAILURE_MESSAGE: &str = "The conversion engine failed to load. Make sure the \
     page is served with the required cross-origin isolation headers (COOP/COEP).";

/// Lifecycle states of a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionState {
    Idle,
    FileSelected,
    LoadingEngine,
    Converting,
    Cancelled,
    Done,
    Error,
}

/// Cooperative cancellation token. Observed at attempt boundaries and at
/// the suspension points inside an attempt; enforcement mid-encode happens
/// destructively through the live engine's terminator handle.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns [`CoreError::Cancelled`] once the token has been tripped.
    pub fn check(&self) -> CoreResult<()> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One conversion request. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: SourceFile,
    pub options: ConversionOptions,
    pub duration_seconds: f64,
}

/// Drives conversion requests through the attempt ladder.
///
/// All methods take `&self`; the controller is safe to share behind an
/// `Arc` so `cancel` can be issued from another thread while `convert`
/// blocks. It never runs two requests concurrently; a second `convert`
/// while one is in flight is rejected. After `Done`, `Error` or
/// `Cancelled`, call [`ConversionController::reset`] before reuse.
pub struct ConversionController {
    provider: Box<dyn EngineProvider>,
    extractor: Box<dyn MetadataExtractor>,
    callback: Arc<dyn ProgressCallback>,
    backoff: Duration,
    state: Mutex<ConversionState>,
    tracker: Mutex<ProgressTracker>,
    output: Mutex<Option<ConversionOutput>>,
    error_message: Mutex<Option<String>>,
    selected: Mutex<Option<(SourceFile, MediaMetadata)>>,
    engine_terminator: Mutex<Option<Box<dyn EngineTerminator>>>,
    cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConversionController {
    #[must_use]
    pub fn new(provider: Box<dyn EngineProvider>, extractor: Box<dyn MetadataExtractor>) -> Self {
        Self {
            provider,
            extractor,
            callback: Arc::new(NullProgressCallback),
            backoff: DEFAULT_ATTEMPT_BACKOFF,
            state: Mutex::new(ConversionState::Idle),
            tracker: Mutex::new(ProgressTracker::new()),
            output: Mutex::new(None),
            error_message: Mutex::new(None),
            selected: Mutex::new(None),
            engine_terminator: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.callback = callback;
        self
    }

    #[must_use]
    pub fn with_attempt_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn state(&self) -> ConversionState {
        *lock(&self.state)
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        lock(&self.tracker).snapshot()
    }

    #[must_use]
    pub fn output(&self) -> Option<ConversionOutput> {
        lock(&self.output).clone()
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        lock(&self.error_message).clone()
    }

    /// Probes a newly selected file and stores it for a later
    /// [`ConversionController::start_conversion`]. A file the probe cannot
    /// decode leaves the current state untouched.
    pub fn select_file(&self, source: SourceFile) -> CoreResult<MediaMetadata> {
        self.ensure_not_running()?;
        let metadata = self.extractor.extract(&source)?;
        info!(
            "selected {} ({}, {}, {}x{})",
            metadata.name,
            format_bytes(metadata.size_bytes),
            format_duration(metadata.duration_seconds),
            metadata.width,
            metadata.height
        );
        *lock(&self.selected) = Some((source, metadata.clone()));
        *lock(&self.state) = ConversionState::FileSelected;
        Ok(metadata)
    }

    /// Converts the previously selected file, filling unset target
    /// dimensions from the probed source.
    pub fn start_conversion(&self, options: ConversionOptions) -> CoreResult<()> {
        let (source, metadata) = lock(&self.selected)
            .clone()
            .ok_or(CoreError::NoFileSelected)?;
        let options = planning::fill_dimensions_from_source(options, &metadata);
        self.convert(ConversionRequest {
            source,
            options,
            duration_seconds: metadata.duration_seconds,
        })
    }

    /// Cancels the request from any state. Terminal until `reset`.
    pub fn cancel(&self) {
        self.cancel.cancel();
        if let Some(terminator) = lock(&self.engine_terminator).take() {
            terminator.terminate();
        }
        *lock(&self.state) = ConversionState::Cancelled;
        info!("conversion cancelled");
    }

    /// Returns to `Idle`: no live engine, no output, empty telemetry.
    pub fn reset(&self) {
        if let Some(terminator) = lock(&self.engine_terminator).take() {
            terminator.terminate();
        }
        self.cancel.clear();
        lock(&self.tracker).clear();
        *lock(&self.output) = None;
        *lock(&self.error_message) = None;
        *lock(&self.selected) = None;
        *lock(&self.state) = ConversionState::Idle;
    }

    /// Runs one request to completion, walking the attempt ladder in order.
    ///
    /// Returns `Ok(())` when the request finished in `Done` or was
    /// cancelled; cancellation is not a failure and produces no error. The
    /// final unrecoverable condition of a request is returned as the error
    /// after the user-facing message has been recorded.
    pub fn convert(&self, request: ConversionRequest) -> CoreResult<()> {
        self.ensure_not_running()?;
        request.options.validate()?;
        if !(request.duration_seconds > 0.0) {
            return Err(CoreError::InvalidOptions(
                "duration must be positive".to_string(),
            ));
        }

        *lock(&self.output) = None;
        *lock(&self.error_message) = None;

        let mode = PlanMode::for_request(&request.options, request.duration_seconds);
        let ladder = planning::build_ladder(&request.options, request.duration_seconds, mode);
        let total_attempts = ladder.len() as u32;
        info!(
            "converting {} ({}): {mode:?} mode, {total_attempts} attempt(s)",
            request.source.name,
            format_bytes(request.source.size_bytes())
        );

        for plan in &ladder {
            if self.cancel.is_cancelled() {
                *lock(&self.state) = ConversionState::Cancelled;
                return Ok(());
            }

            self.begin_attempt(plan, total_attempts);

            match self.run_single_attempt(&request, plan) {
                Ok(output) => {
                    info!(
                        "attempt {}/{total_attempts} succeeded ({})",
                        plan.attempt_index,
                        format_bytes(output.bytes.len() as u64)
                    );
                    *lock(&self.output) = Some(output);
                    *lock(&self.state) = ConversionState::Done;
                    return Ok(());
                }
                Err(CoreError::Cancelled) => {
                    *lock(&self.state) = ConversionState::Cancelled;
                    return Ok(());
                }
                Err(err @ CoreError::EngineLoad(_)) => {
                    warn!("engine load failed, aborting request: {err}");
                    self.fail(ENGINE_LOAD_FAILURE_MESSAGE);
                    return Err(err);
                }
                Err(err) => {
                    warn!("attempt {}/{total_attempts} failed: {err}", plan.attempt_index);
                    {
                        let mut tracker = lock(&self.tracker);
                        tracker.record_log(&format!(
                            "attempt {}/{total_attempts} failed: {err}",
                            plan.attempt_index
                        ));
                        self.callback.on_progress(&tracker.snapshot());
                    }
                    if plan.attempt_index < total_attempts {
                        std::thread::sleep(self.backoff);
                    } else {
                        self.fail(match mode {
                            PlanMode::Bitrate => TARGET_SIZE_FAILURE_MESSAGE,
                            PlanMode::ConstantQuality => QUALITY_FAILURE_MESSAGE,
                        });
                        return Err(err);
                    }
                }
            }
        }

        // Only reachable when cancellation raced the last backoff pause.
        *lock(&self.state) = ConversionState::Cancelled;
        Ok(())
    }

    fn ensure_not_running(&self) -> CoreResult<()> {
        match *lock(&self.state) {
            ConversionState::LoadingEngine | ConversionState::Converting => {
                Err(CoreError::ConversionInProgress)
            }
            _ => Ok(()),
        }
    }

    /// Flushes the previous attempt's telemetry before the new attempt's
    /// first event can be emitted.
    fn begin_attempt(&self, plan: &AttemptPlan, total_attempts: u32) {
        let mut tracker = lock(&self.tracker);
        tracker.begin_attempt(plan.label);
        tracker.record_log(&format!(
            "attempt {}/{total_attempts}: {}",
            plan.attempt_index, plan.label
        ));
        self.callback.on_progress(&tracker.snapshot());
    }

    /// Acquires a fresh engine, runs one attempt, and releases the engine
    /// on every exit path.
    fn run_single_attempt(
        &self,
        request: &ConversionRequest,
        plan: &AttemptPlan,
    ) -> CoreResult<ConversionOutput> {
        *lock(&self.state) = ConversionState::LoadingEngine;
        self.cancel.check()?;

        let mut engine = self.provider.create().map_err(|e| match e {
            err @ CoreError::EngineLoad(_) => err,
            other => CoreError::EngineLoad(other.to_string()),
        })?;
        *lock(&self.engine_terminator) = Some(engine.terminator());

        let result: CoreResult<ConversionOutput> = (|| {
            engine.load()?;
            self.cancel.check()?;
            *lock(&self.state) = ConversionState::Converting;

            let mut on_event = |event: EngineEvent| self.handle_engine_event(event);
            let bytes = adapter::run_attempt(
                engine.as_mut(),
                &request.source,
                plan,
                request.duration_seconds,
                &self.cancel,
                &mut on_event,
            )?;
            Ok(ConversionOutput {
                bytes,
                mime_type: plan.container.mime_type().to_string(),
            })
        })();

        engine.terminate();
        lock(&self.engine_terminator).take();
        result
    }

    fn handle_engine_event(&self, event: EngineEvent) {
        let mut tracker = lock(&self.tracker);
        match event {
            EngineEvent::Log(line) => tracker.record_log(&line),
            EngineEvent::Progress { ratio } => tracker.record_ratio(ratio),
        }
        self.callback.on_progress(&tracker.snapshot());
    }

    fn fail(&self, message: &str) {
        *lock(&self.error_message) = Some(message.to_string());
        *lock(&self.state) = ConversionState::Error;
    }
}

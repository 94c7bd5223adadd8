//! ffmpeg-sidecar backed engine.
//!
//! Each instance owns a private scratch directory standing in for the
//! engine's virtual file namespace; `exec` spawns ffmpeg with that
//! directory as its working directory so the argument list can refer to
//! plain file names. The scratch directory is removed when the instance is
//! dropped.

use crate::engine::{Engine, EngineEvent, EngineProvider, EngineTerminator};
use crate::error::{CoreError, CoreResult};
use crate::utils::parse_ffmpeg_time;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use log::{debug, warn};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

pub struct SidecarEngine {
    scratch: TempDir,
    loaded: bool,
    kill_flag: Arc<AtomicBool>,
}

impl SidecarEngine {
    pub fn new() -> CoreResult<Self> {
        Ok(Self {
            scratch: tempfile::Builder::new()
                .prefix("vidsqueeze-engine-")
                .tempdir()?,
            loaded: false,
            kill_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    fn resolve(&self, name: &str) -> CoreResult<PathBuf> {
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(CoreError::EngineFailure(format!(
                "invalid virtual file name: {name}"
            )));
        }
        Ok(self.scratch.path().join(name))
    }

    fn killed(&self) -> bool {
        self.kill_flag.load(Ordering::SeqCst)
    }
}

impl Engine for SidecarEngine {
    fn load(&mut self) -> CoreResult<()> {
        if self.loaded {
            return Ok(());
        }
        let probe = Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match probe {
            Ok(status) if status.success() => {
                debug!("ffmpeg available, engine ready");
                self.loaded = true;
                Ok(())
            }
            Ok(status) => Err(CoreError::EngineLoad(format!(
                "ffmpeg -version exited with {status}"
            ))),
            Err(e) => Err(CoreError::EngineLoad(format!("ffmpeg not available: {e}"))),
        }
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> CoreResult<()> {
        fs::write(self.resolve(name)?, bytes)?;
        Ok(())
    }

    fn exec(
        &mut self,
        args: &[String],
        duration_hint: Option<f64>,
        on_event: &mut dyn FnMut(EngineEvent),
    ) -> CoreResult<()> {
        if self.killed() {
            return Err(CoreError::Cancelled);
        }

        let mut cmd = FfmpegCommand::new();
        cmd.args(args.iter().map(String::as_str));
        cmd.as_inner_mut().current_dir(self.scratch.path());
        debug!("spawning ffmpeg in {}: {args:?}", self.scratch.path().display());

        let mut child = cmd
            .spawn()
            .map_err(|e| CoreError::EngineFailure(format!("failed to start ffmpeg: {e}")))?;

        let total = duration_hint.filter(|d| *d > 0.0);
        let mut stderr_tail = String::new();
        let mut interrupted = false;
        {
            let events = child.iter().map_err(|e| {
                CoreError::EngineFailure(format!("failed to read ffmpeg events: {e}"))
            })?;
            for event in events {
                if self.killed() {
                    interrupted = true;
                    break;
                }
                match event {
                    FfmpegEvent::Progress(progress) => {
                        if let (Some(total), Some(clock)) =
                            (total, parse_ffmpeg_time(&progress.time))
                        {
                            on_event(EngineEvent::Progress {
                                ratio: (clock / total).clamp(0.0, 1.0),
                            });
                        }
                    }
                    FfmpegEvent::Log(level, line) => {
                        if matches!(level, LogLevel::Error | LogLevel::Fatal) {
                            stderr_tail.push_str(&line);
                            stderr_tail.push('\n');
                        }
                        on_event(EngineEvent::Log(line));
                    }
                    FfmpegEvent::Error(line) => {
                        stderr_tail.push_str(&line);
                        stderr_tail.push('\n');
                        on_event(EngineEvent::Log(line));
                    }
                    _ => {}
                }
            }
        }

        if interrupted || self.killed() {
            if let Err(e) = child.kill() {
                warn!("failed to kill ffmpeg child: {e}");
            }
            let _ = child.wait();
            return Err(CoreError::Cancelled);
        }

        let status = child
            .wait()
            .map_err(|e| CoreError::EngineFailure(format!("failed waiting for ffmpeg: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(CoreError::EngineFailure(format!(
                "ffmpeg exited with {status}: {}",
                stderr_tail.trim()
            )))
        }
    }

    fn read_file(&mut self, name: &str) -> CoreResult<Vec<u8>> {
        Ok(fs::read(self.resolve(name)?)?)
    }

    fn delete_file(&mut self, name: &str) -> CoreResult<()> {
        fs::remove_file(self.resolve(name)?)?;
        Ok(())
    }

    fn terminate(&mut self) {
        self.kill_flag.store(true, Ordering::SeqCst);
    }

    fn terminator(&self) -> Box<dyn EngineTerminator> {
        Box::new(SidecarTerminator(Arc::clone(&self.kill_flag)))
    }
}

struct SidecarTerminator(Arc<AtomicBool>);

impl EngineTerminator for SidecarTerminator {
    fn terminate(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Creates one fresh [`SidecarEngine`] per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarEngineProvider;

impl EngineProvider for SidecarEngineProvider {
    fn create(&self) -> CoreResult<Box<dyn Engine>> {
        Ok(Box::new(SidecarEngine::new()?))
    }
}

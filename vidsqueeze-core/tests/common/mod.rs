//! Scripted engine and fixed metadata doubles for controller tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vidsqueeze_core::engine::{Engine, EngineEvent, EngineProvider, EngineTerminator};
use vidsqueeze_core::{CoreError, CoreResult, MediaMetadata, MetadataExtractor, SourceFile};

/// Scripted behavior for one engine instance (one attempt).
#[derive(Debug, Clone)]
pub enum AttemptScript {
    /// Load and exec succeed; the output file holds these bytes.
    Succeed { output: Vec<u8> },
    /// Like `Succeed`, but emits this many log lines first.
    SucceedWithLogs { output: Vec<u8>, log_lines: usize },
    /// `exec` fails with the given cause.
    FailExec { cause: &'static str },
    /// `load` fails.
    FailLoad { cause: &'static str },
    /// `exec` blocks until the engine is terminated.
    HangUntilTerminated,
}

/// Shared recorder for assertions across engine instances.
#[derive(Debug, Default)]
pub struct EngineLog {
    pub exec_calls: Mutex<Vec<Vec<String>>>,
    pub engines_created: Mutex<usize>,
}

impl EngineLog {
    pub fn exec_count(&self) -> usize {
        self.exec_calls.lock().unwrap().len()
    }

    pub fn exec_args(&self, index: usize) -> Vec<String> {
        self.exec_calls.lock().unwrap()[index].clone()
    }

    pub fn created(&self) -> usize {
        *self.engines_created.lock().unwrap()
    }
}

pub struct ScriptedEngineProvider {
    scripts: Mutex<VecDeque<AttemptScript>>,
    pub log: Arc<EngineLog>,
}

impl ScriptedEngineProvider {
    pub fn new(scripts: Vec<AttemptScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            log: Arc::new(EngineLog::default()),
        }
    }
}

impl EngineProvider for ScriptedEngineProvider {
    fn create(&self) -> CoreResult<Box<dyn Engine>> {
        *self.log.engines_created.lock().unwrap() += 1;
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AttemptScript::FailExec {
                cause: "script exhausted",
            });
        Ok(Box::new(ScriptedEngine {
            script,
            files: HashMap::new(),
            log: Arc::clone(&self.log),
            kill_flag: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct ScriptedEngine {
    script: AttemptScript,
    files: HashMap<String, Vec<u8>>,
    log: Arc<EngineLog>,
    kill_flag: Arc<AtomicBool>,
}

impl Engine for ScriptedEngine {
    fn load(&mut self) -> CoreResult<()> {
        match &self.script {
            AttemptScript::FailLoad { cause } => Err(CoreError::EngineLoad((*cause).to_string())),
            _ => Ok(()),
        }
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> CoreResult<()> {
        self.files.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn exec(
        &mut self,
        args: &[String],
        _duration_hint: Option<f64>,
        on_event: &mut dyn FnMut(EngineEvent),
    ) -> CoreResult<()> {
        self.log.exec_calls.lock().unwrap().push(args.to_vec());
        let output_name = args.last().cloned().unwrap_or_default();

        match &self.script {
            AttemptScript::Succeed { output } => {
                on_event(EngineEvent::Log("encoder configured".to_string()));
                on_event(EngineEvent::Progress { ratio: 0.5 });
                on_event(EngineEvent::Progress { ratio: 1.0 });
                self.files.insert(output_name, output.clone());
                Ok(())
            }
            AttemptScript::SucceedWithLogs { output, log_lines } => {
                for i in 0..*log_lines {
                    on_event(EngineEvent::Log(format!("engine line {i}")));
                }
                on_event(EngineEvent::Progress { ratio: 1.0 });
                self.files.insert(output_name, output.clone());
                Ok(())
            }
            AttemptScript::FailExec { cause } => {
                on_event(EngineEvent::Log((*cause).to_string()));
                Err(CoreError::EngineFailure((*cause).to_string()))
            }
            AttemptScript::FailLoad { .. } => {
                Err(CoreError::EngineFailure("exec after failed load".to_string()))
            }
            AttemptScript::HangUntilTerminated => {
                while !self.kill_flag.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(CoreError::Cancelled)
            }
        }
    }

    fn read_file(&mut self, name: &str) -> CoreResult<Vec<u8>> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::EngineFailure(format!("no such file: {name}")))
    }

    fn delete_file(&mut self, name: &str) -> CoreResult<()> {
        self.files.remove(name);
        Ok(())
    }

    fn terminate(&mut self) {
        self.kill_flag.store(true, Ordering::SeqCst);
    }

    fn terminator(&self) -> Box<dyn EngineTerminator> {
        Box::new(ScriptedTerminator(Arc::clone(&self.kill_flag)))
    }
}

struct ScriptedTerminator(Arc<AtomicBool>);

impl EngineTerminator for ScriptedTerminator {
    fn terminate(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Metadata extractor returning a canned probe result.
pub struct FixedMetadataExtractor(pub MediaMetadata);

impl Default for FixedMetadataExtractor {
    fn default() -> Self {
        Self(sample_metadata())
    }
}

impl MetadataExtractor for FixedMetadataExtractor {
    fn extract(&self, source: &SourceFile) -> CoreResult<MediaMetadata> {
        let mut metadata = self.0.clone();
        metadata.name = source.name.clone();
        metadata.size_bytes = source.size_bytes();
        Ok(metadata)
    }
}

pub fn sample_metadata() -> MediaMetadata {
    MediaMetadata {
        name: "clip.mp4".to_string(),
        size_bytes: 64,
        mime_type: "video/mp4".to_string(),
        duration_seconds: 60.0,
        width: 1920,
        height: 1080,
        aspect_ratio: 1920.0 / 1080.0,
    }
}

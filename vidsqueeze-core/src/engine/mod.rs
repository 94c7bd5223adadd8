//! Encoder engine boundary.
//!
//! The engine is an opaque, fallible, non-resumable worker with a virtual
//! file namespace: load it, write the input, execute an argument list, read
//! the output back. Any failure invalidates the instance; the controller
//! acquires a fresh one per attempt through an [`EngineProvider`] and never
//! reuses an instance across attempts.

pub mod adapter;
pub mod sidecar;

use crate::error::CoreResult;

/// Events streamed by a running engine operation.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Verbatim log line from the engine.
    Log(String),
    /// Fractional encode progress in 0.0..=1.0.
    Progress { ratio: f64 },
}

/// One encoder engine instance.
pub trait Engine {
    /// Prepares the engine for execution. Idempotent; a failure here is an
    /// [`crate::CoreError::EngineLoad`] and ends the whole request.
    fn load(&mut self) -> CoreResult<()>;

    /// Writes a file into the engine's virtual namespace.
    fn write_file(&mut self, name: &str, bytes: &[u8]) -> CoreResult<()>;

    /// Runs the engine with the given argument list, forwarding log and
    /// progress events. `duration_hint` is the input duration in seconds,
    /// used to derive fractional progress where the engine only reports an
    /// output clock.
    fn exec(
        &mut self,
        args: &[String],
        duration_hint: Option<f64>,
        on_event: &mut dyn FnMut(EngineEvent),
    ) -> CoreResult<()>;

    /// Reads a file back out of the virtual namespace.
    fn read_file(&mut self, name: &str) -> CoreResult<Vec<u8>>;

    /// Removes a file from the virtual namespace.
    fn delete_file(&mut self, name: &str) -> CoreResult<()>;

    /// Unconditionally tears the instance down. Safe to call repeatedly.
    fn terminate(&mut self);

    /// Handle for tearing the instance down from another thread while an
    /// `exec` is in flight, aborting the encode and discarding partial
    /// output.
    fn terminator(&self) -> Box<dyn EngineTerminator>;
}

/// Detached termination handle for a single engine instance.
pub trait EngineTerminator: Send + Sync {
    fn terminate(&self);
}

/// Creates engine instances. One fresh instance per attempt guarantees a
/// clean memory state after a failure.
pub trait EngineProvider: Send + Sync {
    fn create(&self) -> CoreResult<Box<dyn Engine>>;
}
